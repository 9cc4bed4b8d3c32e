use std::path::Path;

use crate::config::PredictorConfig;
use crate::db::MatchStore;
use crate::error::{PredictorError, Result};
use crate::models::{MatchRecord, MatchStatus, PredictionResult, TeamId};
use crate::services::classifier::{prepare_training_data, ClassifierPrediction, MlClassifier, TrainedModelState};
use crate::services::feature_engineer::FeatureEngineer;
use crate::services::poisson::{PoissonModel, PoissonPrediction};
use crate::utils::normalize_probabilities;

pub const POISSON_WEIGHT: f64 = 0.4;
pub const CLASSIFIER_WEIGHT: f64 = 0.6;
/// Form points that map to full confidence: five straight wins.
pub const CONFIDENCE_CAP_POINTS: f64 = 15.0;

/// Blends the Poisson scoring model with the trained classifier.
///
/// Each predictor owns its store handle and trained state, so several can run
/// side by side (one per league, say). Prediction is read-only; training and
/// loading need `&mut self`.
pub struct HybridPredictor<S> {
    engineer: FeatureEngineer<S>,
    poisson: PoissonModel,
    classifier: MlClassifier,
    config: PredictorConfig,
}

impl<S: MatchStore> HybridPredictor<S> {
    pub fn new(store: S, config: PredictorConfig) -> Self {
        Self {
            engineer: FeatureEngineer::with_windows(store, config.form_window, config.h2h_window),
            poisson: PoissonModel::new(),
            classifier: MlClassifier::new(),
            config,
        }
    }

    /// Predictor that starts from an already trained state.
    pub fn with_state(store: S, config: PredictorConfig, state: TrainedModelState) -> Self {
        let mut predictor = Self::new(store, config);
        predictor.classifier = MlClassifier::from_state(state);
        predictor
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.is_trained()
    }

    pub fn state(&self) -> Option<&TrainedModelState> {
        self.classifier.state()
    }

    /// Fit the classifier on the most recent finished fixtures. A failed run
    /// leaves any previous trained state in place.
    pub async fn train(&mut self) -> Result<&TrainedModelState> {
        tracing::info!(
            "Training on up to {} finished fixtures ({:?} features)",
            self.config.training_limit,
            self.config.feature_mode
        );
        let examples =
            prepare_training_data(&self.engineer, self.config.training_limit, self.config.feature_mode).await?;
        self.classifier.train(&examples, &self.config)
    }

    pub fn load_state(&mut self, path: &Path) -> Result<()> {
        self.classifier = MlClassifier::from_state(TrainedModelState::load(path)?);
        Ok(())
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        self.state().ok_or(PredictorError::ModelNotTrained)?.save(path)
    }

    /// Outcome probabilities, expected goals and confidence for a fixture.
    /// Nothing is persisted.
    pub async fn predict_match(&self, home_team_id: TeamId, away_team_id: TeamId) -> Result<PredictionResult> {
        if !self.classifier.is_trained() {
            return Err(PredictorError::ModelNotTrained);
        }

        let features = self.engineer.build_feature_vector(home_team_id, away_team_id).await?;

        let poisson = self.poisson.predict_match(
            features.home_avg_goals_for,
            features.away_avg_goals_for,
            features.home_avg_goals_against,
            features.away_avg_goals_against,
        );
        let classifier = self.classifier.predict(&features)?;

        let [home_win_prob, draw_prob, away_win_prob] =
            blend(&poisson, &classifier, self.config.renormalize_blend);

        let result = PredictionResult {
            home_win_prob,
            draw_prob,
            away_win_prob,
            expected_home_goals: poisson.expected_home_goals,
            expected_away_goals: poisson.expected_away_goals,
            confidence: confidence_score(features.home_form_points, features.away_form_points),
        };

        tracing::info!(
            "Predicted {} vs {}: Home {:.1}%, Draw {:.1}%, Away {:.1}% (xG {:.2}-{:.2}, confidence {:.2})",
            home_team_id,
            away_team_id,
            result.home_win_prob * 100.0,
            result.draw_prob * 100.0,
            result.away_win_prob * 100.0,
            result.expected_home_goals,
            result.expected_away_goals,
            result.confidence
        );

        Ok(result)
    }

    /// Predictions for the scheduled fixtures in `fixtures`, in order. Other
    /// statuses are skipped.
    pub async fn predict_upcoming(&self, fixtures: &[MatchRecord]) -> Result<Vec<(MatchRecord, PredictionResult)>> {
        let mut predictions = Vec::new();
        for fixture in fixtures {
            if fixture.status != MatchStatus::Scheduled {
                tracing::debug!("Skipping fixture {} with status {}", fixture.id, fixture.status);
                continue;
            }
            let prediction = self
                .predict_match(fixture.home_team_id, fixture.away_team_id)
                .await?;
            predictions.push((fixture.clone(), prediction));
        }
        Ok(predictions)
    }
}

/// Fixed 0.4 / 0.6 weighting of the two sub-models as `[home, draw, away]`.
/// Without `renormalize` the sum carries the Poisson truncation shortfall.
pub fn blend(poisson: &PoissonPrediction, classifier: &ClassifierPrediction, renormalize: bool) -> [f64; 3] {
    let combined = [
        POISSON_WEIGHT * poisson.home_win_prob + CLASSIFIER_WEIGHT * classifier.home_win_prob,
        POISSON_WEIGHT * poisson.draw_prob + CLASSIFIER_WEIGHT * classifier.draw_prob,
        POISSON_WEIGHT * poisson.away_win_prob + CLASSIFIER_WEIGHT * classifier.away_win_prob,
    ];
    if renormalize {
        normalize_probabilities(combined)
    } else {
        combined
    }
}

/// Stronger side's recent form points over the cap, at most 1.
pub fn confidence_score(home_form_points: f64, away_form_points: f64) -> f64 {
    (home_form_points.max(away_form_points) / CONFIDENCE_CAP_POINTS).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureMode, ForestParams};
    use crate::db::testing::{finished, insert_negative_goals_row, memory_pool, scheduled, snapshot};
    use crate::db::{insert_fixture, upsert_team_stats, SqliteMatchStore, Venue};
    use crate::models::SeasonStatsSnapshot;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    fn quick_config() -> PredictorConfig {
        PredictorConfig {
            forest: ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            },
            ..PredictorConfig::default()
        }
    }

    /// `n` finished fixtures among six teams. Lower ids score more, so results
    /// follow team strength.
    fn league_fixtures(n: usize) -> Vec<MatchRecord> {
        (0..n)
            .map(|i| {
                let home = 1 + (i % 6) as TeamId;
                let away = 1 + ((i + 1 + (i / 6) % 5) % 6) as TeamId;
                let home_goals = ((7 - home) / 2) as u32;
                let away_goals = ((7 - away) / 3) as u32;
                finished(i as i64 + 1, home, away, home_goals, away_goals, (n - i) as i64)
            })
            .collect()
    }

    async fn league_store(n: usize) -> SqliteMatchStore {
        let pool = memory_pool().await;
        for fixture in league_fixtures(n) {
            insert_fixture(&pool, &fixture).await.unwrap();
        }
        SqliteMatchStore::new(pool)
    }

    /// Store whose every read fails, as if the database were gone.
    struct UnreachableStore;

    #[async_trait]
    impl MatchStore for UnreachableStore {
        async fn fetch_finished_matches(
            &self,
            _team_id: TeamId,
            _venue: Venue,
            _limit: u32,
            _before: Option<DateTime<Utc>>,
        ) -> Result<Vec<MatchRecord>> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn fetch_head_to_head(
            &self,
            _team_a: TeamId,
            _team_b: TeamId,
            _limit: u32,
            _before: Option<DateTime<Utc>>,
        ) -> Result<Vec<MatchRecord>> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn fetch_latest_season_stats(
            &self,
            _team_id: TeamId,
            _before: Option<DateTime<Utc>>,
        ) -> Result<Option<SeasonStatsSnapshot>> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn fetch_training_corpus(&self, _limit: u32) -> Result<Vec<MatchRecord>> {
            Err(sqlx::Error::PoolClosed.into())
        }
    }

    #[tokio::test]
    async fn test_training_needs_fifty_examples() {
        let mut predictor = HybridPredictor::new(league_store(49).await, quick_config());
        let err = predictor.train().await.unwrap_err();
        assert!(matches!(
            err,
            PredictorError::InsufficientData {
                found: 49,
                required: 50
            }
        ));
        assert!(!predictor.is_trained());

        let mut predictor = HybridPredictor::new(league_store(50).await, quick_config());
        let state = predictor.train().await.unwrap();
        assert_eq!(state.examples_used, 50);
        assert!(predictor.is_trained());
    }

    #[tokio::test]
    async fn test_untrained_predictor_never_reads_the_store() {
        let predictor = HybridPredictor::new(UnreachableStore, quick_config());
        let err = predictor.predict_match(1, 2).await.unwrap_err();
        assert!(matches!(err, PredictorError::ModelNotTrained));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_training() {
        let mut predictor = HybridPredictor::new(UnreachableStore, quick_config());
        let err = predictor.train().await.unwrap_err();
        assert!(matches!(err, PredictorError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_fixture_does_not_block_training() {
        let store = league_store(80).await;
        insert_negative_goals_row(store.pool(), 500, 90, 91).await;

        let mut predictor = HybridPredictor::new(store, quick_config());
        let state = predictor.train().await.unwrap();
        assert_eq!(state.examples_used, 80);
    }

    #[tokio::test]
    async fn test_bad_season_stats_skip_only_that_teams_fixtures() {
        let store = league_store(90).await;
        upsert_team_stats(store.pool(), &snapshot(6, 2024, 30, 12, 40))
            .await
            .unwrap();
        sqlx::query("UPDATE team_stats SET wins = -1 WHERE team_id = 6")
            .execute(store.pool())
            .await
            .unwrap();

        let involving_six = league_fixtures(90)
            .iter()
            .filter(|f| f.home_team_id == 6 || f.away_team_id == 6)
            .count();
        assert!(involving_six > 0);

        let config = PredictorConfig {
            min_training_examples: 20,
            ..quick_config()
        };
        let mut predictor = HybridPredictor::new(store, config);
        let state = predictor.train().await.unwrap();
        assert_eq!(state.examples_used, 90 - involving_six);
    }

    #[tokio::test]
    async fn test_trained_prediction_is_well_formed() {
        let mut predictor = HybridPredictor::new(league_store(90).await, quick_config());
        predictor.train().await.unwrap();

        let result = predictor.predict_match(1, 6).await.unwrap();
        assert!(result.home_win_prob >= 0.0 && result.draw_prob >= 0.0 && result.away_win_prob >= 0.0);
        assert!(result.probability_sum() <= 1.0 + 1e-9);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(result.expected_home_goals > result.expected_away_goals);
        assert!(result.home_win_prob > result.away_win_prob);
    }

    #[tokio::test]
    async fn test_unknown_teams_still_get_a_prediction() {
        let mut predictor = HybridPredictor::new(league_store(60).await, quick_config());
        predictor.train().await.unwrap();

        let result = predictor.predict_match(700, 701).await.unwrap();
        assert_eq!(result.expected_home_goals, 0.0);
        assert_eq!(result.expected_away_goals, 0.0);
        assert_eq!(result.confidence, 0.0);
        // Poisson mass is all on 0-0, so the draw gets at least its 0.4 share.
        assert!(result.draw_prob >= POISSON_WEIGHT);
    }

    #[tokio::test]
    async fn test_point_in_time_training() {
        let config = PredictorConfig {
            feature_mode: FeatureMode::PointInTime,
            ..quick_config()
        };
        let mut predictor = HybridPredictor::new(league_store(60).await, config);
        let state = predictor.train().await.unwrap();
        assert_eq!(state.examples_used, 60);

        let result = predictor.predict_match(2, 5).await.unwrap();
        assert!(result.probability_sum() <= 1.0 + 1e-9);
    }

    #[tokio::test]
    async fn test_saved_state_restores_predictions() {
        let mut predictor = HybridPredictor::new(league_store(60).await, quick_config());
        predictor.train().await.unwrap();
        let before = predictor.predict_match(3, 4).await.unwrap();

        let path = std::env::temp_dir().join(format!("matchcast-model-{}.json", std::process::id()));
        predictor.save_state(&path).unwrap();

        let mut restored = HybridPredictor::new(league_store(60).await, quick_config());
        restored.load_state(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let after = restored.predict_match(3, 4).await.unwrap();
        assert!((before.home_win_prob - after.home_win_prob).abs() < 1e-9);
        assert!((before.draw_prob - after.draw_prob).abs() < 1e-9);
        assert!((before.away_win_prob - after.away_win_prob).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_with_state_predicts_without_training() {
        let mut trained = HybridPredictor::new(league_store(60).await, quick_config());
        let state = trained.train().await.unwrap().clone();
        let expected = trained.predict_match(1, 5).await.unwrap();

        let predictor = HybridPredictor::with_state(league_store(60).await, quick_config(), state);
        assert!(predictor.is_trained());
        let result = predictor.predict_match(1, 5).await.unwrap();
        assert!((expected.home_win_prob - result.home_win_prob).abs() < 1e-9);
        assert!((expected.away_win_prob - result.away_win_prob).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predict_upcoming_skips_non_scheduled() {
        let store = league_store(60).await;
        let mut predictor = HybridPredictor::new(store, quick_config());
        predictor.train().await.unwrap();

        let fixtures = vec![scheduled(1001, 1, 2, -3), finished(1002, 3, 4, 1, 0, 1), scheduled(1003, 5, 6, -4)];
        let predictions = predictor.predict_upcoming(&fixtures).await.unwrap();
        let ids: Vec<i64> = predictions.iter().map(|(f, _)| f.id).collect();
        assert_eq!(ids, vec![1001, 1003]);
    }

    #[test]
    fn test_blend_weights() {
        let poisson = PoissonPrediction {
            home_win_prob: 0.58,
            draw_prob: 0.22,
            away_win_prob: 0.18,
            expected_home_goals: 1.95,
            expected_away_goals: 1.0,
        };
        let classifier = ClassifierPrediction {
            home_win_prob: 0.5,
            draw_prob: 0.3,
            away_win_prob: 0.2,
        };

        let [home, draw, away] = blend(&poisson, &classifier, false);
        assert!((home - 0.532).abs() < 1e-9);
        assert!((draw - 0.268).abs() < 1e-9);
        assert!((away - 0.192).abs() < 1e-9);
        assert!((home + draw + away - 0.992).abs() < 1e-9);

        let renormalized = blend(&poisson, &classifier, true);
        assert!((renormalized.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(renormalized[0] > home);
    }

    #[test]
    fn test_confidence_is_monotonic_and_capped() {
        let mut previous = 0.0;
        for points in 0..=20 {
            let c = confidence_score(points as f64, 4.0);
            assert!(c >= previous);
            assert!(c <= 1.0);
            previous = c;
        }
        assert_eq!(confidence_score(10.0, 15.0), 1.0);
        assert!((confidence_score(6.0, 9.0) - 0.6).abs() < 1e-12);
        assert_eq!(confidence_score(0.0, 0.0), 0.0);
    }
}
