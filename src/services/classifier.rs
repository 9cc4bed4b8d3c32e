use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{FeatureMode, PredictorConfig};
use crate::db::MatchStore;
use crate::error::{PredictorError, Result};
use crate::models::{FeatureVector, Outcome, FEATURE_NAMES};
use crate::services::feature_engineer::FeatureEngineer;
use crate::services::forest::{RandomForest, StandardScaler, N_CLASSES};
use crate::utils::classification_accuracy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPrediction {
    pub home_win_prob: f64,
    pub draw_prob: f64,
    pub away_win_prob: f64,
}

/// Everything needed to score a feature vector after training. Immutable once
/// built; round-trips through `to_blob`/`from_blob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModelState {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub forest: RandomForest,
    pub examples_used: usize,
    pub test_accuracy: f64,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModelState {
    /// Split, scale and fit. Fails with `InsufficientData` below
    /// `config.min_training_examples`.
    pub fn fit(examples: &[TrainingExample], config: &PredictorConfig) -> Result<Self> {
        let required = config.min_training_examples.max(2);
        if examples.len() < required {
            return Err(PredictorError::InsufficientData {
                found: examples.len(),
                required,
            });
        }

        let mut order: Vec<usize> = (0..examples.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(config.seed));
        let n_test = ((examples.len() as f64) * config.test_fraction).ceil() as usize;
        let n_test = n_test.min(examples.len() - 1);
        let (test_idx, train_idx) = order.split_at(n_test);

        let (x_train, y_train) = design_matrix(examples, train_idx);
        let (x_test, y_test) = design_matrix(examples, test_idx);

        let scaler = StandardScaler::fit(&x_train);
        let forest = RandomForest::fit(&scaler.transform(&x_train), &y_train, &config.forest, config.seed);

        let x_test = scaler.transform(&x_test);
        let predicted: Vec<usize> = x_test
            .row_iter()
            .map(|row| forest.predict(&row.transpose()))
            .collect();
        let test_accuracy = classification_accuracy(&predicted, &y_test);

        tracing::info!(
            "Trained random forest ({} trees) on {} examples, held out {}: accuracy {:.3}",
            forest.n_trees(),
            train_idx.len(),
            test_idx.len(),
            test_accuracy
        );

        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            scaler,
            forest,
            examples_used: examples.len(),
            test_accuracy,
            trained_at: Utc::now(),
        })
    }

    /// Class probabilities `[home, draw, away]`. Features are taken in trained
    /// order; names the vector does not know read as 0.
    pub fn predict_proba(&self, features: &FeatureVector) -> [f64; N_CLASSES] {
        let row: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| features.get(name).unwrap_or(0.0))
            .collect();
        self.forest.predict_proba(&self.scaler.transform_row(&row))
    }

    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let state: Self = serde_json::from_slice(blob)?;
        let width = state.feature_names.len();
        if state.scaler.means.len() != width || state.scaler.scales.len() != width {
            return Err(PredictorError::InvalidModel(format!(
                "{} feature names but scaler for {}",
                width,
                state.scaler.means.len()
            )));
        }
        state.forest.validate(width)?;
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_blob()?)?;
        tracing::info!("Saved model to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let state = Self::from_blob(&std::fs::read(path)?)?;
        tracing::info!(
            "Loaded model from {} (trained {} on {} examples)",
            path.display(),
            state.trained_at.format("%Y-%m-%d %H:%M"),
            state.examples_used
        );
        Ok(state)
    }
}

fn design_matrix(examples: &[TrainingExample], indices: &[usize]) -> (DMatrix<f64>, Vec<usize>) {
    let mut values = Vec::with_capacity(indices.len() * FEATURE_NAMES.len());
    let mut labels = Vec::with_capacity(indices.len());
    for &i in indices {
        values.extend_from_slice(&examples[i].features.values());
        labels.push(examples[i].outcome.label());
    }
    (
        DMatrix::from_row_slice(indices.len(), FEATURE_NAMES.len(), &values),
        labels,
    )
}

/// Trained classifier sub-model; empty until `train` or `load_state`.
#[derive(Debug, Clone, Default)]
pub struct MlClassifier {
    state: Option<TrainedModelState>,
}

impl MlClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: TrainedModelState) -> Self {
        Self { state: Some(state) }
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&TrainedModelState> {
        self.state.as_ref()
    }

    pub fn train(&mut self, examples: &[TrainingExample], config: &PredictorConfig) -> Result<&TrainedModelState> {
        let state = TrainedModelState::fit(examples, config)?;
        Ok(self.state.insert(state))
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<ClassifierPrediction> {
        let state = self.state.as_ref().ok_or(PredictorError::ModelNotTrained)?;
        let [home_win_prob, draw_prob, away_win_prob] = state.predict_proba(features);
        Ok(ClassifierPrediction {
            home_win_prob,
            draw_prob,
            away_win_prob,
        })
    }
}

/// Label the most recent finished fixtures and compute their features.
///
/// In `FeatureMode::Current` every fixture reads today's history, so features
/// can include results from after the fixture was played. Fixtures whose
/// features cannot be built from malformed records are skipped; store
/// failures abort.
pub async fn prepare_training_data<S: MatchStore>(
    engineer: &FeatureEngineer<S>,
    limit: u32,
    mode: FeatureMode,
) -> Result<Vec<TrainingExample>> {
    let corpus = engineer.store().fetch_training_corpus(limit).await?;
    let mut examples = Vec::with_capacity(corpus.len());
    let mut skipped = 0usize;

    for record in &corpus {
        let Some(outcome) = record.outcome() else {
            skipped += 1;
            continue;
        };
        let as_of = match mode {
            FeatureMode::Current => None,
            FeatureMode::PointInTime => Some(record.match_date),
        };
        match engineer
            .build_feature_vector_as_of(record.home_team_id, record.away_team_id, as_of)
            .await
        {
            Ok(features) => examples.push(TrainingExample { features, outcome }),
            Err(PredictorError::InvalidRecord(reason)) => {
                tracing::warn!("Skipping fixture {}: {}", record.id, reason);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Prepared {} training examples from {} fixtures ({} skipped)",
        examples.len(),
        corpus.len(),
        skipped
    );
    Ok(examples)
}
