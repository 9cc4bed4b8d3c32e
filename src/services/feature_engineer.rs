use chrono::{DateTime, Utc};

use crate::db::{MatchStore, Venue};
use crate::error::Result;
use crate::models::{
    FeatureVector, HeadToHeadSummary, MatchRecord, Outcome, TeamFormSummary, TeamId,
};
use crate::utils::result_points;

/// Derives team-strength features from the match history store.
///
/// Teams without history produce zero-valued summaries. The only error that
/// escapes is whatever the store reports.
pub struct FeatureEngineer<S> {
    store: S,
    form_window: u32,
    h2h_window: u32,
}

impl<S: MatchStore> FeatureEngineer<S> {
    pub fn new(store: S) -> Self {
        Self::with_windows(store, 5, 5)
    }

    pub fn with_windows(store: S, form_window: u32, h2h_window: u32) -> Self {
        Self {
            store,
            form_window,
            h2h_window,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn form_window(&self) -> u32 {
        self.form_window
    }

    /// Form over the team's last `n` finished matches, home or away.
    pub async fn team_form(&self, team_id: TeamId, n: u32) -> Result<TeamFormSummary> {
        self.form_as_of(team_id, Venue::Any, n, None).await
    }

    /// Form restricted to matches the team played at home (`is_home`) or away.
    pub async fn home_away_form(&self, team_id: TeamId, is_home: bool, n: u32) -> Result<TeamFormSummary> {
        let venue = if is_home { Venue::Home } else { Venue::Away };
        self.form_as_of(team_id, venue, n, None).await
    }

    /// Last `n` meetings in either venue, tallied from `team_a`'s side.
    pub async fn head_to_head(&self, team_a: TeamId, team_b: TeamId, n: u32) -> Result<HeadToHeadSummary> {
        self.head_to_head_as_of(team_a, team_b, n, None).await
    }

    pub async fn build_feature_vector(&self, home_team_id: TeamId, away_team_id: TeamId) -> Result<FeatureVector> {
        self.build_feature_vector_as_of(home_team_id, away_team_id, None).await
    }

    /// Same as `build_feature_vector`, but only reads history dated strictly
    /// before `as_of` when it is set.
    pub async fn build_feature_vector_as_of(
        &self,
        home_team_id: TeamId,
        away_team_id: TeamId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<FeatureVector> {
        let n = self.form_window;

        let home_form = self.form_as_of(home_team_id, Venue::Any, n, as_of).await?;
        let away_form = self.form_as_of(away_team_id, Venue::Any, n, as_of).await?;

        let home_home_form = self.form_as_of(home_team_id, Venue::Home, n, as_of).await?;
        let away_away_form = self.form_as_of(away_team_id, Venue::Away, n, as_of).await?;

        let h2h = self
            .head_to_head_as_of(home_team_id, away_team_id, self.h2h_window, as_of)
            .await?;

        let home_stats = self.store.fetch_latest_season_stats(home_team_id, as_of).await?;
        let away_stats = self.store.fetch_latest_season_stats(away_team_id, as_of).await?;

        Ok(FeatureVector {
            home_form_points: home_form.points as f64,
            away_form_points: away_form.points as f64,
            home_avg_goals_for: home_form.avg_goals_for,
            away_avg_goals_for: away_form.avg_goals_for,
            home_avg_goals_against: home_form.avg_goals_against,
            away_avg_goals_against: away_form.avg_goals_against,

            home_home_points: home_home_form.points as f64,
            away_away_points: away_away_form.points as f64,
            home_home_goals_for: home_home_form.avg_goals_for,
            away_away_goals_for: away_away_form.avg_goals_for,

            h2h_home_wins: h2h.team_a_wins as f64,
            h2h_draws: h2h.draws as f64,
            h2h_away_wins: h2h.team_b_wins as f64,

            home_win_rate: home_stats.as_ref().map_or(0.0, |s| s.win_rate()),
            away_win_rate: away_stats.as_ref().map_or(0.0, |s| s.win_rate()),
            home_goals_per_game: home_stats.as_ref().map_or(0.0, |s| s.goals_per_game()),
            away_goals_per_game: away_stats.as_ref().map_or(0.0, |s| s.goals_per_game()),
        })
    }

    async fn form_as_of(
        &self,
        team_id: TeamId,
        venue: Venue,
        n: u32,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<TeamFormSummary> {
        let matches = self.store.fetch_finished_matches(team_id, venue, n, as_of).await?;
        Ok(summarize_form(team_id, &matches))
    }

    async fn head_to_head_as_of(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        n: u32,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<HeadToHeadSummary> {
        let meetings = self.store.fetch_head_to_head(team_a, team_b, n, as_of).await?;
        Ok(tally_head_to_head(team_a, &meetings))
    }
}

/// Points and goal averages for `team_id` over `matches`. Records that do not
/// involve the team or lack a final score are ignored.
pub fn summarize_form(team_id: TeamId, matches: &[MatchRecord]) -> TeamFormSummary {
    let mut summary = TeamFormSummary::default();
    let mut goals_for = 0u32;
    let mut goals_against = 0u32;

    for record in matches.iter().filter(|m| m.involves(team_id)) {
        let Some((home_goals, away_goals)) = record.final_score() else {
            continue;
        };
        let (scored, conceded) = if record.home_team_id == team_id {
            (home_goals, away_goals)
        } else {
            (away_goals, home_goals)
        };
        summary.points += result_points(scored, conceded);
        summary.matches_played += 1;
        goals_for += scored;
        goals_against += conceded;
    }

    if summary.matches_played > 0 {
        let played = summary.matches_played as f64;
        summary.avg_goals_for = goals_for as f64 / played;
        summary.avg_goals_against = goals_against as f64 / played;
    }
    summary
}

pub fn tally_head_to_head(team_a: TeamId, meetings: &[MatchRecord]) -> HeadToHeadSummary {
    let mut summary = HeadToHeadSummary::default();
    for record in meetings {
        let Some(outcome) = record.outcome() else {
            continue;
        };
        let a_at_home = record.home_team_id == team_a;
        match (outcome, a_at_home) {
            (Outcome::Draw, _) => summary.draws += 1,
            (Outcome::HomeWin, true) | (Outcome::AwayWin, false) => summary.team_a_wins += 1,
            (Outcome::HomeWin, false) | (Outcome::AwayWin, true) => summary.team_b_wins += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{base_date, finished, memory_pool, snapshot};
    use crate::db::{insert_fixture, upsert_team_stats, SqliteMatchStore};
    use crate::models::FEATURE_NAMES;

    const TEAM_A: TeamId = 1;
    const TEAM_B: TeamId = 2;

    /// Team A, oldest first: goals for [2,1,3,0,1], against [1,1,1,2,0], so
    /// W D W L W. Three wins, a draw and a loss make 10 form points. Team B
    /// has no history.
    async fn store_with_team_a_history() -> SqliteMatchStore {
        let pool = memory_pool().await;
        let fixtures = vec![
            finished(1, TEAM_A, 10, 2, 1, 50),
            finished(2, 11, TEAM_A, 1, 1, 40),
            finished(3, TEAM_A, 12, 3, 1, 30),
            finished(4, 13, TEAM_A, 2, 0, 20),
            finished(5, TEAM_A, 14, 1, 0, 10),
        ];
        for f in &fixtures {
            insert_fixture(&pool, f).await.unwrap();
        }
        SqliteMatchStore::new(pool)
    }

    #[tokio::test]
    async fn test_team_form_end_to_end() {
        let engineer = FeatureEngineer::new(store_with_team_a_history().await);

        let form = engineer.team_form(TEAM_A, 5).await.unwrap();
        assert_eq!(form.points, 10);
        assert_eq!(form.matches_played, 5);
        assert!((form.avg_goals_for - 1.4).abs() < 1e-9);
        assert!((form.avg_goals_against - 1.0).abs() < 1e-9);

        let empty = engineer.team_form(TEAM_B, 5).await.unwrap();
        assert_eq!(empty, TeamFormSummary::default());
    }

    #[test]
    fn test_summarize_form_skips_unrelated_and_unfinished_records() {
        let mut unfinished = finished(2, TEAM_A, 11, 0, 0, 20);
        unfinished.status = crate::models::MatchStatus::Live;
        let matches = vec![
            finished(1, TEAM_A, 10, 2, 2, 30),
            unfinished,
            finished(3, 12, 13, 5, 0, 10),
        ];
        let form = summarize_form(TEAM_A, &matches);
        assert_eq!(form.matches_played, 1);
        assert_eq!(form.points, 1);
        assert!((form.avg_goals_for - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_team_form_uses_only_most_recent_n() {
        let engineer = FeatureEngineer::new(store_with_team_a_history().await);

        // last two: 1-0 home win (10 days ago), 0-2 away loss (20 days ago)
        let form = engineer.team_form(TEAM_A, 2).await.unwrap();
        assert_eq!(form.points, 3);
        assert_eq!(form.matches_played, 2);
        assert!((form.avg_goals_for - 0.5).abs() < 1e-9);
        assert!((form.avg_goals_against - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_home_away_form_splits_by_venue() {
        let engineer = FeatureEngineer::new(store_with_team_a_history().await);

        let home = engineer.home_away_form(TEAM_A, true, 5).await.unwrap();
        assert_eq!(home.matches_played, 3);
        assert_eq!(home.points, 9);
        assert!((home.avg_goals_for - 2.0).abs() < 1e-9);

        let away = engineer.home_away_form(TEAM_A, false, 5).await.unwrap();
        assert_eq!(away.matches_played, 2);
        assert_eq!(away.points, 1);
        assert!((away.avg_goals_for - 0.5).abs() < 1e-9);
        assert!((away.avg_goals_against - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_head_to_head_is_symmetric() {
        let pool = memory_pool().await;
        let meetings = vec![
            finished(1, TEAM_A, TEAM_B, 2, 0, 40),
            finished(2, TEAM_B, TEAM_A, 1, 1, 30),
            finished(3, TEAM_B, TEAM_A, 3, 1, 20),
            finished(4, TEAM_A, TEAM_B, 0, 1, 10),
            finished(5, TEAM_A, 99, 4, 0, 5),
        ];
        for f in &meetings {
            insert_fixture(&pool, f).await.unwrap();
        }
        let engineer = FeatureEngineer::new(SqliteMatchStore::new(pool));

        let ab = engineer.head_to_head(TEAM_A, TEAM_B, 5).await.unwrap();
        let ba = engineer.head_to_head(TEAM_B, TEAM_A, 5).await.unwrap();

        assert_eq!(ab.meetings(), 4);
        assert_eq!(ba.meetings(), ab.meetings());
        assert_eq!(ab.team_a_wins, 1);
        assert_eq!(ab.team_b_wins, 2);
        assert_eq!(ab.draws, 1);
        assert_eq!(ba.team_a_wins, ab.team_b_wins);
        assert_eq!(ba.team_b_wins, ab.team_a_wins);
        assert_eq!(ba.draws, ab.draws);

        let none = engineer.head_to_head(TEAM_A, 42, 5).await.unwrap();
        assert_eq!(none, HeadToHeadSummary::default());
    }

    #[tokio::test]
    async fn test_feature_vector_for_unknown_teams_is_all_zero() {
        let engineer = FeatureEngineer::new(SqliteMatchStore::new(memory_pool().await));

        let features = engineer.build_feature_vector(500, 501).await.unwrap();
        assert_eq!(features, FeatureVector::default());
        assert!(FEATURE_NAMES.iter().all(|n| features.get(n) == Some(0.0)));
    }

    #[tokio::test]
    async fn test_feature_vector_composes_form_h2h_and_season_stats() {
        let store = store_with_team_a_history().await;
        insert_fixture(store.pool(), &finished(6, TEAM_B, TEAM_A, 2, 2, 5)).await.unwrap();
        upsert_team_stats(store.pool(), &snapshot(TEAM_A, 2024, 20, 12, 36)).await.unwrap();
        // TEAM_B has no snapshot
        let engineer = FeatureEngineer::new(store);

        let features = engineer.build_feature_vector(TEAM_A, TEAM_B).await.unwrap();

        // the 2-2 draw pushes the 2-0 opening win out of A's window
        assert_eq!(features.home_form_points, 8.0);
        assert_eq!(features.away_form_points, 1.0);
        assert!((features.away_avg_goals_for - 2.0).abs() < 1e-9);
        assert!((features.away_avg_goals_against - 2.0).abs() < 1e-9);
        assert_eq!(features.home_home_points, 9.0);
        assert_eq!(features.away_away_points, 0.0);
        assert_eq!(features.h2h_home_wins, 0.0);
        assert_eq!(features.h2h_draws, 1.0);
        assert_eq!(features.h2h_away_wins, 0.0);
        assert!((features.home_win_rate - 0.6).abs() < 1e-9);
        assert!((features.home_goals_per_game - 1.8).abs() < 1e-9);
        assert_eq!(features.away_win_rate, 0.0);
        assert_eq!(features.away_goals_per_game, 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_with_zero_matches_does_not_divide_by_zero() {
        let store = SqliteMatchStore::new(memory_pool().await);
        upsert_team_stats(store.pool(), &snapshot(TEAM_A, 2024, 0, 0, 0)).await.unwrap();
        let engineer = FeatureEngineer::new(store);

        let features = engineer.build_feature_vector(TEAM_A, TEAM_B).await.unwrap();
        assert_eq!(features.home_win_rate, 0.0);
        assert_eq!(features.home_goals_per_game, 0.0);
    }

    #[tokio::test]
    async fn test_point_in_time_features_ignore_later_results() {
        let engineer = FeatureEngineer::new(store_with_team_a_history().await);

        // only the 2-0 win from 50 days ago predates the match 45 days ago
        let as_of = base_date() - chrono::Duration::days(45);
        let features = engineer
            .build_feature_vector_as_of(TEAM_A, TEAM_B, Some(as_of))
            .await
            .unwrap();
        assert_eq!(features.home_form_points, 3.0);
        assert!((features.home_avg_goals_for - 2.0).abs() < 1e-9);
    }
}
