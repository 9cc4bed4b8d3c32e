use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::{match_from_row, season_stats_from_row};
use crate::error::Result;
use crate::models::{MatchRecord, MatchStatus, SeasonStatsSnapshot, TeamId};

/// Which side of the fixture a team must have played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Any,
    Home,
    Away,
}

/// Read access to the match history.
///
/// Every query returns finished matches with both scores known, most recent
/// first. `before` limits results to records dated strictly earlier than the
/// cutoff; `None` reads the current state of the store.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn fetch_finished_matches(
        &self,
        team_id: TeamId,
        venue: Venue,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MatchRecord>>;

    /// Meetings between the two teams with either one at home.
    async fn fetch_head_to_head(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MatchRecord>>;

    async fn fetch_latest_season_stats(
        &self,
        team_id: TeamId,
        before: Option<DateTime<Utc>>,
    ) -> Result<Option<SeasonStatsSnapshot>>;

    /// Most recent finished fixtures. Rows that fail validation are left out
    /// rather than failing the read.
    async fn fetch_training_corpus(&self, limit: u32) -> Result<Vec<MatchRecord>>;
}

const FIXTURE_COLUMNS: &str =
    "id, league_id, home_team_id, away_team_id, match_date, status, home_goals, away_goals";

#[derive(Debug, Clone)]
pub struct SqliteMatchStore {
    pool: SqlitePool,
}

impl SqliteMatchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn cutoff(before: Option<DateTime<Utc>>) -> Option<String> {
    before.map(|dt| dt.to_rfc3339())
}

#[async_trait]
impl MatchStore for SqliteMatchStore {
    async fn fetch_finished_matches(
        &self,
        team_id: TeamId,
        venue: Venue,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MatchRecord>> {
        let team_clause = match venue {
            Venue::Any => "(home_team_id = ? OR away_team_id = ?)",
            Venue::Home => "home_team_id = ?",
            Venue::Away => "away_team_id = ?",
        };
        let sql = format!(
            r#"SELECT {FIXTURE_COLUMNS} FROM fixtures
               WHERE {team_clause}
                 AND status = ?
                 AND home_goals IS NOT NULL AND away_goals IS NOT NULL
                 AND (? IS NULL OR match_date < ?)
               ORDER BY match_date DESC, id DESC
               LIMIT ?"#
        );

        let mut query = sqlx::query(&sql).bind(team_id);
        if venue == Venue::Any {
            query = query.bind(team_id);
        }
        let cutoff = cutoff(before);
        let rows = query
            .bind(MatchStatus::Finished.as_str())
            .bind(cutoff.clone())
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn fetch_head_to_head(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MatchRecord>> {
        let sql = format!(
            r#"SELECT {FIXTURE_COLUMNS} FROM fixtures
               WHERE ((home_team_id = ? AND away_team_id = ?)
                   OR (home_team_id = ? AND away_team_id = ?))
                 AND status = ?
                 AND home_goals IS NOT NULL AND away_goals IS NOT NULL
                 AND (? IS NULL OR match_date < ?)
               ORDER BY match_date DESC, id DESC
               LIMIT ?"#
        );

        let cutoff = cutoff(before);
        let rows = sqlx::query(&sql)
            .bind(team_a)
            .bind(team_b)
            .bind(team_b)
            .bind(team_a)
            .bind(MatchStatus::Finished.as_str())
            .bind(cutoff.clone())
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn fetch_latest_season_stats(
        &self,
        team_id: TeamId,
        before: Option<DateTime<Utc>>,
    ) -> Result<Option<SeasonStatsSnapshot>> {
        let cutoff = cutoff(before);
        let row = sqlx::query(
            r#"SELECT * FROM team_stats
               WHERE team_id = ?
                 AND (? IS NULL OR updated_at < ?)
               ORDER BY updated_at DESC, season DESC
               LIMIT 1"#,
        )
        .bind(team_id)
        .bind(cutoff.clone())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(season_stats_from_row).transpose()
    }

    async fn fetch_training_corpus(&self, limit: u32) -> Result<Vec<MatchRecord>> {
        let sql = format!(
            r#"SELECT {FIXTURE_COLUMNS} FROM fixtures
               WHERE status = ?
                 AND home_goals IS NOT NULL AND away_goals IS NOT NULL
               ORDER BY match_date DESC, id DESC
               LIMIT ?"#
        );

        let rows = sqlx::query(&sql)
            .bind(MatchStatus::Finished.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        // One bad row must not cost the whole corpus.
        let mut corpus = Vec::with_capacity(rows.len());
        for row in &rows {
            match match_from_row(row) {
                Ok(record) => corpus.push(record),
                Err(e) => tracing::warn!("Skipping malformed fixture row: {}", e),
            }
        }
        Ok(corpus)
    }
}
