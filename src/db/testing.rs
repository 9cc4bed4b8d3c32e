use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::db::init_database_with_pool;
use crate::models::{MatchRecord, MatchStatus, SeasonStatsSnapshot, TeamId};

/// In-memory store with the full schema. A single connection keeps every
/// query on the same database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_database_with_pool(&pool).await.expect("schema");
    pool
}

pub fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 15, 0, 0).unwrap()
}

pub fn finished(
    id: i64,
    home: TeamId,
    away: TeamId,
    home_goals: u32,
    away_goals: u32,
    days_ago: i64,
) -> MatchRecord {
    MatchRecord {
        id,
        league_id: Some(1),
        home_team_id: home,
        away_team_id: away,
        home_goals: Some(home_goals),
        away_goals: Some(away_goals),
        match_date: base_date() - Duration::days(days_ago),
        status: MatchStatus::Finished,
    }
}

pub fn scheduled(id: i64, home: TeamId, away: TeamId, days_ago: i64) -> MatchRecord {
    MatchRecord {
        id,
        league_id: Some(1),
        home_team_id: home,
        away_team_id: away,
        home_goals: None,
        away_goals: None,
        match_date: base_date() - Duration::days(days_ago),
        status: MatchStatus::Scheduled,
    }
}

/// Finished fixture stored with -1 home goals, which decoding refuses.
pub async fn insert_negative_goals_row(pool: &SqlitePool, id: i64, home: TeamId, away: TeamId) {
    sqlx::query(
        "INSERT INTO fixtures (id, home_team_id, away_team_id, match_date, status, home_goals, away_goals, updated_at)
         VALUES (?, ?, ?, ?, 'FT', -1, 0, ?)",
    )
    .bind(id)
    .bind(home)
    .bind(away)
    .bind(base_date().to_rfc3339())
    .bind(base_date().to_rfc3339())
    .execute(pool)
    .await
    .expect("raw fixture insert");
}

pub fn snapshot(team_id: TeamId, season: i32, played: u32, wins: u32, goals_for: u32) -> SeasonStatsSnapshot {
    SeasonStatsSnapshot {
        team_id,
        league_id: 1,
        season,
        matches_played: played,
        wins,
        draws: 0,
        losses: played - wins,
        goals_for,
        goals_against: 0,
        updated_at: base_date(),
        ..SeasonStatsSnapshot::default()
    }
}
