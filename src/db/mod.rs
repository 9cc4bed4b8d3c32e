pub mod seed;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use seed::{seed_demo_league, SeedOptions, SeedSummary};
pub use store::{MatchStore, SqliteMatchStore, Venue};

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

use crate::error::{PredictorError, Result};
use crate::models::*;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            league_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fixtures (
            id INTEGER PRIMARY KEY,
            league_id INTEGER,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'NS',
            home_goals INTEGER,
            away_goals INTEGER,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_stats (
            team_id INTEGER NOT NULL,
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            matches_played INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            draws INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            goals_for INTEGER NOT NULL DEFAULT 0,
            goals_against INTEGER NOT NULL DEFAULT 0,
            home_wins INTEGER NOT NULL DEFAULT 0,
            home_draws INTEGER NOT NULL DEFAULT 0,
            home_losses INTEGER NOT NULL DEFAULT 0,
            away_wins INTEGER NOT NULL DEFAULT 0,
            away_draws INTEGER NOT NULL DEFAULT 0,
            away_losses INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (team_id, league_id, season)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_date ON fixtures(match_date)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_status ON fixtures(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_home ON fixtures(home_team_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_away ON fixtures(away_team_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

// League and team operations

pub async fn insert_league(pool: &SqlitePool, id: i64, name: &str, country: Option<&str>) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO leagues (id, name, country) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(country)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_team(pool: &SqlitePool, id: TeamId, name: &str, league_id: Option<i64>) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO teams (id, name, league_id) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(league_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_team_name(pool: &SqlitePool, team_id: TeamId) -> Result<Option<String>> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool)
        .await?;
    Ok(name)
}

// Fixture operations

pub async fn insert_fixture(pool: &SqlitePool, fixture: &MatchRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO fixtures
        (id, league_id, home_team_id, away_team_id, match_date, status, home_goals, away_goals, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(fixture.id)
    .bind(fixture.league_id)
    .bind(fixture.home_team_id)
    .bind(fixture.away_team_id)
    .bind(fixture.match_date.to_rfc3339())
    .bind(fixture.status.as_str())
    .bind(fixture.home_goals.map(i64::from))
    .bind(fixture.away_goals.map(i64::from))
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_upcoming_fixtures(pool: &SqlitePool, limit: i64) -> Result<Vec<MatchRecord>> {
    let rows = sqlx::query(
        r#"SELECT id, league_id, home_team_id, away_team_id, match_date, status, home_goals, away_goals
           FROM fixtures
           WHERE status = ?
           ORDER BY match_date ASC, id ASC
           LIMIT ?"#,
    )
    .bind(MatchStatus::Scheduled.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(match_from_row).collect()
}

// Season stats operations

pub async fn upsert_team_stats(pool: &SqlitePool, stats: &SeasonStatsSnapshot) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO team_stats
           (team_id, league_id, season, matches_played, wins, draws, losses, goals_for, goals_against,
            home_wins, home_draws, home_losses, away_wins, away_draws, away_losses, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(team_id, league_id, season) DO UPDATE SET
               matches_played = excluded.matches_played,
               wins           = excluded.wins,
               draws          = excluded.draws,
               losses         = excluded.losses,
               goals_for      = excluded.goals_for,
               goals_against  = excluded.goals_against,
               home_wins      = excluded.home_wins,
               home_draws     = excluded.home_draws,
               home_losses    = excluded.home_losses,
               away_wins      = excluded.away_wins,
               away_draws     = excluded.away_draws,
               away_losses    = excluded.away_losses,
               updated_at     = excluded.updated_at"#,
    )
    .bind(stats.team_id)
    .bind(stats.league_id)
    .bind(stats.season)
    .bind(stats.matches_played as i64)
    .bind(stats.wins as i64)
    .bind(stats.draws as i64)
    .bind(stats.losses as i64)
    .bind(stats.goals_for as i64)
    .bind(stats.goals_against as i64)
    .bind(stats.home_wins as i64)
    .bind(stats.home_draws as i64)
    .bind(stats.home_losses as i64)
    .bind(stats.away_wins as i64)
    .bind(stats.away_draws as i64)
    .bind(stats.away_losses as i64)
    .bind(stats.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

// Row decoding. Malformed rows fail here instead of turning into zeros later.

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| PredictorError::InvalidRecord(format!("column '{}': {}", name, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PredictorError::InvalidRecord(format!("bad timestamp '{}': {}", raw, e)))
}

fn goals(raw: Option<i64>, side: &str) -> Result<Option<u32>> {
    raw.map(|g| {
        u32::try_from(g)
            .map_err(|_| PredictorError::InvalidRecord(format!("{} goals out of range: {}", side, g)))
    })
    .transpose()
}

fn count(row: &SqliteRow, name: &str) -> Result<u32> {
    let raw: i64 = column(row, name)?;
    u32::try_from(raw)
        .map_err(|_| PredictorError::InvalidRecord(format!("{} out of range: {}", name, raw)))
}

pub(crate) fn match_from_row(row: &SqliteRow) -> Result<MatchRecord> {
    let status: String = column(row, "status")?;
    Ok(MatchRecord {
        id: column(row, "id")?,
        league_id: column(row, "league_id")?,
        home_team_id: column(row, "home_team_id")?,
        away_team_id: column(row, "away_team_id")?,
        home_goals: goals(column(row, "home_goals")?, "home")?,
        away_goals: goals(column(row, "away_goals")?, "away")?,
        match_date: parse_timestamp(&column::<String>(row, "match_date")?)?,
        status: status.parse()?,
    })
}

pub(crate) fn season_stats_from_row(row: &SqliteRow) -> Result<SeasonStatsSnapshot> {
    Ok(SeasonStatsSnapshot {
        team_id: column(row, "team_id")?,
        league_id: column(row, "league_id")?,
        season: column(row, "season")?,
        matches_played: count(row, "matches_played")?,
        wins: count(row, "wins")?,
        draws: count(row, "draws")?,
        losses: count(row, "losses")?,
        goals_for: count(row, "goals_for")?,
        goals_against: count(row, "goals_against")?,
        home_wins: count(row, "home_wins")?,
        home_draws: count(row, "home_draws")?,
        home_losses: count(row, "home_losses")?,
        away_wins: count(row, "away_wins")?,
        away_draws: count(row, "away_draws")?,
        away_losses: count(row, "away_losses")?,
        updated_at: parse_timestamp(&column::<String>(row, "updated_at")?)?,
    })
}
