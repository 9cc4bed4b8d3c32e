use chrono::{DateTime, Datelike, Duration, Utc};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::SqlitePool;
use statrs::distribution::Poisson;

use crate::db::{insert_fixture, insert_league, insert_team, upsert_team_stats};
use crate::error::{PredictorError, Result};
use crate::models::{MatchRecord, MatchStatus, SeasonStatsSnapshot, TeamId};
use crate::services::poisson::HOME_ADVANTAGE;

const DEMO_LEAGUE_ID: i64 = 1;
/// League-wide scoring rate before team strengths are applied.
const BASE_GOAL_RATE: f64 = 1.1;

const TEAM_NAMES: [&str; 20] = [
    "Arsenal",
    "Liverpool",
    "Manchester City",
    "Chelsea",
    "Aston Villa",
    "Tottenham Hotspur",
    "Newcastle United",
    "Manchester United",
    "Brighton",
    "West Ham United",
    "Everton",
    "Fulham",
    "Crystal Palace",
    "Brentford",
    "Wolves",
    "Nottingham Forest",
    "Bournemouth",
    "Leicester City",
    "Ipswich Town",
    "Southampton",
];

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub teams: usize,
    pub seasons: u32,
    pub seed: u64,
    /// Finished seasons end before this instant; the scheduled round is a
    /// week after it.
    pub anchor: DateTime<Utc>,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            teams: 20,
            seasons: 3,
            seed: 42,
            anchor: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub teams: usize,
    pub finished_fixtures: usize,
    pub scheduled_fixtures: usize,
    pub season_snapshots: usize,
}

/// Attack and defence multipliers; a defence above 1 concedes more.
struct Strength {
    attack: f64,
    defence: f64,
}

/// Populate an empty store with a deterministic demo league: double
/// round-robin seasons with Poisson goals, one stats snapshot per team and
/// season, and one round of scheduled fixtures. Returns `None` when teams
/// already exist.
pub async fn seed_demo_league(pool: &SqlitePool, options: &SeedOptions) -> Result<Option<SeedSummary>> {
    if options.teams < 2 || options.seasons == 0 {
        return Err(PredictorError::InvalidConfig(format!(
            "demo league needs at least 2 teams and 1 season, got {} and {}",
            options.teams, options.seasons
        )));
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        tracing::info!("Database already seeded ({} teams found), skipping.", count);
        return Ok(None);
    }

    tracing::info!(
        "Seeding demo league: {} teams, {} seasons (seed {})",
        options.teams,
        options.seasons,
        options.seed
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut summary = SeedSummary::default();

    insert_league(pool, DEMO_LEAGUE_ID, "Demo Premier League", Some("England")).await?;

    let team_ids: Vec<TeamId> = (1..=options.teams as TeamId).collect();
    let mut strengths = Vec::with_capacity(team_ids.len());
    for &id in &team_ids {
        let name = TEAM_NAMES
            .get(id as usize - 1)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("Team {}", id));
        insert_team(pool, id, &name, Some(DEMO_LEAGUE_ID)).await?;
        strengths.push(Strength {
            attack: rng.gen_range(0.7..1.5),
            defence: rng.gen_range(0.7..1.3),
        });
        summary.teams += 1;
    }

    let rounds = double_round_robin(&team_ids);
    let season_span = Duration::weeks(rounds.len() as i64 + 4);
    let first_year = options.anchor.year() - options.seasons as i32;
    let mut next_id = 1i64;

    for s in 0..options.seasons {
        let season = first_year + s as i32;
        let start = options.anchor - season_span * (options.seasons - s) as i32;
        let mut table: Vec<SeasonStatsSnapshot> = team_ids
            .iter()
            .map(|&team_id| SeasonStatsSnapshot {
                team_id,
                league_id: DEMO_LEAGUE_ID,
                season,
                ..SeasonStatsSnapshot::default()
            })
            .collect();
        let mut last_date = start;

        for (round, pairs) in rounds.iter().enumerate() {
            let match_date = start + Duration::weeks(round as i64);
            for &(home, away) in pairs {
                let (home_goals, away_goals) = sample_score(
                    &mut rng,
                    &strengths[home as usize - 1],
                    &strengths[away as usize - 1],
                )?;
                let fixture = MatchRecord {
                    id: next_id,
                    league_id: Some(DEMO_LEAGUE_ID),
                    home_team_id: home,
                    away_team_id: away,
                    home_goals: Some(home_goals),
                    away_goals: Some(away_goals),
                    match_date,
                    status: MatchStatus::Finished,
                };
                insert_fixture(pool, &fixture).await?;
                next_id += 1;
                summary.finished_fixtures += 1;

                record_result(&mut table[home as usize - 1], home_goals, away_goals, true);
                record_result(&mut table[away as usize - 1], away_goals, home_goals, false);
            }
            last_date = match_date;
        }

        for mut stats in table {
            stats.updated_at = last_date;
            upsert_team_stats(pool, &stats).await?;
            summary.season_snapshots += 1;
        }
    }

    if let Some(pairs) = rounds.first() {
        let match_date = options.anchor + Duration::weeks(1);
        for &(home, away) in pairs {
            let fixture = MatchRecord {
                id: next_id,
                league_id: Some(DEMO_LEAGUE_ID),
                home_team_id: home,
                away_team_id: away,
                home_goals: None,
                away_goals: None,
                match_date,
                status: MatchStatus::Scheduled,
            };
            insert_fixture(pool, &fixture).await?;
            next_id += 1;
            summary.scheduled_fixtures += 1;
        }
    }

    tracing::info!(
        "Demo league seeded: {} finished and {} scheduled fixtures",
        summary.finished_fixtures,
        summary.scheduled_fixtures
    );
    Ok(Some(summary))
}

// ─────────────────────────────────────────────────────────────────────────────
//  Schedule
// ─────────────────────────────────────────────────────────────────────────────

/// Circle-method pairings: every team hosts every other team once. An odd
/// team count gets a bye slot, which is dropped from the pairings.
fn double_round_robin(team_ids: &[TeamId]) -> Vec<Vec<(TeamId, TeamId)>> {
    let mut slots: Vec<Option<TeamId>> = team_ids.iter().copied().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();

    let mut first_half = Vec::with_capacity(n - 1);
    for round in 0..n - 1 {
        let mut pairs = Vec::with_capacity(n / 2);
        for i in 0..n / 2 {
            if let (Some(a), Some(b)) = (slots[i], slots[n - 1 - i]) {
                // alternate venues so nobody hosts every week
                pairs.push(if (round + i) % 2 == 0 { (a, b) } else { (b, a) });
            }
        }
        first_half.push(pairs);
        slots[1..].rotate_right(1);
    }

    let second_half: Vec<Vec<(TeamId, TeamId)>> = first_half
        .iter()
        .map(|pairs| pairs.iter().map(|&(h, a)| (a, h)).collect())
        .collect();
    first_half.into_iter().chain(second_half).collect()
}

fn sample_score(rng: &mut StdRng, home: &Strength, away: &Strength) -> Result<(u32, u32)> {
    let home_rate = BASE_GOAL_RATE * home.attack * away.defence * HOME_ADVANTAGE;
    let away_rate = BASE_GOAL_RATE * away.attack * home.defence;
    Ok((sample_goals(rng, home_rate)?, sample_goals(rng, away_rate)?))
}

fn sample_goals(rng: &mut StdRng, rate: f64) -> Result<u32> {
    let dist = Poisson::new(rate)
        .map_err(|e| PredictorError::InvalidConfig(format!("goal rate {}: {}", rate, e)))?;
    Ok(dist.sample(rng) as u32)
}

fn record_result(stats: &mut SeasonStatsSnapshot, scored: u32, conceded: u32, at_home: bool) {
    stats.matches_played += 1;
    stats.goals_for += scored;
    stats.goals_against += conceded;
    match (scored.cmp(&conceded), at_home) {
        (std::cmp::Ordering::Greater, true) => {
            stats.wins += 1;
            stats.home_wins += 1;
        }
        (std::cmp::Ordering::Greater, false) => {
            stats.wins += 1;
            stats.away_wins += 1;
        }
        (std::cmp::Ordering::Equal, true) => {
            stats.draws += 1;
            stats.home_draws += 1;
        }
        (std::cmp::Ordering::Equal, false) => {
            stats.draws += 1;
            stats.away_draws += 1;
        }
        (std::cmp::Ordering::Less, true) => {
            stats.losses += 1;
            stats.home_losses += 1;
        }
        (std::cmp::Ordering::Less, false) => {
            stats.losses += 1;
            stats.away_losses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{base_date, memory_pool};
    use crate::db::{get_upcoming_fixtures, MatchStore, SqliteMatchStore};
    use std::collections::HashSet;

    fn options(teams: usize, seasons: u32) -> SeedOptions {
        SeedOptions {
            teams,
            seasons,
            seed: 7,
            anchor: base_date(),
        }
    }

    #[test]
    fn test_round_robin_pairs_every_team_twice() {
        let teams: Vec<TeamId> = (1..=6).collect();
        let rounds = double_round_robin(&teams);
        assert_eq!(rounds.len(), 10);

        let fixtures: Vec<(TeamId, TeamId)> = rounds.iter().flatten().copied().collect();
        assert_eq!(fixtures.len(), 30);
        let unique: HashSet<_> = fixtures.iter().collect();
        assert_eq!(unique.len(), 30);

        for pairs in &rounds {
            let playing: HashSet<TeamId> = pairs.iter().flat_map(|&(h, a)| [h, a]).collect();
            assert_eq!(playing.len(), 6);
        }
    }

    #[test]
    fn test_round_robin_with_odd_team_count() {
        let teams: Vec<TeamId> = (1..=5).collect();
        let rounds = double_round_robin(&teams);
        let fixtures: HashSet<(TeamId, TeamId)> = rounds.iter().flatten().copied().collect();
        assert_eq!(fixtures.len(), 20);
        assert!(fixtures.iter().all(|(h, a)| h != a));
    }

    #[tokio::test]
    async fn test_seed_demo_league_counts() {
        let pool = memory_pool().await;
        let summary = seed_demo_league(&pool, &options(6, 2)).await.unwrap().unwrap();

        assert_eq!(summary.teams, 6);
        assert_eq!(summary.finished_fixtures, 60);
        assert_eq!(summary.scheduled_fixtures, 3);
        assert_eq!(summary.season_snapshots, 12);

        let store = SqliteMatchStore::new(pool.clone());
        let corpus = store.fetch_training_corpus(1000).await.unwrap();
        assert_eq!(corpus.len(), 60);
        assert!(corpus.iter().all(|m| m.match_date < base_date()));

        let upcoming = get_upcoming_fixtures(&pool, 10).await.unwrap();
        assert_eq!(upcoming.len(), 3);
        assert!(upcoming.iter().all(|m| m.match_date > base_date()));

        let stats = store.fetch_latest_season_stats(1, None).await.unwrap().unwrap();
        assert_eq!(stats.season, base_date().year() - 1);
        assert_eq!(stats.matches_played, 10);
        assert_eq!(stats.wins + stats.draws + stats.losses, 10);
        assert_eq!(stats.home_wins + stats.away_wins, stats.wins);
    }

    #[tokio::test]
    async fn test_seed_is_deterministic_and_runs_once() {
        let first = memory_pool().await;
        let second = memory_pool().await;
        seed_demo_league(&first, &options(4, 1)).await.unwrap();
        seed_demo_league(&second, &options(4, 1)).await.unwrap();

        let a = SqliteMatchStore::new(first.clone()).fetch_training_corpus(100).await.unwrap();
        let b = SqliteMatchStore::new(second).fetch_training_corpus(100).await.unwrap();
        assert_eq!(a, b);

        assert_eq!(seed_demo_league(&first, &options(4, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seed_rejects_single_team() {
        let pool = memory_pool().await;
        let err = seed_demo_league(&pool, &options(1, 1)).await.unwrap_err();
        assert!(matches!(err, PredictorError::InvalidConfig(_)));
    }
}
