use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PredictorError;

pub type TeamId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    /// Canonical code written to the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "NS",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FT",
            MatchStatus::Postponed => "PST",
            MatchStatus::Cancelled => "CANC",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NS" | "TBD" | "scheduled" => Ok(MatchStatus::Scheduled),
            "1H" | "HT" | "2H" | "ET" | "BT" | "P" | "LIVE" | "live" => Ok(MatchStatus::Live),
            "FT" | "AET" | "PEN" | "finished" => Ok(MatchStatus::Finished),
            "PST" | "SUSP" | "postponed" => Ok(MatchStatus::Postponed),
            "CANC" | "ABD" | "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(PredictorError::InvalidRecord(format!(
                "unknown match status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a fixture from the home side's point of view. The discriminant is
/// the classifier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin = 0,
    Draw = 1,
    AwayWin = 2,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin];

    pub fn from_goals(home_goals: u32, away_goals: u32) -> Self {
        match home_goals.cmp(&away_goals) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Less => Outcome::AwayWin,
        }
    }

    pub fn label(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::HomeWin => write!(f, "home win"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::AwayWin => write!(f, "away win"),
        }
    }
}

/// A fixture as stored. Only finished records with both scores take part in
/// feature computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: i64,
    pub league_id: Option<i64>,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub match_date: DateTime<Utc>,
    pub status: MatchStatus,
}

impl MatchRecord {
    /// Final score when the match is finished and both goals are known.
    pub fn final_score(&self) -> Option<(u32, u32)> {
        match (self.status, self.home_goals, self.away_goals) {
            (MatchStatus::Finished, Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.final_score().map(|(h, a)| Outcome::from_goals(h, a))
    }

    pub fn involves(&self, team_id: TeamId) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }
}

/// Points and average goals over a team's recent matches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamFormSummary {
    pub points: u32,
    pub avg_goals_for: f64,
    pub avg_goals_against: f64,
    pub matches_played: u32,
}

/// Results of recent meetings, tallied from `team_a`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeadToHeadSummary {
    pub team_a_wins: u32,
    pub draws: u32,
    pub team_b_wins: u32,
}

impl HeadToHeadSummary {
    pub fn meetings(&self) -> u32 {
        self.team_a_wins + self.draws + self.team_b_wins
    }
}

/// Aggregate season record for a team, refreshed by ingestion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeasonStatsSnapshot {
    pub team_id: TeamId,
    pub league_id: i64,
    pub season: i32,
    pub matches_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub home_wins: u32,
    pub home_draws: u32,
    pub home_losses: u32,
    pub away_wins: u32,
    pub away_draws: u32,
    pub away_losses: u32,
    pub updated_at: DateTime<Utc>,
}

impl SeasonStatsSnapshot {
    pub fn win_rate(&self) -> f64 {
        self.wins as f64 / self.matches_played.max(1) as f64
    }

    pub fn goals_per_game(&self) -> f64 {
        self.goals_for as f64 / self.matches_played.max(1) as f64
    }
}

pub const FEATURE_COUNT: usize = 17;

/// Canonical feature order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_form_points",
    "away_form_points",
    "home_avg_goals_for",
    "away_avg_goals_for",
    "home_avg_goals_against",
    "away_avg_goals_against",
    "home_home_points",
    "away_away_points",
    "home_home_goals_for",
    "away_away_goals_for",
    "h2h_home_wins",
    "h2h_draws",
    "h2h_away_wins",
    "home_win_rate",
    "away_win_rate",
    "home_goals_per_game",
    "away_goals_per_game",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub home_form_points: f64,
    pub away_form_points: f64,
    pub home_avg_goals_for: f64,
    pub away_avg_goals_for: f64,
    pub home_avg_goals_against: f64,
    pub away_avg_goals_against: f64,
    pub home_home_points: f64,
    pub away_away_points: f64,
    pub home_home_goals_for: f64,
    pub away_away_goals_for: f64,
    pub h2h_home_wins: f64,
    pub h2h_draws: f64,
    pub h2h_away_wins: f64,
    pub home_win_rate: f64,
    pub away_win_rate: f64,
    pub home_goals_per_game: f64,
    pub away_goals_per_game: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.home_form_points,
            self.away_form_points,
            self.home_avg_goals_for,
            self.away_avg_goals_for,
            self.home_avg_goals_against,
            self.away_avg_goals_against,
            self.home_home_points,
            self.away_away_points,
            self.home_home_goals_for,
            self.away_away_goals_for,
            self.h2h_home_wins,
            self.h2h_draws,
            self.h2h_away_wins,
            self.home_win_rate,
            self.away_win_rate,
            self.home_goals_per_game,
            self.away_goals_per_game,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.values()[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.values())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub home_win_prob: f64,
    pub draw_prob: f64,
    pub away_win_prob: f64,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub confidence: f64,
}

impl PredictionResult {
    pub fn probability_sum(&self) -> f64 {
        self.home_win_prob + self.draw_prob + self.away_win_prob
    }

    pub fn probability(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::HomeWin => self.home_win_prob,
            Outcome::Draw => self.draw_prob,
            Outcome::AwayWin => self.away_win_prob,
        }
    }

    /// Most probable outcome; ties go to the earlier of home, draw, away.
    pub fn most_likely(&self) -> Outcome {
        Outcome::ALL
            .into_iter()
            .fold(Outcome::HomeWin, |best, o| {
                if self.probability(o) > self.probability(best) {
                    o
                } else {
                    best
                }
            })
    }
}
