use serde::{Deserialize, Serialize};
use statrs::distribution::{Discrete, Poisson};

/// Multiplier applied to the home side's expected goals.
pub const HOME_ADVANTAGE: f64 = 1.3;
/// Scorelines are enumerated for 0..=MAX_GOALS goals per side.
pub const MAX_GOALS: usize = 5;

const GRID: usize = MAX_GOALS + 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoissonPrediction {
    pub home_win_prob: f64,
    pub draw_prob: f64,
    pub away_win_prob: f64,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
}

/// Independent-Poisson scoring model. Needs no training.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonModel;

impl PoissonModel {
    pub fn new() -> Self {
        Self
    }

    /// Expected goals for each side from average goals scored (`*_avg`) and
    /// conceded (`*_def`). Negative or non-finite rates count as zero.
    pub fn expected_goals(&self, home_avg: f64, away_avg: f64, home_def: f64, away_def: f64) -> (f64, f64) {
        let home_avg = clamp_rate("home_avg_goals_for", home_avg);
        let away_avg = clamp_rate("away_avg_goals_for", away_avg);
        let home_def = clamp_rate("home_avg_goals_against", home_def);
        let away_def = clamp_rate("away_avg_goals_against", away_def);

        (home_avg * away_def * HOME_ADVANTAGE, away_avg * home_def)
    }

    /// Joint scoreline probabilities; `grid[i][j]` is home `i`, away `j`.
    pub fn score_grid(&self, home_expected: f64, away_expected: f64) -> [[f64; GRID]; GRID] {
        let home_pmf = pmf_table(home_expected);
        let away_pmf = pmf_table(away_expected);

        let mut grid = [[0.0; GRID]; GRID];
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = home_pmf[i] * away_pmf[j];
            }
        }
        grid
    }

    /// Outcome probabilities within the truncated grid. They sum to the mass
    /// captured by 0..=MAX_GOALS, slightly below 1, and are not rescaled.
    pub fn predict_match(&self, home_avg: f64, away_avg: f64, home_def: f64, away_def: f64) -> PoissonPrediction {
        let (home_expected, away_expected) = self.expected_goals(home_avg, away_avg, home_def, away_def);
        let grid = self.score_grid(home_expected, away_expected);

        let mut home_win = 0.0;
        let mut draw = 0.0;
        let mut away_win = 0.0;
        for (i, row) in grid.iter().enumerate() {
            for (j, p) in row.iter().enumerate() {
                match i.cmp(&j) {
                    std::cmp::Ordering::Greater => home_win += p,
                    std::cmp::Ordering::Equal => draw += p,
                    std::cmp::Ordering::Less => away_win += p,
                }
            }
        }

        PoissonPrediction {
            home_win_prob: home_win,
            draw_prob: draw,
            away_win_prob: away_win,
            expected_home_goals: home_expected,
            expected_away_goals: away_expected,
        }
    }

    /// Most probable scoreline (home, away) within the grid.
    pub fn most_likely_score(&self, home_expected: f64, away_expected: f64) -> (usize, usize) {
        let grid = self.score_grid(home_expected, away_expected);
        let mut best = (0, 0);
        for (i, row) in grid.iter().enumerate() {
            for (j, &p) in row.iter().enumerate() {
                if p > grid[best.0][best.1] {
                    best = (i, j);
                }
            }
        }
        best
    }
}

fn clamp_rate(name: &str, rate: f64) -> f64 {
    if rate.is_finite() && rate >= 0.0 {
        rate
    } else {
        tracing::warn!("Clamping invalid Poisson input {}={} to 0", name, rate);
        0.0
    }
}

fn pmf_table(lambda: f64) -> [f64; GRID] {
    let mut table = [0.0; GRID];
    match Poisson::new(lambda) {
        Ok(dist) => {
            for (k, p) in table.iter_mut().enumerate() {
                *p = dist.pmf(k as u64);
            }
        }
        // A zero rate is a point mass on 0 goals.
        Err(_) => table[0] = 1.0,
    }
    table
}
