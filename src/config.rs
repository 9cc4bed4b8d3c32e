use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PredictorError, Result};

/// How training fixtures see the match history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureMode {
    /// Every fixture reads today's history, including matches played after it.
    #[default]
    Current,
    /// Each fixture only reads records dated strictly before its kickoff.
    PointInTime,
}

impl FromStr for FeatureMode {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(FeatureMode::Current),
            "point-in-time" | "point_in_time" | "pit" => Ok(FeatureMode::PointInTime),
            other => Err(PredictorError::InvalidConfig(format!(
                "unknown feature mode '{}', expected 'current' or 'point-in-time'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    pub database_url: String,
    pub model_path: Option<PathBuf>,
    /// Lookback for overall and home/away form.
    pub form_window: u32,
    pub h2h_window: u32,
    pub training_limit: u32,
    pub min_training_examples: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub forest: ForestParams,
    pub feature_mode: FeatureMode,
    /// Rescale the blended probabilities so they sum to exactly 1.
    pub renormalize_blend: bool,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/matchcast.db".to_string(),
            model_path: None,
            form_window: 5,
            h2h_window: 5,
            training_limit: 1000,
            min_training_examples: 50,
            test_fraction: 0.2,
            seed: 42,
            forest: ForestParams::default(),
            feature_mode: FeatureMode::Current,
            renormalize_blend: false,
        }
    }
}

impl PredictorConfig {
    /// Read overrides from the environment (after `dotenv` has run).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }
        config.model_path = env::var("MATCHCAST_MODEL_PATH").ok().map(PathBuf::from);

        if let Some(v) = parse_var("MATCHCAST_FORM_WINDOW")? {
            config.form_window = v;
        }
        if let Some(v) = parse_var("MATCHCAST_H2H_WINDOW")? {
            config.h2h_window = v;
        }
        if let Some(v) = parse_var("MATCHCAST_TRAINING_LIMIT")? {
            config.training_limit = v;
        }
        if let Some(v) = parse_var("MATCHCAST_MIN_TRAINING_EXAMPLES")? {
            config.min_training_examples = v;
        }
        if let Some(v) = parse_var("MATCHCAST_SEED")? {
            config.seed = v;
        }
        if let Some(v) = parse_var("MATCHCAST_TREES")? {
            config.forest.n_trees = v;
        }
        if let Some(v) = parse_var("MATCHCAST_MAX_DEPTH")? {
            config.forest.max_depth = Some(v);
        }
        if let Some(v) = parse_var("MATCHCAST_FEATURE_MODE")? {
            config.feature_mode = v;
        }
        if let Some(v) = parse_var("MATCHCAST_RENORMALIZE")? {
            config.renormalize_blend = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.form_window == 0 || self.h2h_window == 0 {
            return Err(PredictorError::InvalidConfig(
                "form and head-to-head windows must be at least 1".to_string(),
            ));
        }
        if self.forest.n_trees == 0 {
            return Err(PredictorError::InvalidConfig(
                "forest needs at least one tree".to_string(),
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PredictorError::InvalidConfig(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.min_training_examples < 2 {
            return Err(PredictorError::InvalidConfig(
                "training needs at least 2 examples to hold one out".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PredictorError::InvalidConfig(format!("{}='{}' is not valid", key, raw))),
        Err(_) => Ok(None),
    }
}
