//! Football match outcome prediction.
//!
//! A [`HybridPredictor`] blends an independent-Poisson scoring model with a
//! random forest trained on form, head-to-head and season features. Match
//! history comes from any [`db::MatchStore`]; `db::SqliteMatchStore` is the
//! bundled implementation.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{FeatureMode, ForestParams, PredictorConfig};
pub use error::{PredictorError, Result};
pub use models::{FeatureVector, MatchRecord, Outcome, PredictionResult, TeamId};
pub use services::HybridPredictor;
