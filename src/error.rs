use thiserror::Error;

/// Failures the prediction core surfaces to its caller.
///
/// Missing history for a team or fixture is not an error: it degrades to
/// zero-valued features instead.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Insufficient training data: {found} usable examples, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("Model not trained - run training or load a saved model first")]
    ModelNotTrained,

    #[error("Match history store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Model blob could not be encoded or decoded: {0}")]
    ModelBlob(#[from] serde_json::Error),

    #[error("Model blob does not describe a usable model: {0}")]
    InvalidModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PredictorError>;
