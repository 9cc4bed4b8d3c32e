pub mod classifier;
pub mod feature_engineer;
pub mod forest;
pub mod poisson;
pub mod predictor;

pub use classifier::{MlClassifier, TrainedModelState, TrainingExample};
pub use feature_engineer::FeatureEngineer;
pub use forest::{RandomForest, StandardScaler};
pub use poisson::{PoissonModel, PoissonPrediction};
pub use predictor::HybridPredictor;
