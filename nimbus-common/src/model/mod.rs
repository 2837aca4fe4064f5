//! Emotion classifier: feature scaling, random forest and bundle persistence

pub mod bundle;
pub mod forest;
pub mod scaler;

pub use bundle::{EmotionModel, Prediction, TrainingSummary, DEFAULT_EMOTIONS, MODEL_FORMAT_VERSION};
pub use forest::{ForestParams, RandomForest};
pub use scaler::StandardScaler;
