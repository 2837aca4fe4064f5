//! nimbus-train library interface
//!
//! Corpus scanning, dataset preparation, evaluation metrics and the
//! training pipeline behind the `nimbus-train` CLI.

pub mod corpus;
pub mod dataset;
pub mod metrics;
pub mod train;

pub use corpus::LabeledClip;
pub use dataset::{Dataset, Split};
pub use metrics::ClassificationReport;
pub use train::{TrainOptions, TrainOutcome};
