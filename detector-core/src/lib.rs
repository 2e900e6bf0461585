//! Malicious URL detection: character-level neural detectors, a boosted
//! baseline on lexical features, and the tooling to train, persist and
//! compare them across datasets.

pub mod boosting;
pub mod checkpoint;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod error;
pub mod history;
pub mod layers;
pub mod lexical;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod train;

pub use boosting::{BoostConfig, GradientBoostedTrees};
pub use checkpoint::{load_boosted, load_classifier, save_boosted};
pub use compare::{ComparisonReport, Experiment, ModelChoice};
pub use config::{ExperimentConfig, Validate};
pub use dataset::{load_data, CharVocabulary, DatasetSpec, LabeledUrls};
pub use error::{DetectorError, Result};
pub use history::{RunRecord, RunStore};
pub use metrics::{ClassificationMetrics, Evaluation};
pub use model::{DetectorArgs, ModelKind, UrlClassifier, UrlDetector};
pub use train::{evaluate, fit, TrainConfig};
