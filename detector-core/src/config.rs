use crate::boosting::BoostConfig;
use crate::dataset::{CharVocabulary, DatasetSpec};
use crate::error::{DetectorError, Result};
use crate::model::{
    DetectorArgs, MAX_HIDDEN_LAYERS, MAX_KERNELS, MAX_LAYER_WIDTH, MAX_SEQUENCE_LENGTH,
};
use crate::train::TrainConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(DetectorError::config(field_name, "path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(DetectorError::config(field_name, "path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(DetectorError::config(
            field_name,
            format!("value {} must be at least {}", value, min_value),
        ));
    }
    Ok(())
}

pub fn validate_range(field_name: &str, value: usize, min_value: usize, max_value: usize) -> Result<()> {
    validate_positive_number(field_name, value, min_value)?;
    if value > max_value {
        return Err(DetectorError::config(
            field_name,
            format!("value {} must be at most {}", value, max_value),
        ));
    }
    Ok(())
}

/// Checks `0 < value < 1`.
pub fn validate_fraction(field_name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(DetectorError::config(
            field_name,
            format!("value {} must lie strictly between 0 and 1", value),
        ));
    }
    Ok(())
}

/// A full experiment description, usually read from TOML.
///
/// ```toml
/// [experiment]
/// models = ["simple_nn", "boosted"]
///
/// [[datasets]]
/// name = "kaggle"
/// path = "data/urls.csv"
/// label_column = "isMalicious"
///
/// [training]
/// epochs = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub experiment: ExperimentSection,
    pub datasets: Vec<DatasetSpec>,
    #[serde(default)]
    pub model: DetectorArgs,
    #[serde(default)]
    pub training: TrainConfig,
    #[serde(default)]
    pub boosting: BoostConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSection {
    pub models: Vec<String>,
    /// Trailing fraction of each shuffled dataset held out for testing.
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ExperimentSection {
    fn default() -> Self {
        Self {
            models: vec![
                "simple_nn".to_string(),
                "big_conv_nn".to_string(),
                "boosted".to_string(),
            ],
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub history_db: String,
    /// Trained models are saved here when set.
    pub checkpoint_dir: Option<String>,
    /// ROC curves are written here as CSV when set.
    pub roc_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            history_db: "runs.db".to_string(),
            checkpoint_dir: None,
            roc_dir: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            "Loaded experiment config from {} ({} datasets)",
            path.display(),
            config.datasets.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Validate for ExperimentConfig {
    fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(DetectorError::config("datasets", "at least one dataset is required"));
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            validate_path(&format!("datasets[{}].path", i), &dataset.path)?;
            if dataset.name.trim().is_empty() {
                return Err(DetectorError::config(&format!("datasets[{}].name", i), "name cannot be empty"));
            }
        }
        self.experiment.validate()?;
        self.model.validate()?;
        self.training.validate()?;
        self.boosting.validate()?;
        validate_path("output.history_db", &self.output.history_db)?;
        if let Some(dir) = &self.output.checkpoint_dir {
            validate_path("output.checkpoint_dir", dir)?;
        }
        if let Some(dir) = &self.output.roc_dir {
            validate_path("output.roc_dir", dir)?;
        }
        Ok(())
    }
}

impl Validate for ExperimentSection {
    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(DetectorError::config("experiment.models", "at least one model is required"));
        }
        for name in &self.models {
            if !matches!(name.as_str(), "simple_nn" | "big_conv_nn" | "boosted") {
                return Err(DetectorError::UnknownModel(name.clone()));
            }
        }
        validate_fraction("experiment.test_fraction", self.test_fraction)
    }
}

impl Validate for DetectorArgs {
    fn validate(&self) -> Result<()> {
        validate_range(
            "model.vocab_size",
            self.vocab_size,
            CharVocabulary::new().size(),
            MAX_LAYER_WIDTH,
        )?;
        validate_range("model.max_length", self.max_length, 1, MAX_SEQUENCE_LENGTH)?;
        validate_range("model.embed_dim", self.embed_dim, 1, MAX_LAYER_WIDTH)?;
        validate_range("model.filters", self.filters, 1, MAX_LAYER_WIDTH)?;
        validate_range("model.hidden_dim", self.hidden_dim, 1, MAX_LAYER_WIDTH)?;
        validate_range("model.hidden_layers", self.hidden_layers, 0, MAX_HIDDEN_LAYERS)?;
        if self.kernel_sizes.is_empty() {
            return Err(DetectorError::config("model.kernel_sizes", "at least one kernel size is required"));
        }
        if self.kernel_sizes.len() > MAX_KERNELS {
            return Err(DetectorError::config(
                "model.kernel_sizes",
                format!("at most {} kernel sizes are allowed", MAX_KERNELS),
            ));
        }
        for &k in &self.kernel_sizes {
            validate_range("model.kernel_sizes", k, 1, MAX_SEQUENCE_LENGTH)?;
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DetectorError::config(
                "model.dropout",
                format!("value {} must lie in [0, 1)", self.dropout),
            ));
        }
        Ok(())
    }
}

impl Validate for TrainConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("training.epochs", self.epochs, 1)?;
        validate_positive_number("training.batch_size", self.batch_size, 1)?;
        validate_fraction("training.validation_split", self.validation_split)?;
        if !(self.learning_rate > 0.0) {
            return Err(DetectorError::config("training.learning_rate", "must be positive"));
        }
        validate_path("training.log_dir", &self.log_dir)
    }
}

impl Validate for BoostConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("boosting.n_estimators", self.n_estimators, 1)?;
        validate_positive_number("boosting.max_depth", self.max_depth, 1)?;
        validate_positive_number("boosting.min_samples_leaf", self.min_samples_leaf, 1)?;
        validate_positive_number("boosting.max_bins", self.max_bins, 1)?;
        if !(self.learning_rate > 0.0) {
            return Err(DetectorError::config("boosting.learning_rate", "must be positive"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(DetectorError::config("boosting.subsample", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[datasets]]
name = "kaggle"
path = "data/urls.csv"
label_column = "isMalicious"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ExperimentConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.datasets.len(), 1);
        assert_eq!(config.datasets[0].url_column, "url");
        assert_eq!(config.datasets[0].label_column, "isMalicious");
        assert_eq!(config.experiment.models.len(), 3);
        assert_eq!(config.experiment.test_fraction, 0.2);
        assert_eq!(config.model, DetectorArgs::default());
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.boosting.n_estimators, 100);
        assert_eq!(config.output.history_db, "runs.db");
    }

    #[test]
    fn test_sections_override_defaults() {
        let text = format!(
            "{MINIMAL}\n[experiment]\nmodels = [\"boosted\"]\ntest_fraction = 0.3\n\n[model]\nmax_length = 64\nkernel_sizes = [3]\n\n[training]\nepochs = 1\n\n[output]\nroc_dir = \"roc\"\n"
        );
        let config = ExperimentConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.experiment.models, vec!["boosted"]);
        assert_eq!(config.model.max_length, 64);
        assert_eq!(config.model.kernel_sizes, vec![3]);
        assert_eq!(config.model.embed_dim, 32);
        assert_eq!(config.training.epochs, 1);
        assert_eq!(config.output.roc_dir.as_deref(), Some("roc"));
    }

    #[test]
    fn test_missing_datasets_is_an_error() {
        assert!(matches!(
            ExperimentConfig::from_toml_str("[training]\nepochs = 1\n"),
            Err(DetectorError::Toml(_))
        ));
        assert!(matches!(
            ExperimentConfig::from_toml_str("datasets = []\n"),
            Err(DetectorError::Config { .. })
        ));
    }

    #[test]
    fn test_range_checks() {
        let bad = [
            "\n[training]\nbatch_size = 0\n",
            "\n[training]\nvalidation_split = 1.0\n",
            "\n[model]\ndropout = 1.0\n",
            "\n[model]\nkernel_sizes = []\n",
            "\n[model]\nvocab_size = 10\n",
            "\n[model]\nhidden_dim = 0\n",
            "\n[model]\nhidden_layers = 257\n",
            "\n[model]\nmax_length = 65537\n",
            "\n[boosting]\nsubsample = 0.0\n",
        ];
        for extra in bad {
            let text = format!("{MINIMAL}{extra}");
            assert!(
                matches!(ExperimentConfig::from_toml_str(&text), Err(DetectorError::Config { .. })),
                "accepted {extra:?}"
            );
        }

        let unknown = format!("{MINIMAL}\n[experiment]\nmodels = [\"lstm\"]\n");
        assert!(matches!(
            ExperimentConfig::from_toml_str(&unknown),
            Err(DetectorError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_empty_dataset_path_rejected() {
        let text = "[[datasets]]\nname = \"x\"\npath = \"\"\n";
        assert!(ExperimentConfig::from_toml_str(text).is_err());
    }
}
