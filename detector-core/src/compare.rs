//! Cross-dataset model comparison.

use crate::boosting::GradientBoostedTrees;
use crate::checkpoint::save_boosted;
use crate::config::{ExperimentConfig, Validate};
use crate::dataset::{CharVocabulary, LabeledUrls};
use crate::error::{DetectorError, Result};
use crate::history::{RunRecord, RunStore};
use crate::lexical::extract_matrix;
use crate::metrics::{roc_curve, write_roc_csv, Evaluation};
use crate::model::{ModelKind, UrlClassifier, UrlDetector};
use crate::train::{fit, TrainConfig};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A model the experiment can train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Neural(ModelKind),
    Boosted,
}

impl ModelChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelChoice::Neural(kind) => kind.as_str(),
            ModelChoice::Boosted => "boosted",
        }
    }
}

impl FromStr for ModelChoice {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "boosted" => Ok(ModelChoice::Boosted),
            other => other.parse().map(ModelChoice::Neural),
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub dataset: String,
    pub model: ModelChoice,
    pub evaluation: Evaluation,
    pub run_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonReport {
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonReport {
    /// Best row by F1 for `dataset`.
    pub fn best(&self, dataset: &str) -> Option<&ComparisonRow> {
        self.rows
            .iter()
            .filter(|r| r.dataset == dataset)
            .max_by(|a, b| a.evaluation.metrics.f1.total_cmp(&b.evaluation.metrics.f1))
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{:<20} {:<12} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            "dataset", "model", "samples", "accuracy", "precision", "recall", "f1", "auc", "loss"
        );
        out.push_str(&"-".repeat(102));
        out.push('\n');
        for row in &self.rows {
            let m = &row.evaluation.metrics;
            let auc = row
                .evaluation
                .auc
                .map(|a| format!("{:.4}", a))
                .unwrap_or_else(|| "n/a".to_string());
            out.push_str(&format!(
                "{:<20} {:<12} {:>8} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9} {:>9.4}\n",
                row.dataset,
                row.model.as_str(),
                row.evaluation.samples,
                m.accuracy,
                m.precision,
                m.recall,
                m.f1,
                auc,
                row.evaluation.loss
            ));
        }
        out
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub struct Experiment {
    config: ExperimentConfig,
    models: Vec<ModelChoice>,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let models = config
            .experiment
            .models
            .iter()
            .map(|m| m.parse())
            .collect::<Result<Vec<ModelChoice>>>()?;
        Ok(Self { config, models })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn models(&self) -> &[ModelChoice] {
        &self.models
    }

    /// Train and evaluate every model on every dataset, recording each
    /// result in `store` when one is given.
    pub fn run(&self, store: Option<&RunStore>) -> Result<ComparisonReport> {
        let mut report = ComparisonReport::default();
        for spec in &self.config.datasets {
            let mut data = spec.load()?;
            if data.is_empty() {
                return Err(DetectorError::empty(format!("dataset '{}' has no rows", spec.name)));
            }
            data.shuffle(self.config.experiment.seed);
            let (train, test) = data.split_at(1.0 - self.config.experiment.test_fraction);
            if train.is_empty() || test.is_empty() {
                return Err(DetectorError::empty(format!(
                    "dataset '{}' is too small to split ({} rows)",
                    spec.name,
                    data.len()
                )));
            }
            tracing::info!(
                "Dataset {}: {} training rows, {} test rows",
                spec.name,
                train.len(),
                test.len()
            );

            for &choice in &self.models {
                let classifier = self.train_model(choice, &spec.name, &train)?;
                let scores = classifier.predict_urls(&test.urls)?;
                let evaluation = Evaluation::from_scores(&scores, &test.labels)?;
                tracing::info!("{} on {}: {}", choice, spec.name, evaluation.metrics);

                if let Some(dir) = &self.config.output.roc_dir {
                    std::fs::create_dir_all(dir)?;
                    let path = PathBuf::from(dir).join(format!("{}_{}.csv", spec.name, choice));
                    write_roc_csv(&path, &roc_curve(&scores, &test.labels)?)?;
                }

                let run_id = match store {
                    Some(store) => {
                        let (_, malicious) = test.class_balance();
                        let record = RunRecord::from_evaluation(&spec.name, choice.as_str(), malicious, &evaluation);
                        Some(store.record(&record)?)
                    }
                    None => None,
                };
                report.rows.push(ComparisonRow {
                    dataset: spec.name.clone(),
                    model: choice,
                    evaluation,
                    run_id,
                });
            }
        }
        Ok(report)
    }

    fn train_model(&self, choice: ModelChoice, dataset: &str, train: &LabeledUrls) -> Result<Box<dyn UrlClassifier>> {
        let checkpoint = self
            .config
            .output
            .checkpoint_dir
            .as_ref()
            .map(|dir| -> Result<PathBuf> {
                std::fs::create_dir_all(dir)?;
                Ok(PathBuf::from(dir).join(format!("{}_{}", dataset, choice)))
            })
            .transpose()?;

        match choice {
            ModelChoice::Neural(kind) => {
                let docs = CharVocabulary::new().encode_all(&train.urls);
                let mut detector = UrlDetector::new(kind, self.config.model.clone());
                let training = TrainConfig {
                    run_name: Some(format!("{}_{}", dataset, kind)),
                    ..self.config.training.clone()
                };
                fit(&mut detector, &docs, &train.labels, &training)?;
                if let Some(path) = checkpoint {
                    detector.save(path.with_extension("bin"))?;
                }
                Ok(Box::new(detector))
            }
            ModelChoice::Boosted => {
                let features = extract_matrix(&train.urls);
                let model = GradientBoostedTrees::fit(&features, &train.labels, &self.config.boosting)?;
                if let Some(path) = checkpoint {
                    save_boosted(&model, path.with_extension("json"))?;
                }
                Ok(Box::new(model))
            }
        }
    }
}
