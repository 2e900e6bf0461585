//! Applications behind the `url-detector` subcommands.

pub mod logger;

use anyhow::{bail, Context, Result};
use detector_core::checkpoint::{load_classifier, save_boosted};
use detector_core::history::{HistoryStats, StoredRun};
use detector_core::lexical::extract_matrix;
use detector_core::metrics::{roc_curve, write_roc_csv};
use detector_core::{
    evaluate, fit, BoostConfig, CharVocabulary, ComparisonReport, DatasetSpec, DetectorArgs,
    Evaluation, Experiment, ExperimentConfig, GradientBoostedTrees, ModelChoice, RunStore,
    TrainConfig, UrlClassifier, UrlDetector, Validate,
};
use std::path::PathBuf;

/// Trailing samples scored after training.
pub const HOLDOUT_SAMPLES: usize = 100;

/// Train one model on a CSV and save it.
pub struct TrainApp {
    pub dataset: DatasetSpec,
    pub model: ModelChoice,
    pub args: DetectorArgs,
    pub training: TrainConfig,
    pub boosting: BoostConfig,
    pub out: PathBuf,
}

impl TrainApp {
    pub fn new(dataset: DatasetSpec, model: ModelChoice, out: PathBuf) -> Self {
        Self {
            dataset,
            model,
            args: DetectorArgs::default(),
            training: TrainConfig::default(),
            boosting: BoostConfig::default(),
            out,
        }
    }

    /// Returns the evaluation on the last [`HOLDOUT_SAMPLES`] samples.
    pub fn run(&self) -> Result<Evaluation> {
        match self.model {
            ModelChoice::Neural(_) => {
                self.args.validate()?;
                self.training.validate()?;
            }
            ModelChoice::Boosted => self.boosting.validate()?,
        }
        let mut data = self
            .dataset
            .load()
            .with_context(|| format!("failed to load {}", self.dataset.path))?;
        if data.is_empty() {
            bail!("{} contains no labelled URLs", self.dataset.path);
        }
        data.shuffle(self.training.seed);
        let holdout = data.tail(HOLDOUT_SAMPLES);

        let evaluation = match self.model {
            ModelChoice::Neural(kind) => {
                let vocab = CharVocabulary::new();
                let docs = vocab.encode_all(&data.urls);
                let mut detector = UrlDetector::new(kind, self.args.clone());
                fit(&mut detector, &docs, &data.labels, &self.training)?;
                detector
                    .save(&self.out)
                    .with_context(|| format!("failed to save {}", self.out.display()))?;
                evaluate(&detector, &vocab.encode_all(&holdout.urls), &holdout.labels)?
            }
            ModelChoice::Boosted => {
                let features = extract_matrix(&data.urls);
                let model = GradientBoostedTrees::fit(&features, &data.labels, &self.boosting)?;
                save_boosted(&model, &self.out)
                    .with_context(|| format!("failed to save {}", self.out.display()))?;
                let scores = model.predict_urls(&holdout.urls)?;
                Evaluation::from_scores(&scores, &holdout.labels)?
            }
        };
        Ok(evaluation)
    }
}

/// Score a labelled CSV with a saved model.
pub struct EvaluateApp {
    pub model_path: PathBuf,
    pub dataset: DatasetSpec,
    pub roc_path: Option<PathBuf>,
}

impl EvaluateApp {
    pub fn new(model_path: PathBuf, dataset: DatasetSpec) -> Self {
        Self {
            model_path,
            dataset,
            roc_path: None,
        }
    }

    pub fn run(&self) -> Result<Evaluation> {
        let classifier = load_classifier(&self.model_path)
            .with_context(|| format!("failed to load model {}", self.model_path.display()))?;
        let data = self.dataset.load()?;
        let scores = classifier.predict_urls(&data.urls)?;
        let evaluation = Evaluation::from_scores(&scores, &data.labels)?;
        tracing::info!(
            "{} on {} URLs: {}",
            classifier.name(),
            evaluation.samples,
            evaluation.metrics
        );

        if let Some(path) = &self.roc_path {
            write_roc_csv(path, &roc_curve(&scores, &data.labels)?)
                .with_context(|| format!("failed to write ROC curve to {}", path.display()))?;
            tracing::info!("ROC curve written to {}", path.display());
        }
        Ok(evaluation)
    }
}

/// Score raw URLs with a saved model.
pub struct PredictApp {
    classifier: Box<dyn UrlClassifier>,
}

impl PredictApp {
    pub fn new(model_path: &PathBuf) -> Result<Self> {
        let classifier = load_classifier(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;
        Ok(Self { classifier })
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn run(&self, urls: &[String]) -> Result<Vec<(String, f32)>> {
        let scores = self.classifier.predict_urls(urls)?;
        Ok(urls.iter().cloned().zip(scores).collect())
    }
}

/// Run a TOML-described experiment across datasets and models.
pub struct CompareApp {
    experiment: Experiment,
}

impl CompareApp {
    pub fn new(config_path: &PathBuf) -> Result<Self> {
        let config = ExperimentConfig::from_file(config_path)
            .with_context(|| format!("invalid experiment config {}", config_path.display()))?;
        Ok(Self {
            experiment: Experiment::new(config)?,
        })
    }

    pub fn run(&self) -> Result<ComparisonReport> {
        let db = &self.experiment.config().output.history_db;
        let store = RunStore::open(db).with_context(|| format!("failed to open history {}", db))?;
        Ok(self.experiment.run(Some(&store))?)
    }
}

/// Inspect or clear the run history.
pub struct HistoryApp {
    store: RunStore,
}

impl HistoryApp {
    pub fn new(db_path: &PathBuf) -> Result<Self> {
        let store = RunStore::open(db_path)
            .with_context(|| format!("failed to open history {}", db_path.display()))?;
        Ok(Self { store })
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRun>> {
        Ok(self.store.recent(limit)?)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        Ok(self.store.stats()?)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.store.clear()?)
    }
}

/// One line per run for terminal output.
pub fn render_runs(runs: &[StoredRun]) -> String {
    let mut out = format!(
        "{:>5} {:<26} {:<20} {:<12} {:>8} {:>9} {:>9} {:>9}\n",
        "id", "timestamp", "dataset", "model", "samples", "accuracy", "f1", "auc"
    );
    for run in runs {
        let r = &run.record;
        let auc = r.auc.map(|a| format!("{:.4}", a)).unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "{:>5} {:<26} {:<20} {:<12} {:>8} {:>9.4} {:>9.4} {:>9}\n",
            run.id,
            run.timestamp.chars().take(25).collect::<String>(),
            r.dataset,
            r.model,
            r.samples,
            r.accuracy,
            r.f1,
            auc
        ));
    }
    out
}
