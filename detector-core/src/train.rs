//! Training loop for the neural detectors.

use crate::dataset::class_balance;
use crate::error::{DetectorError, Result};
use crate::layers::sigmoid;
use crate::metrics::{binary_cross_entropy, Evaluation};
use crate::model::UrlDetector;
use crate::optim::Adam;
use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Training configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Fraction of samples, taken from the end, held out for validation.
    pub validation_split: f64,
    pub seed: u64,
    /// Directory receiving one JSON line per epoch.
    pub log_dir: String,
    /// Names the epoch log file; the model kind is used when unset.
    pub run_name: Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_split: 0.2,
            seed: 42,
            log_dir: "training_logs".to_string(),
            run_name: None,
        }
    }
}

/// Per-epoch metrics logged during training.
#[derive(Debug, Clone, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub val_f1: Option<f64>,
}

/// Train `detector` on encoded URLs.
///
/// The validation set is the last `validation_split` fraction of the input,
/// so shuffle beforehand.
pub fn fit(
    detector: &mut UrlDetector,
    encoded_docs: &[Vec<usize>],
    labels: &[u8],
    config: &TrainConfig,
) -> Result<Vec<EpochMetrics>> {
    if encoded_docs.len() != labels.len() {
        return Err(DetectorError::LengthMismatch {
            inputs: encoded_docs.len(),
            labels: labels.len(),
        });
    }
    if config.batch_size == 0 {
        return Err(DetectorError::config("training.batch_size", "must be at least 1"));
    }

    let n = encoded_docs.len();
    let n_train = ((n as f64) * (1.0 - config.validation_split.clamp(0.0, 1.0))) as usize;
    if n_train == 0 {
        return Err(DetectorError::empty("no samples left for training"));
    }

    let run_name = match &config.run_name {
        Some(name) => name.clone(),
        None => detector.kind().to_string(),
    };
    let (log_path, mut log_file) = create_epoch_log(Path::new(&config.log_dir), &run_name)?;

    let padded = detector.pad(encoded_docs);
    let (val_docs, val_labels) = (&encoded_docs[n_train..], &labels[n_train..]);
    let train_labels = Array1::from_iter(labels[..n_train].iter().map(|&l| l as f32));

    let (benign, malicious) = class_balance(&labels[..n_train]);
    tracing::info!(
        "Training {} on {} samples ({} benign, {} malicious), validating on {}",
        detector.kind(),
        n_train,
        benign,
        malicious,
        val_docs.len()
    );

    let mut optimizer = Adam::new(config.learning_rate);
    let mut dropout_rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n_train).collect();
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let mut shuffle_rng = StdRng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        indices.shuffle(&mut shuffle_rng);

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        for batch_idx in indices.chunks(config.batch_size) {
            let tokens = padded.select(Axis(0), batch_idx);
            let targets = train_labels.select(Axis(0), batch_idx);

            let logits = detector.forward_train(&tokens, &mut dropout_rng)?;
            let probs = logits.mapv(sigmoid);
            let batch = batch_idx.len() as f32;
            let grad = (&probs - &targets) / batch;

            detector.zero_grad();
            detector.backward(&grad)?;
            optimizer.step(detector.params_mut());

            let batch_labels: Vec<u8> = batch_idx.iter().map(|&i| labels[i]).collect();
            let batch_probs = probs.to_vec();
            total_loss += binary_cross_entropy(&batch_probs, &batch_labels) * batch_idx.len() as f64;
            correct += batch_probs
                .iter()
                .zip(&batch_labels)
                .filter(|&(&p, &y)| u8::from(p >= 0.5) == y)
                .count();
        }

        let validation = if val_docs.is_empty() {
            None
        } else {
            Some(evaluate(detector, val_docs, val_labels)?)
        };
        let metrics = EpochMetrics {
            epoch: epoch + 1,
            loss: total_loss / n_train as f64,
            accuracy: correct as f64 / n_train as f64,
            val_loss: validation.as_ref().map(|v| v.loss),
            val_accuracy: validation.as_ref().map(|v| v.metrics.accuracy),
            val_f1: validation.as_ref().map(|v| v.metrics.f1),
        };

        match &validation {
            Some(v) => tracing::info!(
                "Epoch {}/{} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4} - val_f1: {:.4}",
                metrics.epoch,
                config.epochs,
                metrics.loss,
                metrics.accuracy,
                v.loss,
                v.metrics.accuracy,
                v.metrics.f1
            ),
            None => tracing::info!(
                "Epoch {}/{} - loss: {:.4} - acc: {:.4}",
                metrics.epoch,
                config.epochs,
                metrics.loss,
                metrics.accuracy
            ),
        }

        serde_json::to_writer(&mut log_file, &metrics)?;
        log_file.write_all(b"\n")?;
        history.push(metrics);
    }

    tracing::debug!("Epoch log written to {}", log_path.display());
    Ok(history)
}

/// Create a fresh `<timestamp>_<run_name>.jsonl` in `dir`, never reusing an existing file.
fn create_epoch_log(dir: &Path, run_name: &str) -> Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let stem = format!("{}_{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"), run_name);
    let mut suffix = 0usize;
    loop {
        let path = if suffix == 0 {
            dir.join(format!("{stem}.jsonl"))
        } else {
            dir.join(format!("{stem}_{suffix}.jsonl"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Score encoded URLs and report loss, accuracy, F1 and AUC.
pub fn evaluate(detector: &UrlDetector, encoded_docs: &[Vec<usize>], labels: &[u8]) -> Result<Evaluation> {
    let probs = detector.predict_proba(encoded_docs)?;
    let evaluation = Evaluation::from_scores(&probs, labels)?;
    for line in evaluation.to_string().lines() {
        tracing::info!("{}", line);
    }
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CharVocabulary;
    use crate::model::{DetectorArgs, ModelKind};

    fn tiny_args() -> DetectorArgs {
        DetectorArgs {
            max_length: 16,
            embed_dim: 4,
            filters: 4,
            kernel_sizes: vec![2, 3],
            hidden_dim: 8,
            hidden_layers: 1,
            dropout: 0.0,
            ..DetectorArgs::default()
        }
    }

    #[test]
    fn test_fit_rejects_mismatched_inputs() {
        let mut detector = UrlDetector::new(ModelKind::SimpleNn, tiny_args());
        let err = fit(&mut detector, &[vec![2]], &[], &TrainConfig::default()).unwrap_err();
        assert!(matches!(err, DetectorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_fit_requires_training_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = UrlDetector::new(ModelKind::SimpleNn, tiny_args());
        let config = TrainConfig {
            validation_split: 0.5,
            log_dir: dir.path().to_string_lossy().into_owned(),
            ..TrainConfig::default()
        };
        let err = fit(&mut detector, &[vec![2]], &[1], &config).unwrap_err();
        assert!(matches!(err, DetectorError::EmptyDataset { .. }));
    }

    #[test]
    fn test_fit_writes_epoch_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let vocab = CharVocabulary::new();
        let urls = ["a.com", "b.com", "zz.ru/x", "qq.ru/y", "c.com", "ww.ru/z"];
        let labels = [0, 0, 1, 1, 0, 1];
        let docs = vocab.encode_all(&urls);

        let mut detector = UrlDetector::new(ModelKind::BigConvNn, tiny_args());
        let config = TrainConfig {
            epochs: 2,
            batch_size: 2,
            log_dir: log_dir.to_string_lossy().into_owned(),
            ..TrainConfig::default()
        };
        let history = fit(&mut detector, &docs, &labels, &config).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].val_loss.is_some());

        let entries: Vec<_> = fs::read_dir(&log_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["epoch"], 1);
    }

    #[test]
    fn test_repeated_fits_keep_separate_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let docs = CharVocabulary::new().encode_all(&["a.com", "zz.ru/x", "b.com", "qq.ru/y"]);
        let labels = [0, 1, 0, 1];
        let config = TrainConfig {
            epochs: 3,
            batch_size: 2,
            validation_split: 0.25,
            log_dir: log_dir.to_string_lossy().into_owned(),
            ..TrainConfig::default()
        };

        for _ in 0..2 {
            let mut detector = UrlDetector::new(ModelKind::SimpleNn, tiny_args());
            fit(&mut detector, &docs, &labels, &config).unwrap();
        }

        let mut paths: Vec<_> = fs::read_dir(&log_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        paths.sort();
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 3);
        }
    }

    #[test]
    fn test_run_name_labels_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let docs = CharVocabulary::new().encode_all(&["a.com", "zz.ru/x", "b.com", "qq.ru/y"]);
        let config = TrainConfig {
            epochs: 1,
            batch_size: 2,
            log_dir: dir.path().to_string_lossy().into_owned(),
            run_name: Some("kaggle_simple_nn".to_string()),
            ..TrainConfig::default()
        };
        let mut detector = UrlDetector::new(ModelKind::SimpleNn, tiny_args());
        fit(&mut detector, &docs, &[0, 1, 0, 1], &config).unwrap();

        let entry = fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.ends_with("_kaggle_simple_nn.jsonl"), "{name}");
    }
}
