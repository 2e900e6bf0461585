//! Classification metrics: confusion-matrix scores, ROC curve and AUC.
//!
//! Class 0 = benign, class 1 = malicious.

use crate::error::{DetectorError, Result};
use serde::Serialize;
use std::path::Path;

const PROB_EPS: f32 = 1e-7;

/// Metrics derived from a confusion matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub fpr: f64,
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
}

impl ClassificationMetrics {
    /// Compute metrics from predicted and ground-truth labels.
    pub fn from_predictions(predictions: &[u8], labels: &[u8]) -> Result<Self> {
        check_lengths(predictions.len(), labels.len())?;

        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut tn = 0usize;
        let mut fn_count = 0usize;
        for (&pred, &label) in predictions.iter().zip(labels) {
            match (pred, label) {
                (1, 1) => tp += 1,
                (1, 0) => fp += 1,
                (0, 0) => tn += 1,
                (0, 1) => fn_count += 1,
                _ => {}
            }
        }

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let accuracy = ratio(tp + tn, tp + fp + tn + fn_count);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_count);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            accuracy,
            precision,
            recall,
            f1,
            fpr: ratio(fp, fp + tn),
            tp,
            fp,
            tn,
            fn_count,
        })
    }

    /// Threshold probabilities (`>= threshold` is malicious) and score them.
    pub fn from_scores(scores: &[f32], labels: &[u8], threshold: f32) -> Result<Self> {
        let predictions: Vec<u8> = scores.iter().map(|&s| u8::from(s >= threshold)).collect();
        Self::from_predictions(&predictions, labels)
    }
}

impl std::fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} fpr={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.fpr,
            self.tp,
            self.fp,
            self.tn,
            self.fn_count,
        )
    }
}

/// Loss, thresholded metrics and ranking quality for one scored dataset.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub loss: f64,
    pub metrics: ClassificationMetrics,
    pub auc: Option<f64>,
    pub samples: usize,
}

impl Evaluation {
    pub fn from_scores(scores: &[f32], labels: &[u8]) -> Result<Self> {
        check_lengths(scores.len(), labels.len())?;
        Ok(Self {
            loss: binary_cross_entropy(scores, labels),
            metrics: ClassificationMetrics::from_scores(scores, labels, 0.5)?,
            auc: roc_auc(scores, labels)?,
            samples: labels.len(),
        })
    }
}

/// Accuracy as a percentage, then F1 and AUC, one per line.
impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Accuracy: {:.2}%", self.metrics.accuracy * 100.0)?;
        writeln!(f, "F1-score: {:.4}", self.metrics.f1)?;
        match self.auc {
            Some(auc) => write!(f, "AUC: {:.4}", auc),
            None => write!(f, "AUC: n/a (single class)"),
        }
    }
}

/// A point on the ROC curve; samples scoring `>= threshold` are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f32,
}

/// ROC curve over every distinct score, from (0, 0) to (1, 1).
pub fn roc_curve(scores: &[f32], labels: &[u8]) -> Result<Vec<RocPoint>> {
    check_lengths(scores.len(), labels.len())?;

    let mut pairs: Vec<(f32, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    let rate = |n: usize, d: usize| if d > 0 { n as f64 / d as f64 } else { 0.0 };

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: f32::INFINITY,
    }];
    let mut tp = 0usize;
    let mut fp = 0usize;
    for (i, &(score, label)) in pairs.iter().enumerate() {
        if label == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = pairs.get(i + 1).map(|next| next.0 != score).unwrap_or(true);
        if last_of_tie {
            points.push(RocPoint {
                fpr: rate(fp, negatives),
                tpr: rate(tp, positives),
                threshold: score,
            });
        }
    }
    Ok(points)
}

/// Trapezoidal area under a curve given in increasing-FPR order.
pub fn auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
        .sum()
}

/// ROC AUC, or `None` when only one class is present.
pub fn roc_auc(scores: &[f32], labels: &[u8]) -> Result<Option<f64>> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == labels.len() {
        check_lengths(scores.len(), labels.len())?;
        return Ok(None);
    }
    Ok(Some(auc(&roc_curve(scores, labels)?)))
}

/// Mean binary cross-entropy over paired probabilities and labels.
pub fn binary_cross_entropy(probs: &[f32], labels: &[u8]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS) as f64;
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / n as f64
}

/// Write the ROC curve as `fpr,tpr,threshold` rows.
pub fn write_roc_csv<P: AsRef<Path>>(path: P, points: &[RocPoint]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

fn check_lengths(inputs: usize, labels: usize) -> Result<()> {
    if inputs != labels {
        return Err(DetectorError::LengthMismatch { inputs, labels });
    }
    Ok(())
}
