//! Gradient-boosted regression trees over lexical URL features.
//!
//! Logistic loss. Each round fits a depth-limited tree to the negative
//! gradients using histogram split search over per-feature quantile bins,
//! then sets every leaf to the Newton step `sum(y - p) / sum(p * (1 - p))`.

use crate::error::{DetectorError, Result};
use crate::layers::sigmoid;
use crate::lexical::extract_matrix;
use crate::model::UrlClassifier;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Upper bound on candidate thresholds per feature.
    pub max_bins: usize,
    /// Fraction of rows drawn (without replacement) for each tree.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            max_bins: 32,
            subsample: 1.0,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f32,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: ArrayView1<f32>) -> f32 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct Binned {
    /// Sorted candidate thresholds per feature.
    thresholds: Vec<Vec<f32>>,
    /// Bin of each sample per feature: number of thresholds below the value.
    bins: Array2<u16>,
}

impl Binned {
    fn new(features: &Array2<f32>, max_bins: usize) -> Self {
        let (n, d) = features.dim();
        let mut thresholds = Vec::with_capacity(d);
        for j in 0..d {
            let mut values: Vec<f32> = features.column(j).iter().copied().filter(|v| v.is_finite()).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();
            let cuts = if values.len() <= max_bins {
                values
            } else {
                let mut picked: Vec<f32> = (1..=max_bins)
                    .map(|i| values[(i * values.len()) / (max_bins + 1)])
                    .collect();
                picked.dedup();
                picked
            };
            thresholds.push(cuts);
        }
        let mut bins = Array2::<u16>::zeros((n, d));
        for i in 0..n {
            for j in 0..d {
                let v = features[[i, j]];
                bins[[i, j]] = thresholds[j].partition_point(|&t| t < v) as u16;
            }
        }
        Self { thresholds, bins }
    }
}

struct SplitSearch<'a> {
    binned: &'a Binned,
    residuals: &'a [f32],
    hessians: &'a [f32],
    config: &'a BoostConfig,
}

impl SplitSearch<'_> {
    fn leaf(&self, rows: &[usize]) -> Node {
        let g: f32 = rows.iter().map(|&i| self.residuals[i]).sum();
        let h: f32 = rows.iter().map(|&i| self.hessians[i]).sum();
        Node::Leaf {
            value: g / h.max(1e-6),
        }
    }

    fn build(&self, rows: &[usize], depth: usize) -> Node {
        let min_leaf = self.config.min_samples_leaf.max(1);
        if depth >= self.config.max_depth || rows.len() < 2 * min_leaf {
            return self.leaf(rows);
        }

        let total: f32 = rows.iter().map(|&i| self.residuals[i]).sum();
        let n = rows.len() as f32;
        let parent_score = total * total / n;

        let mut best: Option<(f32, usize, usize)> = None; // gain, feature, bin
        for (j, cuts) in self.binned.thresholds.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }
            let mut sums = vec![0.0f32; cuts.len() + 1];
            let mut counts = vec![0usize; cuts.len() + 1];
            for &i in rows {
                let b = self.binned.bins[[i, j]] as usize;
                sums[b] += self.residuals[i];
                counts[b] += 1;
            }
            let mut left_sum = 0.0f32;
            let mut left_count = 0usize;
            for b in 0..cuts.len() {
                left_sum += sums[b];
                left_count += counts[b];
                let right_count = rows.len() - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_count as f32
                    + right_sum * right_sum / right_count as f32
                    - parent_score;
                if gain > 1e-9 && best.map_or(true, |(g, _, _)| gain > g) {
                    best = Some((gain, j, b));
                }
            }
        }

        let Some((_, feature, bin)) = best else {
            return self.leaf(rows);
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| (self.binned.bins[[i, feature]] as usize) <= bin);
        Node::Split {
            feature,
            threshold: self.binned.thresholds[feature][bin],
            left: Box::new(self.build(&left_rows, depth + 1)),
            right: Box::new(self.build(&right_rows, depth + 1)),
        }
    }
}

/// Boosted ensemble of regression trees with a logistic link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f32,
    learning_rate: f32,
    n_features: usize,
    trees: Vec<Node>,
}

impl GradientBoostedTrees {
    pub fn fit(features: &Array2<f32>, labels: &[u8], config: &BoostConfig) -> Result<Self> {
        let (n, d) = features.dim();
        if n != labels.len() {
            return Err(DetectorError::LengthMismatch {
                inputs: n,
                labels: labels.len(),
            });
        }
        if n == 0 {
            return Err(DetectorError::empty("no samples to fit boosted trees on"));
        }

        let positives = labels.iter().filter(|&&l| l == 1).count() as f32;
        let rate = (positives / n as f32).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (rate / (1.0 - rate)).ln();

        let binned = Binned::new(features, config.max_bins.clamp(1, u16::MAX as usize - 1));
        let mut scores = vec![base_score; n];
        let mut residuals = vec![0.0f32; n];
        let mut hessians = vec![0.0f32; n];
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut all_rows: Vec<usize> = (0..n).collect();
        let sample_size = ((n as f64) * config.subsample.clamp(0.0, 1.0)).ceil().max(1.0) as usize;
        let mut trees = Vec::with_capacity(config.n_estimators);

        for round in 0..config.n_estimators {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                residuals[i] = labels[i] as f32 - p;
                hessians[i] = p * (1.0 - p);
            }

            let rows: &[usize] = if sample_size < n {
                all_rows.shuffle(&mut rng);
                &all_rows[..sample_size]
            } else {
                &all_rows
            };
            let search = SplitSearch {
                binned: &binned,
                residuals: &residuals,
                hessians: &hessians,
                config,
            };
            let tree = search.build(rows, 0);

            for (i, score) in scores.iter_mut().enumerate() {
                *score += config.learning_rate * tree.predict(features.row(i));
            }
            if round % 10 == 0 {
                let loss = crate::metrics::binary_cross_entropy(
                    &scores.iter().map(|&s| sigmoid(s)).collect::<Vec<_>>(),
                    labels,
                );
                tracing::debug!("Boosting round {} - train loss: {:.4}", round + 1, loss);
            }
            trees.push(tree);
        }

        tracing::info!(
            "Fitted {} trees (max depth {}) on {} samples x {} features",
            trees.len(),
            trees.iter().map(Node::depth).max().unwrap_or(0),
            n,
            d
        );

        Ok(Self {
            base_score,
            learning_rate: config.learning_rate,
            n_features: d,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_proba(&self, features: &Array2<f32>) -> Result<Vec<f32>> {
        if features.ncols() != self.n_features {
            return Err(DetectorError::config(
                "features",
                format!("expected {} columns, got {}", self.n_features, features.ncols()),
            ));
        }
        Ok(features
            .rows()
            .into_iter()
            .map(|row| {
                let raw = self.trees.iter().fold(self.base_score, |acc, t| {
                    acc + self.learning_rate * t.predict(row)
                });
                sigmoid(raw)
            })
            .collect())
    }
}

impl UrlClassifier for GradientBoostedTrees {
    fn name(&self) -> &str {
        "boosted"
    }

    fn predict_urls(&self, urls: &[String]) -> Result<Vec<f32>> {
        self.predict_proba(&extract_matrix(urls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ClassificationMetrics;
    use ndarray::array;

    #[test]
    fn test_learns_threshold_rule() {
        // malicious iff feature 0 > 5
        let features = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { (i % 12) as f32 } else { (i % 3) as f32 });
        let labels: Vec<u8> = (0..60).map(|i| u8::from(i % 12 > 5)).collect();
        let config = BoostConfig {
            n_estimators: 20,
            min_samples_leaf: 2,
            ..BoostConfig::default()
        };
        let model = GradientBoostedTrees::fit(&features, &labels, &config).unwrap();
        let probs = model.predict_proba(&features).unwrap();
        let m = ClassificationMetrics::from_scores(&probs, &labels, 0.5).unwrap();
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_single_class_predicts_that_class() {
        let features = Array2::from_shape_fn((10, 1), |(i, _)| i as f32);
        let labels = vec![0u8; 10];
        let model = GradientBoostedTrees::fit(&features, &labels, &BoostConfig::default()).unwrap();
        let probs = model.predict_proba(&features).unwrap();
        assert!(probs.iter().all(|&p| p < 0.01));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let features = array![[1.0f32], [2.0]];
        assert!(GradientBoostedTrees::fit(&features, &[1], &BoostConfig::default()).is_err());
        assert!(GradientBoostedTrees::fit(&Array2::zeros((0, 3)), &[], &BoostConfig::default()).is_err());

        let model = GradientBoostedTrees::fit(&features, &[0, 1], &BoostConfig::default()).unwrap();
        assert!(model.predict_proba(&Array2::zeros((1, 2))).is_err());
    }

    #[test]
    fn test_tree_depth_is_bounded() {
        let features = Array2::from_shape_fn((200, 3), |(i, j)| ((i * (j + 7)) % 23) as f32);
        let labels: Vec<u8> = (0..200).map(|i| u8::from((i * 7) % 23 > 11)).collect();
        let config = BoostConfig {
            n_estimators: 5,
            max_depth: 2,
            subsample: 0.5,
            ..BoostConfig::default()
        };
        let model = GradientBoostedTrees::fit(&features, &labels, &config).unwrap();
        assert_eq!(model.n_trees(), 5);
        assert!(model.trees.iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_serde_preserves_predictions() {
        let features = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f32);
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i >= 20)).collect();
        let model = GradientBoostedTrees::fit(&features, &labels, &BoostConfig::default()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        assert_eq!(
            model.predict_proba(&features).unwrap(),
            restored.predict_proba(&features).unwrap()
        );
    }
}
