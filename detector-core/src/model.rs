//! URL detector architectures.
//!
//! Default hyperparameters follow J. Saxe et al., "eXpose: A Character-Level
//! Convolutional Neural Network with Embeddings For Detecting Malicious URLs,
//! File Paths and Registry Keys".

use crate::dataset::{pad_sequences, CharVocabulary};
use crate::error::{DetectorError, Result};
use crate::layers::{
    relu, relu_backward, sigmoid, sum_over_time, sum_over_time_backward, BatchNorm, Conv1d,
    Dropout, Embedding, Linear, Param,
};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PREDICT_BATCH: usize = 256;

/// Upper bounds on the network dimensions accepted from configs and checkpoints.
pub const MAX_SEQUENCE_LENGTH: usize = 1 << 16;
pub const MAX_HIDDEN_LAYERS: usize = 256;
pub const MAX_KERNELS: usize = 64;
pub const MAX_LAYER_WIDTH: usize = 1 << 16;

/// Anything that scores URLs with a probability of being malicious.
pub trait UrlClassifier {
    fn name(&self) -> &str;

    fn predict_urls(&self, urls: &[String]) -> Result<Vec<f32>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SimpleNn,
    BigConvNn,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SimpleNn => "simple_nn",
            ModelKind::BigConvNn => "big_conv_nn",
        }
    }

    pub(crate) fn code(&self) -> u8 {
        match self {
            ModelKind::SimpleNn => 0,
            ModelKind::BigConvNn => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ModelKind::SimpleNn),
            1 => Some(ModelKind::BigConvNn),
            _ => None,
        }
    }
}

impl FromStr for ModelKind {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "simple_nn" => Ok(ModelKind::SimpleNn),
            "big_conv_nn" => Ok(ModelKind::BigConvNn),
            other => Err(DetectorError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the detector networks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorArgs {
    /// Size of the character alphabet, padding and unknown included.
    pub vocab_size: usize,
    /// URLs are cropped or padded to this many characters.
    pub max_length: usize,
    pub embed_dim: usize,
    /// Filters per convolution branch.
    pub filters: usize,
    /// One convolution branch per kernel size.
    pub kernel_sizes: Vec<usize>,
    pub hidden_dim: usize,
    pub hidden_layers: usize,
    pub dropout: f32,
    pub seed: u64,
}

impl Default for DetectorArgs {
    fn default() -> Self {
        Self {
            vocab_size: 87,
            max_length: 200,
            embed_dim: 32,
            filters: 256,
            kernel_sizes: vec![2, 3, 4, 5],
            hidden_dim: 1024,
            hidden_layers: 3,
            dropout: 0.5,
            seed: 42,
        }
    }
}

impl DetectorArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored f32 values for `kind`, batch-norm statistics
    /// included. `None` on overflow.
    pub fn tensor_elements(&self, kind: ModelKind) -> Option<usize> {
        let embed = self.vocab_size.checked_mul(self.embed_dim)?;
        match kind {
            ModelKind::SimpleNn => {
                let dense = self.max_length.checked_mul(self.embed_dim)?;
                embed.checked_add(dense)?.checked_add(1)
            }
            ModelKind::BigConvNn => {
                let f = self.filters;
                let mut total = embed;
                for &k in &self.kernel_sizes {
                    let conv = k.checked_mul(self.embed_dim)?.checked_mul(f)?;
                    total = total.checked_add(conv)?.checked_add(f.checked_mul(5)?)?;
                }
                let merged = self.kernel_sizes.len().checked_mul(f)?;
                total = total.checked_add(merged.checked_mul(4)?)?;
                let mut width = merged;
                for _ in 0..self.hidden_layers {
                    let dense = self.hidden_dim.checked_mul(width)?;
                    total = total
                        .checked_add(dense)?
                        .checked_add(self.hidden_dim.checked_mul(5)?)?;
                    width = self.hidden_dim;
                }
                total.checked_add(width)?.checked_add(1)
            }
        }
    }
}

/// Embedding, flatten, single sigmoid unit.
#[derive(Debug)]
pub struct SimpleNn {
    embed: Embedding,
    dense: Linear,
    max_length: usize,
}

impl SimpleNn {
    pub fn new<R: Rng>(args: &DetectorArgs, rng: &mut R) -> Self {
        Self {
            embed: Embedding::new(args.vocab_size, args.embed_dim, rng),
            dense: Linear::new(args.max_length * args.embed_dim, 1, true, rng),
            max_length: args.max_length,
        }
    }

    pub fn forward(&self, tokens: &Array2<usize>) -> Result<Array2<f32>> {
        let batch = tokens.nrows();
        let flat = self
            .embed
            .forward(tokens)
            .into_shape((batch, self.max_length * self.embed.dim()))?;
        Ok(self.dense.forward(&flat))
    }

    pub fn forward_train(&mut self, tokens: &Array2<usize>) -> Result<Array2<f32>> {
        let batch = tokens.nrows();
        let flat = self
            .embed
            .forward_train(tokens)
            .into_shape((batch, self.max_length * self.embed.dim()))?;
        Ok(self.dense.forward_train(&flat))
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<()> {
        let rows = grad.nrows() * self.max_length;
        let d_flat = self.dense.backward(grad)?;
        let d_embed = d_flat.into_shape((rows, self.embed.dim()))?;
        self.embed.backward(&d_embed)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.embed.params_mut();
        params.extend(self.dense.params_mut());
        params
    }

    fn tensors(&self) -> Vec<&Array2<f32>> {
        let mut out = vec![&self.embed.weight.value];
        out.extend(self.dense.tensors());
        out
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut out = vec![&mut self.embed.weight.value];
        out.extend(self.dense.tensors_mut());
        out
    }

    fn summary_rows(&self) -> Vec<(String, String, usize)> {
        vec![
            (
                "embedding".to_string(),
                format!("({}, {})", self.max_length, self.embed.dim()),
                self.embed.weight.len(),
            ),
            (
                "flatten".to_string(),
                format!("({})", self.max_length * self.embed.dim()),
                0,
            ),
            (
                "dense (sigmoid)".to_string(),
                "(1)".to_string(),
                self.dense.tensors().iter().map(|t| t.len()).sum(),
            ),
        ]
    }
}

#[derive(Debug)]
struct ConvBranch {
    conv: Conv1d,
    norm: BatchNorm,
    dropout: Dropout,
    activated: Option<Array2<f32>>,
}

#[derive(Debug)]
struct HiddenBlock {
    linear: Linear,
    norm: BatchNorm,
    dropout: Dropout,
    activated: Option<Array2<f32>>,
}

/// The eXpose network: parallel convolutions over character embeddings,
/// sum-pooled, followed by a stack of dense layers.
#[derive(Debug)]
pub struct BigConvNn {
    embed: Embedding,
    branches: Vec<ConvBranch>,
    merge_norm: BatchNorm,
    hidden: Vec<HiddenBlock>,
    output: Linear,
    max_length: usize,
    seq_len: usize,
}

impl BigConvNn {
    pub fn new<R: Rng>(args: &DetectorArgs, rng: &mut R) -> Self {
        let embed = Embedding::new(args.vocab_size, args.embed_dim, rng);
        let branches: Vec<ConvBranch> = args
            .kernel_sizes
            .iter()
            .map(|&k| ConvBranch {
                conv: Conv1d::new(args.embed_dim, args.filters, k, rng),
                norm: BatchNorm::new(args.filters),
                dropout: Dropout::new(args.dropout),
                activated: None,
            })
            .collect();
        let merged = args.filters * branches.len();
        let mut width = merged;
        let mut hidden = Vec::with_capacity(args.hidden_layers);
        for _ in 0..args.hidden_layers {
            hidden.push(HiddenBlock {
                linear: Linear::new(width, args.hidden_dim, true, rng),
                norm: BatchNorm::new(args.hidden_dim),
                dropout: Dropout::new(args.dropout),
                activated: None,
            });
            width = args.hidden_dim;
        }
        Self {
            embed,
            branches,
            merge_norm: BatchNorm::new(merged),
            hidden,
            output: Linear::new(width, 1, true, rng),
            max_length: args.max_length,
            seq_len: 0,
        }
    }

    fn merge(pooled: &[Array2<f32>]) -> Result<Array2<f32>> {
        let views: Vec<ArrayView2<f32>> = pooled.iter().map(|p| p.view()).collect();
        Ok(concatenate(Axis(1), &views)?)
    }

    pub fn forward(&self, tokens: &Array2<usize>) -> Result<Array2<f32>> {
        let seq = tokens.ncols();
        let e = self.embed.forward(tokens);
        let pooled: Vec<Array2<f32>> = self
            .branches
            .iter()
            .map(|b| {
                let c = relu(&b.conv.forward(&e, seq));
                sum_over_time(&b.norm.forward(&c), seq)
            })
            .collect();
        let mut h = self.merge_norm.forward(&Self::merge(&pooled)?);
        for block in &self.hidden {
            h = block.norm.forward(&relu(&block.linear.forward(&h)));
        }
        Ok(self.output.forward(&h))
    }

    pub fn forward_train<R: Rng>(&mut self, tokens: &Array2<usize>, rng: &mut R) -> Result<Array2<f32>> {
        let seq = tokens.ncols();
        self.seq_len = seq;
        let e = self.embed.forward_train(tokens);

        let mut pooled = Vec::with_capacity(self.branches.len());
        for b in &mut self.branches {
            let c = relu(&b.conv.forward_train(&e, seq));
            let n = b.norm.forward_train(&c)?;
            b.activated = Some(c);
            pooled.push(b.dropout.forward_train(&sum_over_time(&n, seq), rng));
        }

        let mut h = self.merge_norm.forward_train(&Self::merge(&pooled)?)?;
        for block in &mut self.hidden {
            let a = relu(&block.linear.forward_train(&h));
            let n = block.norm.forward_train(&a)?;
            block.activated = Some(a);
            h = block.dropout.forward_train(&n, rng);
        }
        Ok(self.output.forward_train(&h))
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<()> {
        let mut g = self.output.backward(grad)?;
        for block in self.hidden.iter_mut().rev() {
            g = block.dropout.backward(&g)?;
            g = block.norm.backward(&g)?;
            let a = block
                .activated
                .take()
                .ok_or(DetectorError::MissingActivation { layer: "dense" })?;
            g = relu_backward(&g, &a);
            g = block.linear.backward(&g)?;
        }
        g = self.merge_norm.backward(&g)?;

        let seq = self.seq_len;
        let mut offset = 0;
        let mut d_embed: Option<Array2<f32>> = None;
        for b in &mut self.branches {
            let f = b.conv.filters();
            let gb = g.slice(s![.., offset..offset + f]).to_owned();
            offset += f;
            let gb = sum_over_time_backward(&b.dropout.backward(&gb)?, seq);
            let gb = b.norm.backward(&gb)?;
            let a = b
                .activated
                .take()
                .ok_or(DetectorError::MissingActivation { layer: "conv1d" })?;
            let de = b.conv.backward(&relu_backward(&gb, &a))?;
            d_embed = Some(match d_embed {
                Some(acc) => acc + &de,
                None => de,
            });
        }
        if let Some(de) = d_embed {
            self.embed.backward(&de)?;
        }
        Ok(())
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.embed.params_mut();
        for b in &mut self.branches {
            params.extend(b.conv.params_mut());
            params.extend(b.norm.params_mut());
        }
        params.extend(self.merge_norm.params_mut());
        for block in &mut self.hidden {
            params.extend(block.linear.params_mut());
            params.extend(block.norm.params_mut());
        }
        params.extend(self.output.params_mut());
        params
    }

    fn tensors(&self) -> Vec<&Array2<f32>> {
        let mut out = vec![&self.embed.weight.value];
        for b in &self.branches {
            out.push(&b.conv.weight.value);
            out.push(&b.conv.bias.value);
            out.extend(b.norm.tensors());
        }
        out.extend(self.merge_norm.tensors());
        for block in &self.hidden {
            out.extend(block.linear.tensors());
            out.extend(block.norm.tensors());
        }
        out.extend(self.output.tensors());
        out
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut out = vec![&mut self.embed.weight.value];
        for b in &mut self.branches {
            out.push(&mut b.conv.weight.value);
            out.push(&mut b.conv.bias.value);
            out.extend(b.norm.tensors_mut());
        }
        out.extend(self.merge_norm.tensors_mut());
        for block in &mut self.hidden {
            out.extend(block.linear.tensors_mut());
            out.extend(block.norm.tensors_mut());
        }
        out.extend(self.output.tensors_mut());
        out
    }

    fn summary_rows(&self) -> Vec<(String, String, usize)> {
        let norm_params = |n: &BatchNorm| n.tensors().iter().map(|t| t.len()).sum::<usize>();
        let mut rows = vec![(
            "embedding".to_string(),
            format!("({}, {})", self.max_length, self.embed.dim()),
            self.embed.weight.len(),
        )];
        for b in &self.branches {
            let f = b.conv.filters();
            rows.push((
                format!("conv1d k={} (relu)", b.conv.kernel()),
                format!("({}, {})", self.max_length, f),
                b.conv.weight.len() + b.conv.bias.len(),
            ));
            rows.push((
                "batch_norm".to_string(),
                format!("({}, {})", self.max_length, f),
                norm_params(&b.norm),
            ));
            rows.push(("sum_pool + dropout".to_string(), format!("({})", f), 0));
        }
        rows.push((
            "concatenate + batch_norm".to_string(),
            format!("({})", self.merge_norm.features()),
            norm_params(&self.merge_norm),
        ));
        for block in &self.hidden {
            rows.push((
                "dense (relu)".to_string(),
                format!("({})", block.linear.out_features()),
                block.linear.tensors().iter().map(|t| t.len()).sum(),
            ));
            rows.push((
                "batch_norm + dropout".to_string(),
                format!("({})", block.norm.features()),
                norm_params(&block.norm),
            ));
        }
        rows.push((
            "dense (sigmoid)".to_string(),
            "(1)".to_string(),
            self.output.tensors().iter().map(|t| t.len()).sum(),
        ));
        rows
    }
}

#[derive(Debug)]
enum Network {
    Simple(SimpleNn),
    Conv(BigConvNn),
}

/// A character-level URL detector wrapping one of the two networks.
#[derive(Debug)]
pub struct UrlDetector {
    kind: ModelKind,
    args: DetectorArgs,
    network: Network,
    vocab: CharVocabulary,
}

impl UrlDetector {
    pub fn new(kind: ModelKind, args: DetectorArgs) -> Self {
        let mut rng = StdRng::seed_from_u64(args.seed);
        let network = match kind {
            ModelKind::SimpleNn => Network::Simple(SimpleNn::new(&args, &mut rng)),
            ModelKind::BigConvNn => Network::Conv(BigConvNn::new(&args, &mut rng)),
        };
        let detector = Self {
            kind,
            args,
            network,
            vocab: CharVocabulary::new(),
        };
        tracing::info!("Built detector\n{}", detector.summary());
        detector
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn args(&self) -> &DetectorArgs {
        &self.args
    }

    /// Inference-mode logits for a padded `[batch, max_length]` batch.
    pub fn logits(&self, tokens: &Array2<usize>) -> Result<Array1<f32>> {
        let out = match &self.network {
            Network::Simple(m) => m.forward(tokens)?,
            Network::Conv(m) => m.forward(tokens)?,
        };
        Ok(out.column(0).to_owned())
    }

    /// Inference-mode probabilities for a padded batch.
    pub fn forward(&self, tokens: &Array2<usize>) -> Result<Array1<f32>> {
        Ok(self.logits(tokens)?.mapv(sigmoid))
    }

    /// Training-mode logits; caches activations for [`UrlDetector::backward`].
    pub fn forward_train<R: Rng>(&mut self, tokens: &Array2<usize>, rng: &mut R) -> Result<Array1<f32>> {
        let out = match &mut self.network {
            Network::Simple(m) => m.forward_train(tokens)?,
            Network::Conv(m) => m.forward_train(tokens, rng)?,
        };
        Ok(out.column(0).to_owned())
    }

    /// Accumulate gradients from the loss gradient w.r.t. the logits.
    pub fn backward(&mut self, grad_logits: &Array1<f32>) -> Result<()> {
        let grad = grad_logits.clone().insert_axis(Axis(1));
        match &mut self.network {
            Network::Simple(m) => m.backward(&grad),
            Network::Conv(m) => m.backward(&grad),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        match &mut self.network {
            Network::Simple(m) => m.params_mut(),
            Network::Conv(m) => m.params_mut(),
        }
    }

    pub fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    /// Every stored tensor in a fixed order, batch-norm statistics included.
    pub fn tensors(&self) -> Vec<&Array2<f32>> {
        match &self.network {
            Network::Simple(m) => m.tensors(),
            Network::Conv(m) => m.tensors(),
        }
    }

    pub fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        match &mut self.network {
            Network::Simple(m) => m.tensors_mut(),
            Network::Conv(m) => m.tensors_mut(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    pub fn pad(&self, encoded_docs: &[Vec<usize>]) -> Array2<usize> {
        pad_sequences(encoded_docs, self.args.max_length)
    }

    /// Probability of being malicious for each encoded URL.
    pub fn predict_proba(&self, encoded_docs: &[Vec<usize>]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(encoded_docs.len());
        for chunk in encoded_docs.chunks(PREDICT_BATCH) {
            out.extend(self.forward(&self.pad(chunk))?.iter().copied());
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        let rows = match &self.network {
            Network::Simple(m) => m.summary_rows(),
            Network::Conv(m) => m.summary_rows(),
        };
        let mut text = format!("Model: \"{}\"\n", self.kind);
        text.push_str(&format!("{:<28} {:<16} {:>10}\n", "Layer", "Output shape", "Params"));
        for (name, shape, params) in rows {
            text.push_str(&format!("{:<28} {:<16} {:>10}\n", name, shape, params));
        }
        text.push_str(&format!("Total params: {}", self.parameter_count()));
        text
    }
}

impl UrlClassifier for UrlDetector {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn predict_urls(&self, urls: &[String]) -> Result<Vec<f32>> {
        self.predict_proba(&self.vocab.encode_all(urls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_args() -> DetectorArgs {
        DetectorArgs {
            vocab_size: 87,
            max_length: 12,
            embed_dim: 4,
            filters: 3,
            kernel_sizes: vec![2, 3],
            hidden_dim: 5,
            hidden_layers: 2,
            dropout: 0.0,
            seed: 1,
        }
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("simple_nn".parse::<ModelKind>().unwrap(), ModelKind::SimpleNn);
        assert_eq!("big_conv_nn".parse::<ModelKind>().unwrap(), ModelKind::BigConvNn);
        assert!(matches!("lstm".parse::<ModelKind>(), Err(DetectorError::UnknownModel(_))));
    }

    #[test]
    fn test_tensor_elements_matches_built_models() {
        let args = small_args();
        for kind in [ModelKind::SimpleNn, ModelKind::BigConvNn] {
            let detector = UrlDetector::new(kind, args.clone());
            assert_eq!(Some(detector.parameter_count()), args.tensor_elements(kind));
        }
    }

    #[test]
    fn test_default_simple_nn_parameter_count() {
        let detector = UrlDetector::new(ModelKind::SimpleNn, DetectorArgs::default());
        // 87 * 32 embedding + 200 * 32 dense weights + 1 bias
        assert_eq!(detector.parameter_count(), 2784 + 6400 + 1);
    }

    #[test]
    fn test_probabilities_are_in_range() {
        let detector = UrlDetector::new(ModelKind::BigConvNn, small_args());
        let docs = vec![vec![2, 3, 4], vec![5; 30], vec![]];
        let probs = detector.predict_proba(&docs).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = UrlDetector::new(ModelKind::SimpleNn, small_args());
        let b = UrlDetector::new(ModelKind::SimpleNn, small_args());
        assert_eq!(a.tensors(), b.tensors());
    }

    #[test]
    fn test_simple_nn_embedding_gradient() {
        let mut detector = UrlDetector::new(ModelKind::SimpleNn, small_args());
        let tokens = pad_sequences(&[vec![2, 9, 14, 9], vec![40, 41, 3]], 12);
        let mut rng = StdRng::seed_from_u64(0);

        // loss = sum(logits)
        detector.zero_grad();
        detector.forward_train(&tokens, &mut rng).unwrap();
        detector.backward(&Array1::ones(2)).unwrap();
        let analytic = detector.params_mut()[0].grad[[9, 1]];

        let eps = 1e-2;
        let base = detector.logits(&tokens).unwrap().sum();
        detector.params_mut()[0].value[[9, 1]] += eps;
        let bumped = detector.logits(&tokens).unwrap().sum();
        let numeric = (bumped - base) / eps;
        assert!((numeric - analytic).abs() < 1e-3, "numeric {numeric} vs analytic {analytic}");
    }

    #[test]
    fn test_conv_backward_reaches_every_parameter() {
        let mut args = small_args();
        args.dropout = 0.5;
        let mut detector = UrlDetector::new(ModelKind::BigConvNn, args);
        let tokens = pad_sequences(&[vec![2, 9, 14, 30], vec![40, 41, 3], vec![7; 12]], 12);
        let mut rng = StdRng::seed_from_u64(0);

        detector.zero_grad();
        let logits = detector.forward_train(&tokens, &mut rng).unwrap();
        assert_eq!(logits.len(), 3);
        detector.backward(&Array1::from(vec![0.3, -0.2, 0.1])).unwrap();
        for p in detector.params_mut() {
            assert!(p.grad.iter().all(|g| g.is_finite()));
        }
        assert!(detector.params_mut()[0].grad.iter().any(|g| *g != 0.0));
        // a second backward without a forward pass has nothing cached
        assert!(detector.backward(&Array1::ones(3)).is_err());
    }

    #[test]
    fn test_summary_lists_layers() {
        let detector = UrlDetector::new(ModelKind::BigConvNn, small_args());
        let summary = detector.summary();
        assert!(summary.contains("big_conv_nn"));
        assert!(summary.contains("conv1d k=3"));
        assert!(summary.contains(&format!("Total params: {}", detector.parameter_count())));
    }

    #[test]
    fn test_classifier_scores_raw_urls() {
        let detector = UrlDetector::new(ModelKind::SimpleNn, small_args());
        let urls = vec!["http://example.com".to_string(), "paypal-login.ru".to_string()];
        let probs = detector.predict_urls(&urls).unwrap();
        assert_eq!(probs.len(), 2);
        assert_eq!(detector.name(), "simple_nn");
    }
}
