//! Neural network layers on `ndarray`, with hand-written backward passes.
//!
//! Sequence activations are kept as 2-D matrices of shape `[batch * seq_len,
//! channels]` so that convolution, batch normalisation and activations all
//! share the same layout.

use crate::error::{DetectorError, Result};
use ndarray::{s, Array2, Axis, Zip};
use rand::Rng;

/// A trainable tensor and its accumulated gradient.
#[derive(Clone, Debug)]
pub struct Param {
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Param {
    pub fn new(value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { value, grad }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(Array2::zeros((rows, cols)))
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::new(Array2::ones((rows, cols)))
    }

    /// Glorot-uniform initialisation.
    pub fn glorot<R: Rng>(rows: usize, cols: usize, fan_in: usize, fan_out: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        Self::new(Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..=limit)))
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Embedding layer mapping character ids to vectors.
#[derive(Debug)]
pub struct Embedding {
    pub weight: Param, // vocab_size x dim
    tokens: Option<Vec<usize>>,
}

impl Embedding {
    pub fn new<R: Rng>(vocab_size: usize, dim: usize, rng: &mut R) -> Self {
        let weight = Param::new(Array2::from_shape_fn((vocab_size, dim), |_| {
            rng.gen_range(-0.05..0.05)
        }));
        Self { weight, tokens: None }
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.value.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.value.ncols()
    }

    // Ids past the table are read as the unknown-character row.
    fn row_for(&self, tok: usize) -> usize {
        if tok < self.vocab_size() {
            tok
        } else {
            1.min(self.vocab_size().saturating_sub(1))
        }
    }

    /// `[batch, seq_len]` ids to `[batch * seq_len, dim]` vectors.
    pub fn forward(&self, tokens: &Array2<usize>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((tokens.len(), self.dim()));
        for (i, &tok) in tokens.iter().enumerate() {
            out.row_mut(i).assign(&self.weight.value.row(self.row_for(tok)));
        }
        out
    }

    pub fn forward_train(&mut self, tokens: &Array2<usize>) -> Array2<f32> {
        let out = self.forward(tokens);
        self.tokens = Some(tokens.iter().map(|&t| self.row_for(t)).collect());
        out
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<()> {
        let tokens = self
            .tokens
            .take()
            .ok_or(DetectorError::MissingActivation { layer: "embedding" })?;
        for (i, tok) in tokens.into_iter().enumerate() {
            let mut row = self.weight.grad.row_mut(tok);
            row += &grad.row(i);
        }
        Ok(())
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight]
    }
}

/// Fully connected layer.
#[derive(Debug)]
pub struct Linear {
    pub weight: Param, // out x in
    pub bias: Option<Param>, // 1 x out
    input: Option<Array2<f32>>,
}

impl Linear {
    pub fn new<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let weight = Param::glorot(out_features, in_features, in_features, out_features, rng);
        let bias = bias.then(|| Param::zeros(1, out_features));
        Self { weight, bias, input: None }
    }

    pub fn in_features(&self) -> usize {
        self.weight.value.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.value.nrows()
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.value.t());
        if let Some(b) = &self.bias {
            y += &b.value;
        }
        y
    }

    pub fn forward_train(&mut self, x: &Array2<f32>) -> Array2<f32> {
        let y = self.forward(x);
        self.input = Some(x.clone());
        y
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<Array2<f32>> {
        let input = self
            .input
            .take()
            .ok_or(DetectorError::MissingActivation { layer: "linear" })?;
        self.weight.grad += &grad.t().dot(&input);
        if let Some(b) = &mut self.bias {
            b.grad += &grad.sum_axis(Axis(0)).insert_axis(Axis(0));
        }
        Ok(grad.dot(&self.weight.value))
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.weight];
        if let Some(b) = &mut self.bias {
            params.push(b);
        }
        params
    }

    pub fn tensors(&self) -> Vec<&Array2<f32>> {
        let mut out = vec![&self.weight.value];
        if let Some(b) = &self.bias {
            out.push(&b.value);
        }
        out
    }

    pub fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut out = vec![&mut self.weight.value];
        if let Some(b) = &mut self.bias {
            out.push(&mut b.value);
        }
        out
    }
}

/// 1-D convolution over the sequence axis, stride 1, `same` padding.
///
/// The kernel is stored unrolled as `[kernel * in_channels, filters]` so the
/// forward pass is a single matrix product against the im2col patches.
#[derive(Debug)]
pub struct Conv1d {
    pub weight: Param,
    pub bias: Param,
    kernel: usize,
    in_channels: usize,
    patches: Option<(Array2<f32>, usize)>,
}

impl Conv1d {
    pub fn new<R: Rng>(in_channels: usize, filters: usize, kernel: usize, rng: &mut R) -> Self {
        let fan_in = kernel * in_channels;
        let fan_out = kernel * filters;
        Self {
            weight: Param::glorot(fan_in, filters, fan_in, fan_out, rng),
            bias: Param::zeros(1, filters),
            kernel,
            in_channels,
            patches: None,
        }
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    pub fn filters(&self) -> usize {
        self.weight.value.ncols()
    }

    fn pad_left(&self) -> usize {
        (self.kernel - 1) / 2
    }

    fn im2col(&self, x: &Array2<f32>, seq_len: usize) -> Array2<f32> {
        let c = self.in_channels;
        let rows = x.nrows();
        let batch = if seq_len == 0 { 0 } else { rows / seq_len };
        let pad = self.pad_left() as isize;
        let mut patches = Array2::<f32>::zeros((rows, self.kernel * c));
        for b in 0..batch {
            for t in 0..seq_len {
                for j in 0..self.kernel {
                    let src = t as isize + j as isize - pad;
                    if src < 0 || src >= seq_len as isize {
                        continue;
                    }
                    patches
                        .slice_mut(s![b * seq_len + t, j * c..(j + 1) * c])
                        .assign(&x.row(b * seq_len + src as usize));
                }
            }
        }
        patches
    }

    /// `[batch * seq_len, in_channels]` to `[batch * seq_len, filters]`.
    pub fn forward(&self, x: &Array2<f32>, seq_len: usize) -> Array2<f32> {
        let patches = self.im2col(x, seq_len);
        patches.dot(&self.weight.value) + &self.bias.value
    }

    pub fn forward_train(&mut self, x: &Array2<f32>, seq_len: usize) -> Array2<f32> {
        let patches = self.im2col(x, seq_len);
        let y = patches.dot(&self.weight.value) + &self.bias.value;
        self.patches = Some((patches, seq_len));
        y
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<Array2<f32>> {
        let (patches, seq_len) = self
            .patches
            .take()
            .ok_or(DetectorError::MissingActivation { layer: "conv1d" })?;
        self.weight.grad += &patches.t().dot(grad);
        self.bias.grad += &grad.sum_axis(Axis(0)).insert_axis(Axis(0));

        let c = self.in_channels;
        let dpatches = grad.dot(&self.weight.value.t());
        let rows = dpatches.nrows();
        let batch = if seq_len == 0 { 0 } else { rows / seq_len };
        let pad = self.pad_left() as isize;
        let mut dx = Array2::<f32>::zeros((rows, c));
        for b in 0..batch {
            for t in 0..seq_len {
                for j in 0..self.kernel {
                    let src = t as isize + j as isize - pad;
                    if src < 0 || src >= seq_len as isize {
                        continue;
                    }
                    let mut row = dx.row_mut(b * seq_len + src as usize);
                    row += &dpatches.slice(s![b * seq_len + t, j * c..(j + 1) * c]);
                }
            }
        }
        Ok(dx)
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Batch normalisation over the rows of a `[n, features]` matrix.
#[derive(Debug)]
pub struct BatchNorm {
    pub gamma: Param,
    pub beta: Param,
    pub running_mean: Array2<f32>,
    pub running_var: Array2<f32>,
    momentum: f32,
    eps: f32,
    cache: Option<(Array2<f32>, Array2<f32>)>, // normalised input, 1 / std
}

impl BatchNorm {
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Param::ones(1, features),
            beta: Param::zeros(1, features),
            running_mean: Array2::zeros((1, features)),
            running_var: Array2::ones((1, features)),
            momentum: 0.99,
            eps: 1e-3,
            cache: None,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.value.ncols()
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.eps).sqrt());
        (x - &self.running_mean) * &inv_std * &self.gamma.value + &self.beta.value
    }

    pub fn forward_train(&mut self, x: &Array2<f32>) -> Result<Array2<f32>> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| DetectorError::empty("batch normalisation over zero rows"))?
            .insert_axis(Axis(0));
        let centered = x - &mean;
        let var = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .ok_or_else(|| DetectorError::empty("batch normalisation over zero rows"))?
            .insert_axis(Axis(0));
        let inv_std = var.mapv(|v| 1.0 / (v + self.eps).sqrt());
        let x_hat = centered * &inv_std;
        let y = &x_hat * &self.gamma.value + &self.beta.value;

        let m = self.momentum;
        Zip::from(&mut self.running_mean)
            .and(&mean)
            .for_each(|r, &b| *r = m * *r + (1.0 - m) * b);
        Zip::from(&mut self.running_var)
            .and(&var)
            .for_each(|r, &b| *r = m * *r + (1.0 - m) * b);

        self.cache = Some((x_hat, inv_std));
        Ok(y)
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<Array2<f32>> {
        let (x_hat, inv_std) = self
            .cache
            .take()
            .ok_or(DetectorError::MissingActivation { layer: "batch_norm" })?;
        let n = grad.nrows() as f32;
        let sum_grad = grad.sum_axis(Axis(0)).insert_axis(Axis(0));
        let sum_grad_xhat = (grad * &x_hat).sum_axis(Axis(0)).insert_axis(Axis(0));

        self.gamma.grad += &sum_grad_xhat;
        self.beta.grad += &sum_grad;

        let scale = &self.gamma.value * &inv_std / n;
        let dx = (grad * n - &sum_grad - &x_hat * &sum_grad_xhat) * &scale;
        Ok(dx)
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.gamma, &mut self.beta]
    }

    pub fn tensors(&self) -> Vec<&Array2<f32>> {
        vec![
            &self.gamma.value,
            &self.beta.value,
            &self.running_mean,
            &self.running_var,
        ]
    }

    pub fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![
            &mut self.gamma.value,
            &mut self.beta.value,
            &mut self.running_mean,
            &mut self.running_var,
        ]
    }
}

/// Inverted dropout; identity outside training.
#[derive(Debug)]
pub struct Dropout {
    rate: f32,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self { rate, mask: None }
    }

    pub fn forward_train<R: Rng>(&mut self, x: &Array2<f32>, rng: &mut R) -> Array2<f32> {
        let keep = 1.0 - self.rate;
        let mask = if self.rate <= 0.0 {
            Array2::ones(x.raw_dim())
        } else {
            Array2::from_shape_fn(x.raw_dim(), |_| {
                if rng.gen::<f32>() < keep {
                    1.0 / keep
                } else {
                    0.0
                }
            })
        };
        let y = x * &mask;
        self.mask = Some(mask);
        y
    }

    pub fn backward(&mut self, grad: &Array2<f32>) -> Result<Array2<f32>> {
        let mask = self
            .mask
            .take()
            .ok_or(DetectorError::MissingActivation { layer: "dropout" })?;
        Ok(grad * &mask)
    }
}

pub fn relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| v.max(0.0))
}

/// Gradient through a ReLU given its output.
pub fn relu_backward(grad: &Array2<f32>, output: &Array2<f32>) -> Array2<f32> {
    let mut dx = grad.clone();
    Zip::from(&mut dx).and(output).for_each(|g, &o| {
        if o <= 0.0 {
            *g = 0.0;
        }
    });
    dx
}

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Sum `[batch * seq_len, features]` over the sequence axis to `[batch, features]`.
pub fn sum_over_time(x: &Array2<f32>, seq_len: usize) -> Array2<f32> {
    let batch = if seq_len == 0 { 0 } else { x.nrows() / seq_len };
    let mut out = Array2::<f32>::zeros((batch, x.ncols()));
    for b in 0..batch {
        out.row_mut(b)
            .assign(&x.slice(s![b * seq_len..(b + 1) * seq_len, ..]).sum_axis(Axis(0)));
    }
    out
}

pub fn sum_over_time_backward(grad: &Array2<f32>, seq_len: usize) -> Array2<f32> {
    let mut dx = Array2::<f32>::zeros((grad.nrows() * seq_len, grad.ncols()));
    for b in 0..grad.nrows() {
        dx.slice_mut(s![b * seq_len..(b + 1) * seq_len, ..])
            .assign(&grad.row(b));
    }
    dx
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    #[test]
    fn test_embedding_forward_and_backward() {
        let mut emb = Embedding::new(5, 3, &mut rng());
        let tokens = array![[1usize, 2], [2, 9]];
        let out = emb.forward_train(&tokens);
        assert_eq!(out.dim(), (4, 3));
        assert_eq!(out.row(1), emb.weight.value.row(2));
        assert_eq!(out.row(3), emb.weight.value.row(1));

        emb.backward(&Array2::ones((4, 3))).unwrap();
        assert_eq!(emb.weight.grad.row(2).to_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(emb.weight.grad.row(1).to_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(emb.weight.grad.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_linear_gradient_matches_finite_difference() {
        let mut lin = Linear::new(3, 2, true, &mut rng());
        let x = array![[0.5f32, -1.0, 2.0], [1.5, 0.25, -0.5]];
        // loss = sum(y)
        lin.forward_train(&x);
        lin.backward(&Array2::ones((2, 2))).unwrap();

        let eps = 1e-3;
        let base: f32 = lin.forward(&x).sum();
        lin.weight.value[[1, 2]] += eps;
        let bumped: f32 = lin.forward(&x).sum();
        let numeric = (bumped - base) / eps;
        assert!((numeric - lin.weight.grad[[1, 2]]).abs() < 1e-2);
        assert_eq!(lin.bias.as_ref().unwrap().grad.iter().copied().collect::<Vec<f32>>(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_conv_same_padding_keeps_length() {
        for kernel in 2..=5 {
            let conv = Conv1d::new(4, 6, kernel, &mut rng());
            let x = Array2::from_shape_fn((2 * 7, 4), |(i, j)| (i + j) as f32 * 0.01);
            let y = conv.forward(&x, 7);
            assert_eq!(y.dim(), (14, 6));
        }
    }

    #[test]
    fn test_conv_even_kernel_pads_on_the_right() {
        // kernel 2: no left padding, taps read t and t + 1
        let mut conv = Conv1d::new(1, 2, 2, &mut rng());
        conv.weight.value = array![[1.0, 0.0], [0.0, 1.0]];
        conv.bias.value.fill(0.0);
        let x = array![[1.0f32], [2.0], [3.0], [4.0]];
        let y = conv.forward(&x, 4);
        assert_eq!(y.column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(y.column(1).to_vec(), vec![2.0, 3.0, 4.0, 0.0]);

        // kernel 4: one step of left padding, first tap reads t - 1
        let mut conv = Conv1d::new(1, 1, 4, &mut rng());
        conv.weight.value = array![[1.0], [0.0], [0.0], [0.0]];
        conv.bias.value.fill(0.0);
        let y = conv.forward(&x, 4);
        assert_eq!(y.column(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_conv_padding_stays_within_each_sequence() {
        let mut conv = Conv1d::new(1, 1, 3, &mut rng());
        conv.weight.value = array![[0.0], [0.0], [1.0]];
        conv.bias.value.fill(0.0);
        // two sequences of length 2 stacked as [B*L, C]
        let x = array![[1.0f32], [2.0], [3.0], [4.0]];
        let y = conv.forward(&x, 2);
        assert_eq!(y.column(0).to_vec(), vec![2.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_conv_input_gradient_matches_finite_difference() {
        let mut conv = Conv1d::new(2, 3, 3, &mut rng());
        let x = Array2::from_shape_fn((2 * 4, 2), |(i, j)| ((i * 3 + j) % 5) as f32 * 0.1 - 0.2);
        conv.forward_train(&x, 4);
        let dx = conv.backward(&Array2::ones((8, 3))).unwrap();

        let eps = 1e-2;
        let base: f32 = conv.forward(&x, 4).sum();
        let mut bumped_x = x.clone();
        bumped_x[[5, 1]] += eps;
        let bumped: f32 = conv.forward(&bumped_x, 4).sum();
        assert!(((bumped - base) / eps - dx[[5, 1]]).abs() < 1e-2);
    }

    #[test]
    fn test_batch_norm_normalises_batch() {
        let mut bn = BatchNorm::new(2);
        let x = array![[1.0f32, 10.0], [3.0, 20.0], [5.0, 30.0]];
        let y = bn.forward_train(&x).unwrap();
        let mean = y.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-5));
        assert!((bn.running_mean[[0, 0]] - 0.03).abs() < 1e-5);

        let dx = bn.backward(&Array2::ones((3, 2))).unwrap();
        // constant upstream gradient vanishes through the normalisation
        assert!(dx.iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn test_dropout_scales_kept_units() {
        let mut drop = Dropout::new(0.5);
        let x = Array2::ones((10, 10));
        let y = drop.forward_train(&x, &mut rng());
        assert!(y.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        let dx = drop.backward(&Array2::ones((10, 10))).unwrap();
        assert_eq!(dx, y);
    }

    #[test]
    fn test_sum_over_time_round_trip_shapes() {
        let x = Array2::from_shape_fn((6, 2), |(i, _)| i as f32);
        let s = sum_over_time(&x, 3);
        assert_eq!(s, array![[3.0f32, 3.0], [12.0, 12.0]]);
        let g = sum_over_time_backward(&array![[1.0f32, 2.0], [3.0, 4.0]], 3);
        assert_eq!(g.dim(), (6, 2));
        assert_eq!(g.row(4).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_backward_without_forward_errors() {
        let mut lin = Linear::new(2, 2, false, &mut rng());
        assert!(lin.backward(&Array2::ones((1, 2))).is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(sigmoid(-100.0) >= 0.0);
        assert!(sigmoid(100.0) <= 1.0);
    }
}
