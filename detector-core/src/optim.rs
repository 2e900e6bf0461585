use crate::layers::Param;

/// Adam optimiser. Defaults: beta1 0.9, beta2 0.999, eps 1e-7.
#[derive(Clone, Debug)]
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    step: i32,
    moments: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            step: 0,
            moments: Vec::new(),
        }
    }

    pub fn steps(&self) -> i32 {
        self.step
    }

    /// Apply one update. Parameters must be passed in the same order every
    /// call; moment buffers are matched by position.
    pub fn step(&mut self, params: Vec<&mut Param>) {
        if self.moments.len() != params.len()
            || self.moments.iter().zip(&params).any(|((m, _), p)| m.len() != p.len())
        {
            self.moments = params
                .iter()
                .map(|p| (vec![0.0; p.len()], vec![0.0; p.len()]))
                .collect();
            self.step = 0;
        }

        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step);
        let bc2 = 1.0 - self.beta2.powi(self.step);
        let lr_t = self.lr * bc2.sqrt() / bc1;

        for (param, (m, v)) in params.into_iter().zip(self.moments.iter_mut()) {
            let Param { value, grad } = param;
            for (((w, &g), m), v) in value.iter_mut().zip(grad.iter()).zip(m.iter_mut()).zip(v.iter_mut()) {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                *w -= lr_t * *m / (v.sqrt() + self.eps);
            }
        }
    }
}
