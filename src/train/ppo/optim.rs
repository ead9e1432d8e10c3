//! Adam optimizer over an explicit parameter list
//!
//! The moment estimates are held as plain tensors aligned with the policy's
//! canonical parameter order, so the optimizer state can be written into a
//! checkpoint and restored exactly.
//!
//! ```text
//! m_t = β1 * m_{t-1} + (1 - β1) * g
//! v_t = β2 * v_{t-1} + (1 - β2) * g²
//! θ  -= lr * (m_t / (1 - β1^t)) / (sqrt(v_t / (1 - β2^t)) + eps)
//! ```

use tch::{Device, Kind, Tensor};

use crate::error::{Result, TrainerError};

/// Default first-moment decay
pub const DEFAULT_BETA1: f64 = 0.9;

/// Default second-moment decay
pub const DEFAULT_BETA2: f64 = 0.999;

/// Default denominator epsilon
pub const DEFAULT_EPS: f64 = 1e-8;

/// Adam optimizer with serializable moment estimates
#[derive(Debug)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    params: Vec<Tensor>,
    exp_avg: Vec<Tensor>,
    exp_avg_sq: Vec<Tensor>,
    step: u64,
}

impl Adam {
    /// Create an optimizer for `params`
    ///
    /// # Arguments
    ///
    /// * `params` - Handles sharing storage with the trained network
    /// * `lr` - Learning rate
    pub fn new(params: Vec<Tensor>, lr: f64) -> Self {
        let exp_avg = params.iter().map(Tensor::zeros_like).collect();
        let exp_avg_sq = params.iter().map(Tensor::zeros_like).collect();
        Self {
            lr,
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            eps: DEFAULT_EPS,
            params,
            exp_avg,
            exp_avg_sq,
            step: 0,
        }
    }

    /// Clear accumulated gradients
    pub fn zero_grad(&mut self) {
        for param in &mut self.params {
            param.zero_grad();
        }
    }

    /// Global L2 norm of all current gradients
    pub fn grad_norm(&self) -> Result<f64> {
        let mut total = 0.0;
        for param in &self.params {
            let grad = param.grad();
            if grad.defined() {
                total += f64::try_from(grad.square().sum(Kind::Double))?;
            }
        }
        Ok(total.sqrt())
    }

    /// Scale factor that brings the global gradient norm down to `max_norm`
    ///
    /// Returns `(coefficient, norm)`; the coefficient is at most 1.
    pub fn clip_coefficient(&self, max_norm: f64) -> Result<(f64, f64)> {
        let norm = self.grad_norm()?;
        Ok(((max_norm / (norm + 1e-6)).min(1.0), norm))
    }

    /// Apply one Adam update with gradients multiplied by `grad_scale`
    ///
    /// Parameters without a gradient are left untouched.
    pub fn step(&mut self, grad_scale: f64) {
        self.step += 1;
        let t = self.step as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);
        let (lr, beta1, beta2, eps) = (self.lr, self.beta1, self.beta2, self.eps);

        tch::no_grad(|| {
            let moments = self.exp_avg.iter_mut().zip(self.exp_avg_sq.iter_mut());
            for (param, (m, v)) in self.params.iter().zip(moments) {
                let grad = param.grad();
                if !grad.defined() {
                    continue;
                }
                let grad = grad * grad_scale;

                *m = &*m * beta1 + &grad * (1.0 - beta1);
                *v = &*v * beta2 + grad.square() * (1.0 - beta2);

                let denom = (&*v / bias_correction2).sqrt() + eps;
                let update = (&*m / bias_correction1) / denom * lr;

                let mut param = param.shallow_clone();
                param -= update;
            }
        });
    }

    /// Current learning rate
    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    /// Set the learning rate
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// `(beta1, beta2, eps)`
    pub fn hyperparameters(&self) -> (f64, f64, f64) {
        (self.beta1, self.beta2, self.eps)
    }

    /// Number of updates applied so far
    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// First-moment estimates in parameter order
    pub fn exp_avg(&self) -> &[Tensor] {
        &self.exp_avg
    }

    /// Second-moment estimates in parameter order
    pub fn exp_avg_sq(&self) -> &[Tensor] {
        &self.exp_avg_sq
    }

    /// Replace the optimizer state
    ///
    /// Moments must match the parameter shapes one to one. They are moved
    /// onto the parameters' device.
    pub fn load_state(
        &mut self,
        step: u64,
        exp_avg: Vec<Tensor>,
        exp_avg_sq: Vec<Tensor>,
    ) -> Result<()> {
        if exp_avg.len() != self.params.len() || exp_avg_sq.len() != self.params.len() {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "optimizer holds {} moment tensors, network has {} parameters",
                exp_avg.len(),
                self.params.len()
            )));
        }
        for (idx, param) in self.params.iter().enumerate() {
            if exp_avg[idx].size() != param.size() || exp_avg_sq[idx].size() != param.size() {
                return Err(TrainerError::IncompatibleCheckpoint(format!(
                    "optimizer moment {} has shape {:?}, parameter has {:?}",
                    idx,
                    exp_avg[idx].size(),
                    param.size()
                )));
            }
        }

        let devices: Vec<Device> = self.params.iter().map(Tensor::device).collect();
        self.exp_avg = exp_avg.into_iter().zip(&devices).map(|(m, &d)| m.to_device(d)).collect();
        self.exp_avg_sq =
            exp_avg_sq.into_iter().zip(&devices).map(|(v, &d)| v.to_device(d)).collect();
        self.step = step;
        Ok(())
    }
}
