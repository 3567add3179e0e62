use log::{debug, trace, warn};
use oxiclassic_core::rng::seeded;
use oxiclassic_core::validate::{check_n_features, check_xy};
use oxiclassic_core::{Float, MlError, MlResult, Predict, Regressor, Tensor};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::kernel::Kernel;
use crate::svc::SUPPORT_EPS;

/// Epsilon-insensitive support vector regression.
///
/// The dual is solved over `β = α⁺ - α⁻` by per-sample coordinate updates.
/// The bias is folded into the kernel (`k + 1`), which removes the equality
/// constraint and leaves only the box `|β| <= C`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    pub c: f64,
    /// Half-width of the loss-free tube around the targets.
    pub epsilon: f64,
    pub kernel: Kernel,
    /// Damping on each coordinate step, in `(0, 1]`.
    pub learning_rate: f64,
    /// Stop once no multiplier moves more than this in an epoch.
    pub tol: f64,
    pub max_iter: usize,
    pub seed: Option<u64>,
}

impl Default for SvrParams {
    fn default() -> Self {
        SvrParams {
            c: 1.0,
            epsilon: 0.1,
            kernel: Kernel::default(),
            learning_rate: 1.0,
            tol: 1e-4,
            max_iter: 1000,
            seed: Some(42),
        }
    }
}

impl SvrParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> MlResult<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(MlError::InvalidParameter(format!("C must be positive, got {}", self.c)));
        }
        if !(self.epsilon >= 0.0) {
            return Err(MlError::InvalidParameter(format!("epsilon must be non-negative, got {}", self.epsilon)));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(MlError::InvalidParameter(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if self.max_iter == 0 {
            return Err(MlError::InvalidParameter("max_iter must be at least 1".into()));
        }
        self.kernel.validate()
    }

    pub fn fit<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<Svr<T>> {
        self.validate()?;
        let (n, p) = check_xy(x, y)?;
        let targets: Vec<f64> = y.data().iter().map(|v| v.to_f64()).collect();
        let mut gram = self.kernel.gram(x);
        gram.iter_mut().for_each(|g| *g += 1.0);
        let k = |i: usize, j: usize| gram[i * n + j];

        let mut rng = seeded(self.seed);
        let mut beta = vec![0.0f64; n];
        // fitted[i] = Σ_j β_j k'(j, i)
        let mut fitted = vec![0.0f64; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < self.max_iter {
            order.shuffle(&mut rng);
            let mut max_step = 0.0f64;
            for &i in &order {
                let kii = k(i, i);
                if kii <= 1e-12 {
                    continue;
                }
                let residual = targets[i] - fitted[i] + kii * beta[i];
                let target = (soft_threshold(residual, self.epsilon) / kii).clamp(-self.c, self.c);
                let step = self.learning_rate * (target - beta[i]);
                if step == 0.0 {
                    continue;
                }
                beta[i] += step;
                for (j, f) in fitted.iter_mut().enumerate() {
                    *f += step * k(i, j);
                }
                max_step = max_step.max(step.abs());
            }
            n_iter += 1;
            trace!("svr epoch {}: largest step {:.3e}", n_iter, max_step);
            if max_step < self.tol {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!("svr: stopped after {} epochs without converging", n_iter);
        }

        let support_indices: Vec<usize> = (0..n).filter(|&i| beta[i].abs() > SUPPORT_EPS).collect();
        let dual_coef: Vec<f64> = support_indices.iter().map(|&i| beta[i]).collect();
        let bias = dual_coef.iter().sum();
        debug!("svr: {} support vectors after {} epochs", support_indices.len(), n_iter);
        Ok(Svr {
            kernel: self.kernel,
            support_vectors: x.select_rows(&support_indices)?,
            support_indices,
            dual_coef,
            bias,
            n_features: p,
            n_iter,
            converged,
        })
    }
}

fn soft_threshold(v: f64, threshold: f64) -> f64 {
    if v > threshold {
        v - threshold
    } else if v < -threshold {
        v + threshold
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct Svr<T: Float> {
    kernel: Kernel,
    support_vectors: Tensor<T>,
    support_indices: Vec<usize>,
    /// `α⁺ᵢ - α⁻ᵢ` per support vector.
    dual_coef: Vec<f64>,
    bias: f64,
    n_features: usize,
    n_iter: usize,
    converged: bool,
}

impl<T: Float> Svr<T> {
    pub fn decision_function_one(&self, sample: &[T]) -> MlResult<f64> {
        check_n_features(sample.len(), self.n_features)?;
        Ok(self
            .support_vectors
            .rows()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * self.kernel.compute(sv, sample))
            .sum::<f64>()
            + self.bias)
    }

    pub fn support_vectors(&self) -> &Tensor<T> {
        &self.support_vectors
    }

    pub fn support_indices(&self) -> &[usize] {
        &self.support_indices
    }

    pub fn dual_coefficients(&self) -> &[f64] {
        &self.dual_coef
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn n_support(&self) -> usize {
        self.support_indices.len()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

impl<T: Float> Predict<T> for Svr<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        Ok(T::from_f64(self.decision_function_one(sample)?))
    }
}

impl<T: Float> Regressor<T> for Svr<T> {}
