use log::{debug, trace, warn};
use oxiclassic_core::rng::seeded;
use oxiclassic_core::validate::{check_matrix, check_n_features, check_xy};
use oxiclassic_core::{Float, MlError, MlResult, Predict, Regressor, Tensor};
use oxiclassic_linalg::solve;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Weight penalty. With `n` samples the minimised objective is
///
/// `(1/2n)‖y - Xw - b‖² + (1/n)(λ₁‖w‖₁ + (λ₂/2)‖w‖²)`
///
/// so an L2 fit solves exactly `(XᵀX + λ₂I)w = Xᵀy`. The intercept is never
/// penalised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Penalty {
    None,
    /// Ridge.
    L2 { alpha: f64 },
    /// Lasso.
    L1 { alpha: f64 },
    /// `λ₁ = alpha·l1_ratio`, `λ₂ = alpha·(1 - l1_ratio)`.
    ElasticNet { alpha: f64, l1_ratio: f64 },
}

impl Penalty {
    fn l1(&self) -> f64 {
        match *self {
            Penalty::L1 { alpha } => alpha,
            Penalty::ElasticNet { alpha, l1_ratio } => alpha * l1_ratio,
            _ => 0.0,
        }
    }

    fn l2(&self) -> f64 {
        match *self {
            Penalty::L2 { alpha } => alpha,
            Penalty::ElasticNet { alpha, l1_ratio } => alpha * (1.0 - l1_ratio),
            _ => 0.0,
        }
    }

    /// Whether the closed-form solve applies.
    pub fn is_smooth(&self) -> bool {
        self.l1() == 0.0
    }

    fn validate(&self) -> MlResult<()> {
        let (alpha, ratio) = match *self {
            Penalty::None => return Ok(()),
            Penalty::L2 { alpha } | Penalty::L1 { alpha } => (alpha, 0.5),
            Penalty::ElasticNet { alpha, l1_ratio } => (alpha, l1_ratio),
        };
        if !(alpha >= 0.0 && alpha.is_finite()) {
            return Err(MlError::InvalidParameter(format!("penalty alpha must be non-negative, got {}", alpha)));
        }
        if !(0.0..=1.0).contains(&ratio) {
            return Err(MlError::InvalidParameter(format!("l1_ratio must be in [0, 1], got {}", ratio)));
        }
        Ok(())
    }

    fn value(&self, w: &[f64], n: usize) -> f64 {
        let l1: f64 = w.iter().map(|v| v.abs()).sum();
        let l2: f64 = w.iter().map(|v| v * v).sum();
        (self.l1() * l1 + 0.5 * self.l2() * l2) / n as f64
    }
}

/// Settings for iterative training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientDescent {
    pub learning_rate: f64,
    /// Epochs over the training set.
    pub max_iter: usize,
    /// Converged once the epoch-to-epoch objective change drops below this.
    pub tol: f64,
    /// Mini-batch size; `None` uses the full batch.
    pub batch_size: Option<usize>,
}

impl Default for GradientDescent {
    fn default() -> Self {
        GradientDescent { learning_rate: 0.1, max_iter: 1000, tol: 1e-8, batch_size: None }
    }
}

impl GradientDescent {
    pub(crate) fn validate(&self) -> MlResult<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MlError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_iter == 0 || self.batch_size == Some(0) {
            return Err(MlError::InvalidParameter("max_iter and batch_size must be at least 1".into()));
        }
        if !(self.tol >= 0.0) {
            return Err(MlError::InvalidParameter(format!("tol must be non-negative, got {}", self.tol)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Solver {
    /// Normal equations for smooth penalties, gradient descent otherwise.
    Auto,
    NormalEquation,
    GradientDescent(GradientDescent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionParams {
    pub penalty: Penalty,
    pub solver: Solver,
    pub fit_intercept: bool,
    /// Drives mini-batch shuffling.
    pub seed: Option<u64>,
}

impl Default for LinearRegressionParams {
    fn default() -> Self {
        LinearRegressionParams { penalty: Penalty::None, solver: Solver::Auto, fit_intercept: true, seed: Some(42) }
    }
}

impl LinearRegressionParams {
    pub fn ridge(alpha: f64) -> Self {
        LinearRegressionParams { penalty: Penalty::L2 { alpha }, ..Self::default() }
    }

    pub fn lasso(alpha: f64) -> Self {
        LinearRegressionParams { penalty: Penalty::L1 { alpha }, ..Self::default() }
    }

    pub fn elastic_net(alpha: f64, l1_ratio: f64) -> Self {
        LinearRegressionParams { penalty: Penalty::ElasticNet { alpha, l1_ratio }, ..Self::default() }
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> MlResult<()> {
        self.penalty.validate()?;
        match self.solver {
            Solver::NormalEquation if !self.penalty.is_smooth() => Err(MlError::InvalidParameter(
                "L1 and elastic-net penalties require gradient descent".into(),
            )),
            Solver::GradientDescent(gd) => gd.validate(),
            _ => Ok(()),
        }
    }

    pub fn fit<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<LinearRegression<T>> {
        self.validate()?;
        let (n, p) = check_xy(x, y)?;
        let gd = match self.solver {
            Solver::GradientDescent(gd) => Some(gd),
            Solver::Auto if !self.penalty.is_smooth() => Some(GradientDescent::default()),
            _ => None,
        };
        let model = match gd {
            Some(gd) => self.gradient_descent(x, y, gd)?,
            None => match self.normal_equation(x, y) {
                Ok(model) => model,
                Err(MlError::SingularMatrix) => {
                    warn!("linear regression: normal equations are singular, falling back to gradient descent");
                    self.gradient_descent(x, y, GradientDescent::default())?
                }
                Err(e) => return Err(e),
            },
        };
        debug!(
            "linear regression: {} samples x {} features, intercept {:.6}, {} iterations",
            n,
            p,
            model.intercept,
            model.n_iter
        );
        Ok(model)
    }

    /// Solve `(XᵀX + λ₂I)w = Xᵀy` on the bias-augmented design matrix.
    fn normal_equation<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<LinearRegression<T>> {
        let (n, p) = (x.nrows(), x.ncols());
        let design = if self.fit_intercept {
            Tensor::concatenate(&[&Tensor::ones(vec![n, 1]), x], 1)?
        } else {
            x.clone()
        };
        let xt = design.t()?;
        let mut gram = xt.matmul(&design)?;
        let lambda = T::from_f64(self.penalty.l2());
        let offset = usize::from(self.fit_intercept);
        let width = gram.ncols();
        for j in offset..width {
            gram.data_mut()[j * width + j] += lambda;
        }
        let rhs = xt.matmul(&y.reshape(vec![n, 1])?)?;
        let w = solve(&gram, &rhs)?.into_data();
        let (intercept, coefs) = if self.fit_intercept { (w[0], w[1..].to_vec()) } else { (T::ZERO, w) };
        Ok(LinearRegression {
            coefficients: Tensor::new(coefs, vec![p])?,
            intercept,
            n_iter: 0,
            converged: true,
            loss_history: Vec::new(),
        })
    }

    fn gradient_descent<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>, gd: GradientDescent) -> MlResult<LinearRegression<T>> {
        let (n, p) = (x.nrows(), x.ncols());
        let y_col = y.reshape(vec![n, 1])?;
        let mut w: Tensor<T> = Tensor::zeros(vec![p, 1]);
        let mut b = T::ZERO;
        let lr = T::from_f64(gd.learning_rate);
        let (l1, l2) = (T::from_f64(self.penalty.l1()), T::from_f64(self.penalty.l2()));
        let inv_n = T::ONE / T::from_usize(n);
        let mut rng = seeded(self.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let batch_size = gd.batch_size.unwrap_or(n).min(n);

        let mut loss_history = Vec::with_capacity(gd.max_iter);
        let mut converged = false;
        let mut n_iter = 0;
        while n_iter < gd.max_iter {
            if batch_size < n {
                order.shuffle(&mut rng);
            }
            for batch in order.chunks(batch_size) {
                let (xb, yb) = if batch_size < n {
                    (x.select_rows(batch)?, y_col.select_rows(batch)?)
                } else {
                    (x.clone(), y_col.clone())
                };
                let m = T::ONE / T::from_usize(batch.len());
                let residual = xb.matmul(&w)?.add_scalar(b).sub(&yb)?;
                let ridge_grad = w.mul_scalar(l2 * inv_n);
                let grad_w = xb.t()?.matmul(&residual)?.mul_scalar(m).add(&ridge_grad)?;
                // proximal step for the L1 term keeps exact zeros
                let shrink = lr * l1 * inv_n;
                w = w.sub(&grad_w.mul_scalar(lr))?.apply(|v| soft_threshold(v, shrink));
                if self.fit_intercept {
                    b -= lr * residual.mean_all();
                }
            }
            n_iter += 1;

            let residual = x.matmul(&w)?.add_scalar(b).sub(&y_col)?;
            let sse: f64 = residual.data().iter().map(|r| r.to_f64() * r.to_f64()).sum();
            let weights: Vec<f64> = w.data().iter().map(|v| v.to_f64()).collect();
            let loss = sse / (2.0 * n as f64) + self.penalty.value(&weights, n);
            trace!("linear regression epoch {}: objective {:.8}", n_iter, loss);
            let previous = loss_history.last().copied();
            loss_history.push(loss);
            if !loss.is_finite() {
                warn!("linear regression: objective diverged at epoch {}, lower the learning rate", n_iter);
                break;
            }
            if previous.is_some_and(|prev: f64| (prev - loss).abs() < gd.tol) {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!("linear regression: gradient descent stopped after {} epochs without converging", n_iter);
        }
        Ok(LinearRegression {
            coefficients: w.reshape(vec![p])?,
            intercept: b,
            n_iter,
            converged,
            loss_history,
        })
    }
}

fn soft_threshold<T: Float>(v: T, shrink: T) -> T {
    if v > shrink {
        v - shrink
    } else if v < -shrink {
        v + shrink
    } else {
        T::ZERO
    }
}

/// Fitted `y = Xw + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct LinearRegression<T: Float> {
    coefficients: Tensor<T>,
    intercept: T,
    n_iter: usize,
    converged: bool,
    loss_history: Vec<f64>,
}

impl<T: Float> LinearRegression<T> {
    /// Weights, shape `[n_features]`.
    pub fn coefficients(&self) -> &Tensor<T> {
        &self.coefficients
    }

    pub fn intercept(&self) -> T {
        self.intercept
    }

    /// Gradient-descent epochs run; 0 for a closed-form solve.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Objective after each epoch; empty for a closed-form solve.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }
}

impl<T: Float> Predict<T> for LinearRegression<T> {
    fn n_features(&self) -> usize {
        self.coefficients.numel()
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        check_n_features(sample.len(), self.n_features())?;
        let dot: T = sample.iter().zip(self.coefficients.data()).map(|(&a, &w)| a * w).sum();
        Ok(dot + self.intercept)
    }

    fn predict(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let (n, p) = check_matrix(x)?;
        check_n_features(p, self.n_features())?;
        x.matmul(&self.coefficients.reshape(vec![p, 1])?)?.add_scalar(self.intercept).reshape(vec![n])
    }
}

impl<T: Float> Regressor<T> for LinearRegression<T> {}
