use log::{debug, trace, warn};
use oxiclassic_core::rng::seeded;
use oxiclassic_core::traits::{argmax, softmax};
use oxiclassic_core::validate::{check_matrix, check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, MlError, MlResult, Predict, Tensor};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::regression::GradientDescent;

const LOG_CLAMP: f64 = 1e-15;

fn sigmoid<T: Float>(z: T) -> T {
    T::ONE / (T::ONE + (-z).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    /// L2 strength; the objective adds `(alpha / 2n)‖W‖²`.
    pub alpha: f64,
    pub optimizer: GradientDescent,
    pub seed: Option<u64>,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        LogisticRegressionParams {
            alpha: 0.0,
            optimizer: GradientDescent { learning_rate: 0.1, max_iter: 1000, tol: 1e-6, batch_size: None },
            seed: Some(42),
        }
    }
}

impl LogisticRegressionParams {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.optimizer.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.optimizer.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.optimizer.tol = tol;
        self
    }

    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.optimizer.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Binary targets train one sigmoid unit against class 1; three or more
    /// classes train a softmax layer against one-hot targets.
    pub fn fit<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<LogisticRegression<T>> {
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(MlError::InvalidParameter(format!("alpha must be non-negative, got {}", self.alpha)));
        }
        self.optimizer.validate()?;
        let (n, p) = check_xy(x, y)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        let k = labels.len();
        if k < 2 {
            return Err(MlError::InvalidLabel(format!("logistic regression needs at least 2 classes, got {}", k)));
        }
        let outputs = if k == 2 { 1 } else { k };

        // column-per-output targets: class 1 indicator, or one-hot
        let mut targets = vec![T::ZERO; n * outputs];
        for (i, &c) in encoded.iter().enumerate() {
            if outputs == 1 {
                targets[i] = T::from_usize(c);
            } else {
                targets[i * outputs + c] = T::ONE;
            }
        }
        let targets = Tensor::new(targets, vec![n, outputs])?;

        let gd = self.optimizer;
        let lr = T::from_f64(gd.learning_rate);
        let decay = T::from_f64(self.alpha / n as f64);
        let mut weights: Tensor<T> = Tensor::zeros(vec![p, outputs]);
        let mut bias: Tensor<T> = Tensor::zeros(vec![outputs]);
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
                let (xb, tb) = if batch_size < n {
                    (x.select_rows(batch)?, targets.select_rows(batch)?)
                } else {
                    (x.clone(), targets.clone())
                };
                let m = T::ONE / T::from_usize(batch.len());
                let error = activate(&xb.matmul(&weights)?.add(&bias)?)?.sub(&tb)?;
                let grad_w = xb.t()?.matmul(&error)?.mul_scalar(m).add(&weights.mul_scalar(decay))?;
                let grad_b = column_means(&error);
                weights = weights.sub(&grad_w.mul_scalar(lr))?;
                bias = bias.sub(&grad_b.mul_scalar(lr))?;
            }
            n_iter += 1;

            let probs = activate(&x.matmul(&weights)?.add(&bias)?)?;
            let penalty: f64 = weights.data().iter().map(|w| w.to_f64() * w.to_f64()).sum::<f64>() * self.alpha
                / (2.0 * n as f64);
            let loss = cross_entropy(&probs, &targets) + penalty;
            trace!("logistic regression epoch {}: loss {:.8}", n_iter, loss);
            let previous = loss_history.last().copied();
            loss_history.push(loss);
            if !loss.is_finite() {
                warn!("logistic regression: loss diverged at epoch {}, lower the learning rate", n_iter);
                break;
            }
            if previous.is_some_and(|prev: f64| (prev - loss).abs() < gd.tol) {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!("logistic regression: stopped after {} epochs without converging", n_iter);
        }
        debug!(
            "logistic regression: {} samples x {} features, {} classes, final loss {:.6}",
            n,
            p,
            k,
            loss_history.last().copied().unwrap_or(f64::NAN)
        );

        let coefficients = if outputs == 1 { weights.reshape(vec![p])? } else { weights };
        Ok(LogisticRegression { labels, coefficients, intercepts: bias, n_iter, converged, loss_history })
    }
}

/// Sigmoid for a single output column, row-wise softmax otherwise.
fn activate<T: Float>(z: &Tensor<T>) -> MlResult<Tensor<T>> {
    if z.ncols() == 1 {
        return Ok(z.apply(sigmoid));
    }
    let data: Vec<T> = z.rows().flat_map(|row| softmax(row)).collect();
    Tensor::new(data, z.shape_vec())
}

fn column_means<T: Float>(m: &Tensor<T>) -> Tensor<T> {
    let k = m.ncols();
    let mut sums = vec![T::ZERO; k];
    for row in m.rows() {
        for (s, &v) in sums.iter_mut().zip(row) {
            *s += v;
        }
    }
    let n = T::from_usize(m.nrows().max(1));
    Tensor::from_slice(&sums).apply(|s| s / n)
}

/// Mean binary or categorical cross-entropy.
fn cross_entropy<T: Float>(probs: &Tensor<T>, targets: &Tensor<T>) -> f64 {
    let n = probs.nrows().max(1) as f64;
    let binary = probs.ncols() == 1;
    let total: f64 = probs
        .data()
        .iter()
        .zip(targets.data())
        .map(|(&p, &t)| {
            let (p, t) = (p.to_f64().clamp(LOG_CLAMP, 1.0 - LOG_CLAMP), t.to_f64());
            if binary {
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            } else {
                -t * p.ln()
            }
        })
        .sum();
    total / n
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct LogisticRegression<T: Float> {
    labels: ClassLabels<T>,
    coefficients: Tensor<T>,
    intercepts: Tensor<T>,
    n_iter: usize,
    converged: bool,
    loss_history: Vec<f64>,
}

impl<T: Float> LogisticRegression<T> {
    /// Shape `[p]` for two classes, `[p, K]` otherwise.
    pub fn coefficients(&self) -> &Tensor<T> {
        &self.coefficients
    }

    /// One intercept per output unit.
    pub fn intercepts(&self) -> &[T] {
        self.intercepts.data()
    }

    pub fn is_multinomial(&self) -> bool {
        self.coefficients.ndim() == 2
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Raw linear scores, one per output unit.
    pub fn decision_function_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        check_n_features(sample.len(), self.n_features())?;
        let outputs = self.intercepts.numel();
        let w = self.coefficients.data();
        Ok((0..outputs)
            .map(|o| {
                sample.iter().enumerate().map(|(j, &v)| v * w[j * outputs + o]).sum::<T>() + self.intercepts.data()[o]
            })
            .collect())
    }
}

impl<T: Float> Predict<T> for LogisticRegression<T> {
    fn n_features(&self) -> usize {
        self.coefficients.nrows()
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let proba = self.predict_proba_one(sample)?;
        Ok(self.labels.label(argmax(&proba)))
    }
}

impl<T: Float> Classifier<T> for LogisticRegression<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        let scores = self.decision_function_one(sample)?;
        if scores.len() == 1 {
            let p = sigmoid(scores[0]);
            return Ok(vec![T::ONE - p, p]);
        }
        Ok(softmax(&scores))
    }

    fn predict_proba(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let (n, p) = check_matrix(x)?;
        check_n_features(p, self.n_features())?;
        let outputs = self.intercepts.numel();
        let weights = self.coefficients.reshape(vec![p, outputs])?;
        let probs = activate(&x.matmul(&weights)?.add(&self.intercepts)?)?;
        if outputs > 1 {
            return Ok(probs);
        }
        let data = probs.data().iter().flat_map(|&q| [T::ONE - q, q]).collect();
        Tensor::new(data, vec![n, 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use oxiclassic_datasets::{load_iris, make_blobs};

    #[test]
    fn test_binary_blobs() {
        let (x, y) = make_blobs(&[vec![-2.0, -2.0], vec![2.0, 2.0]], 40, 0.6, Some(1));
        let model = LogisticRegressionParams::default().fit(&x, &y).unwrap();
        assert!(!model.is_multinomial());
        assert_eq!(model.coefficients().shape_vec(), vec![2]);
        assert_eq!(model.intercepts().len(), 1);
        assert!(model.score(&x, &y).unwrap() > 0.95);
        // loss is non-increasing for full-batch descent on a convex objective
        let history = model.loss_history();
        assert!(history.windows(2).all(|w| w[1] <= w[0] + 1e-12));
    }

    #[test]
    fn test_multinomial_iris() {
        let (x, y) = load_iris();
        let model = LogisticRegressionParams::default()
            .with_learning_rate(0.02)
            .with_max_iter(5000)
            .fit(&x, &y).unwrap();
        assert!(model.is_multinomial());
        assert_eq!(model.coefficients().shape_vec(), vec![4, 3]);
        assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);
        assert!(model.score(&x, &y).unwrap() > 0.85);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = load_iris();
        let model = LogisticRegressionParams::default().with_learning_rate(0.02).with_max_iter(200).fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.shape_vec(), vec![30, 3]);
        for (i, row) in proba.rows().enumerate() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
            let single = model.predict_proba_one(x.row(i).unwrap()).unwrap();
            for (a, b) in row.iter().zip(&single) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_binary_proba_has_two_columns() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![-1.0], vec![-0.5], vec![0.5], vec![1.0]]).unwrap();
        let y = Tensor::from_slice(&[3.0, 3.0, 7.0, 7.0]);
        let model = LogisticRegressionParams::default().fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.shape_vec(), vec![4, 2]);
        assert!(proba.get(&[0, 0]).unwrap() > 0.5);
        assert!(proba.get(&[3, 1]).unwrap() > 0.5);
        assert_eq!(model.predict_one(&[2.0]).unwrap(), 7.0);
    }

    #[test]
    fn test_l2_penalty_shrinks_weights() {
        let (x, y) = make_blobs(&[vec![-1.0], vec![1.0]], 30, 0.3, Some(2));
        let plain = LogisticRegressionParams::default().fit(&x, &y).unwrap();
        let ridge = LogisticRegressionParams::default().with_alpha(10.0).fit(&x, &y).unwrap();
        assert!(ridge.coefficients().data()[0].abs() < plain.coefficients().data()[0].abs());
    }

    #[test]
    fn test_minibatch_training() {
        let (x, y) = make_blobs(&[vec![0.0, 3.0], vec![3.0, 0.0], vec![-3.0, -3.0]], 20, 0.5, Some(3));
        let model = LogisticRegressionParams::default()
            .with_batch_size(Some(8))
            .with_max_iter(200)
            .fit(&x, &y)
            .unwrap();
        assert!(model.score(&x, &y).unwrap() > 0.95);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0]]).unwrap();
        let y = Tensor::from_slice(&[1.0, 1.0]);
        assert!(matches!(LogisticRegressionParams::default().fit(&x, &y), Err(MlError::InvalidLabel(_))));
    }

    #[test]
    fn test_serde_round_trip_predicts_identically() {
        let (x, y) = load_iris();
        let model = LogisticRegressionParams::default().with_learning_rate(0.02).with_max_iter(100).fit(&x, &y).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: LogisticRegression<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(model.predict(&x).unwrap(), restored.predict(&x).unwrap());
    }
}
