//! Prediction-side contracts shared by every trained model.
//!
//! Training is always `Params::fit(..) -> MlResult<Model>`; the resulting
//! model value is immutable, so these traits only take `&self`.

use crate::dtype::Float;
use crate::error::MlResult;
use crate::scoring::{accuracy, r2_score};
use crate::tensor::Tensor;
use crate::validate::{check_matrix, check_n_features, check_xy};

/// A trained model mapping one feature vector to one output value.
pub trait Predict<T: Float> {
    /// Feature count seen during `fit`.
    fn n_features(&self) -> usize;

    /// Predict a single sample. Implementations may assume
    /// `sample.len() == self.n_features()`.
    fn predict_one(&self, sample: &[T]) -> MlResult<T>;

    /// Batch prediction over the rows of `x`.
    fn predict(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let (n, p) = check_matrix(x)?;
        check_n_features(p, self.n_features())?;
        let preds = x.rows().map(|row| self.predict_one(row)).collect::<MlResult<Vec<T>>>()?;
        Tensor::new(preds, vec![n])
    }
}

pub trait Classifier<T: Float>: Predict<T> {
    /// Sorted, de-duplicated training classes.
    fn classes(&self) -> &[T];

    /// Class-probability vector aligned to [`Classifier::classes`].
    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>>;

    /// Probabilities for every row, shape `[n_samples, n_classes]`.
    fn predict_proba(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let (n, p) = check_matrix(x)?;
        check_n_features(p, self.n_features())?;
        let k = self.classes().len();
        let mut data = Vec::with_capacity(n * k);
        for row in x.rows() {
            data.extend(self.predict_proba_one(row)?);
        }
        Tensor::new(data, vec![n, k])
    }

    /// Mean accuracy on `(x, y)`.
    fn score(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<f64> {
        check_xy(x, y)?;
        accuracy(y, &self.predict(x)?)
    }
}

pub trait Regressor<T: Float>: Predict<T> {
    /// R² on `(x, y)`.
    fn score(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<f64> {
        check_xy(x, y)?;
        r2_score(y, &self.predict(x)?)
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax<T: Float>(values: &[T]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax.
pub fn softmax<T: Float>(scores: &[T]) -> Vec<T> {
    let max = scores.iter().copied().fold(T::INFINITY * T::NEG_ONE, T::max);
    let exps: Vec<T> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: T = exps.iter().copied().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct Threshold;

    impl Predict<f64> for Threshold {
        fn n_features(&self) -> usize {
            1
        }
        fn predict_one(&self, sample: &[f64]) -> MlResult<f64> {
            Ok(if sample[0] > 0.0 { 1.0 } else { 0.0 })
        }
    }

    impl Classifier<f64> for Threshold {
        fn classes(&self) -> &[f64] {
            &[0.0, 1.0]
        }
        fn predict_proba_one(&self, sample: &[f64]) -> MlResult<Vec<f64>> {
            let p = self.predict_one(sample)?;
            Ok(vec![1.0 - p, p])
        }
    }

    #[test]
    fn test_default_batch_methods() {
        let x: Tensor<f64> = Tensor::new(vec![-1.0, 2.0, 3.0], vec![3, 1]).unwrap();
        let y: Tensor<f64> = Tensor::from_slice(&[0.0, 1.0, 0.0]);
        let m = Threshold;
        assert_eq!(m.predict(&x).unwrap().data(), &[0.0, 1.0, 1.0]);
        assert_eq!(m.predict_proba(&x).unwrap().shape_vec(), vec![3, 2]);
        assert_abs_diff_eq!(m.score(&x, &y).unwrap(), 2.0 / 3.0);

        let wide: Tensor<f64> = Tensor::zeros(vec![2, 2]);
        assert!(m.predict(&wide).is_err());
    }

    #[test]
    fn test_softmax_and_argmax() {
        let p = softmax(&[1.0f64, 1.0, 1.0]);
        assert_abs_diff_eq!(p[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(argmax(&[0.1f64, 0.7, 0.7]), 1);
    }
}
