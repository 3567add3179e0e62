use log::{debug, warn};
use oxiclassic_core::rng::{child_seeds, seeded};
use oxiclassic_core::traits::{argmax, softmax};
use oxiclassic_core::validate::{check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, MlError, MlResult, Predict, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::kernel::Kernel;
use crate::smo::{self, SmoConfig};

/// Multipliers at or below this are not kept as support vectors.
pub(crate) const SUPPORT_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcParams {
    /// Box constraint on the dual multipliers.
    pub c: f64,
    pub kernel: Kernel,
    /// KKT violation tolerance.
    pub tol: f64,
    /// Consecutive passes without a multiplier change before SMO stops.
    pub max_passes: usize,
    /// Hard cap on SMO passes.
    pub max_iter: usize,
    pub seed: Option<u64>,
}

impl Default for SvcParams {
    fn default() -> Self {
        SvcParams { c: 1.0, kernel: Kernel::default(), tol: 1e-3, max_passes: 5, max_iter: 1000, seed: Some(42) }
    }
}

impl SvcParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
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
        if !(self.tol > 0.0) {
            return Err(MlError::InvalidParameter(format!("tol must be positive, got {}", self.tol)));
        }
        if self.max_passes == 0 || self.max_iter == 0 {
            return Err(MlError::InvalidParameter("max_passes and max_iter must be at least 1".into()));
        }
        self.kernel.validate()
    }

    /// Train a binary machine for two classes, or one machine per class
    /// (one-vs-rest) for more.
    pub fn fit<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<Svc<T>> {
        self.validate()?;
        let (_, p) = check_xy(x, y)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        if labels.len() < 2 {
            return Err(MlError::InvalidLabel(format!(
                "classification needs at least two classes, got {}",
                labels.len()
            )));
        }

        let gram = self.kernel.gram(x);
        let config = SmoConfig { c: self.c, tol: self.tol, max_passes: self.max_passes, max_iter: self.max_iter };
        // A binary problem is a single "class 1 vs rest" machine.
        let positives: Vec<usize> = if labels.len() == 2 { vec![1] } else { (0..labels.len()).collect() };
        let seeds = child_seeds(&mut seeded(self.seed), positives.len());

        let machines = positives
            .iter()
            .zip(seeds)
            .map(|(&positive, seed)| {
                let targets: Vec<f64> = encoded.iter().map(|&c| if c == positive { 1.0 } else { -1.0 }).collect();
                BinaryMachine::train(x, &gram, &targets, config, &mut StdRng::seed_from_u64(seed))
            })
            .collect::<MlResult<Vec<_>>>()?;

        debug!(
            "svc: {} machine(s), {} support vectors in total",
            machines.len(),
            machines.iter().map(BinaryMachine::n_support).sum::<usize>()
        );
        Ok(Svc { kernel: self.kernel, labels, machines, n_features: p })
    }
}

/// One `±1` decision function `f(x) = Σ coefᵢ k(svᵢ, x) + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct BinaryMachine<T: Float> {
    support_vectors: Tensor<T>,
    support_indices: Vec<usize>,
    /// `αᵢ yᵢ` per support vector.
    dual_coef: Vec<f64>,
    bias: f64,
    n_iter: usize,
    converged: bool,
}

impl<T: Float> BinaryMachine<T> {
    fn train(x: &Tensor<T>, gram: &[f64], y: &[f64], config: SmoConfig, rng: &mut StdRng) -> MlResult<Self> {
        let sol = smo::solve(gram, y, config, rng);
        if !sol.converged {
            warn!("svc: SMO stopped after {} passes without converging", sol.n_iter);
        }
        let support_indices: Vec<usize> = (0..y.len()).filter(|&i| sol.alphas[i] > SUPPORT_EPS).collect();
        let dual_coef = support_indices.iter().map(|&i| sol.alphas[i] * y[i]).collect();
        Ok(BinaryMachine {
            support_vectors: x.select_rows(&support_indices)?,
            support_indices,
            dual_coef,
            bias: sol.bias,
            n_iter: sol.n_iter,
            converged: sol.converged,
        })
    }

    pub(crate) fn decision(&self, kernel: &Kernel, sample: &[T]) -> f64 {
        self.support_vectors
            .rows()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * kernel.compute(sv, sample))
            .sum::<f64>()
            + self.bias
    }

    pub fn support_vectors(&self) -> &Tensor<T> {
        &self.support_vectors
    }

    /// Training rows kept as support vectors.
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

/// Kernel support vector classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct Svc<T: Float> {
    kernel: Kernel,
    labels: ClassLabels<T>,
    machines: Vec<BinaryMachine<T>>,
    n_features: usize,
}

impl<T: Float> Svc<T> {
    /// One score for binary problems (positive means `classes()[1]`),
    /// otherwise one one-vs-rest score per class.
    pub fn decision_function_one(&self, sample: &[T]) -> MlResult<Vec<f64>> {
        check_n_features(sample.len(), self.n_features)?;
        Ok(self.machines.iter().map(|m| m.decision(&self.kernel, sample)).collect())
    }

    /// Scores for every row, shape `[n_samples, n_machines]`.
    pub fn decision_function(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let mut data = Vec::with_capacity(x.nrows() * self.machines.len());
        for row in x.rows() {
            data.extend(self.decision_function_one(row)?.into_iter().map(T::from_f64));
        }
        Tensor::new(data, vec![x.nrows(), self.machines.len()])
    }

    /// Binary machines: one for two classes, one per class otherwise.
    pub fn machines(&self) -> &[BinaryMachine<T>] {
        &self.machines
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Support vector count of every machine.
    pub fn n_support(&self) -> Vec<usize> {
        self.machines.iter().map(BinaryMachine::n_support).collect()
    }

    pub fn converged(&self) -> bool {
        self.machines.iter().all(BinaryMachine::converged)
    }
}

impl<T: Float> Predict<T> for Svc<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let scores = self.decision_function_one(sample)?;
        let class = match scores.as_slice() {
            [score] => usize::from(*score > 0.0),
            _ => argmax(&scores),
        };
        Ok(self.labels.label(class))
    }
}

impl<T: Float> Classifier<T> for Svc<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    /// Logistic of the binary score, or a softmax over one-vs-rest scores.
    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        let scores = self.decision_function_one(sample)?;
        let proba = match scores.as_slice() {
            [score] => {
                let p = 1.0 / (1.0 + (-score).exp());
                vec![1.0 - p, p]
            }
            _ => softmax(&scores),
        };
        Ok(proba.into_iter().map(T::from_f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use oxiclassic_datasets::{load_iris, make_blobs};

    fn separable() -> (Tensor<f64>, Tensor<f64>) {
        make_blobs(&[vec![-3.0, -3.0], vec![3.0, 3.0]], 20, 0.7, Some(21))
    }

    #[test]
    fn test_linear_svc_separates_blobs() {
        let (x, y) = separable();
        let svc = SvcParams::default().with_kernel(Kernel::Linear).with_c(10.0).fit(&x, &y).unwrap();
        assert_eq!(svc.machines().len(), 1);
        assert_abs_diff_eq!(svc.score(&x, &y).unwrap(), 1.0);
        assert!(svc.n_support()[0] >= 2);
        assert!(svc.n_support()[0] < x.nrows());
    }

    #[test]
    fn test_support_vector_decisions_match_labels() {
        // The second multiplier of each SMO pair is picked at random, so the
        // exact support set depends on the seed; the sign condition does not.
        let (x, y) = separable();
        for seed in [1, 2, 3] {
            for kernel in [Kernel::Linear, Kernel::Rbf { gamma: 0.5 }] {
                let svc = SvcParams::default()
                    .with_kernel(kernel)
                    .with_c(10.0)
                    .with_seed(Some(seed))
                    .fit(&x, &y)
                    .unwrap();
                let machine = &svc.machines()[0];
                for (sv, &i) in machine.support_vectors().rows().zip(machine.support_indices()) {
                    let sign = if y.data()[i] == 1.0 { 1.0 } else { -1.0 };
                    let f = svc.decision_function_one(sv).unwrap()[0];
                    assert!(sign * f > 0.0, "seed {}, {:?}: sv {} has decision {}", seed, kernel, i, f);
                }
            }
        }
    }

    #[test]
    fn test_dual_coefficients_balance() {
        let (x, y) = separable();
        let svc = SvcParams::default().with_kernel(Kernel::Linear).fit(&x, &y).unwrap();
        let m = &svc.machines()[0];
        assert_abs_diff_eq!(m.dual_coefficients().iter().sum::<f64>(), 0.0, epsilon = 1e-6);
        assert!(m.dual_coefficients().iter().all(|c| c.abs() <= 1.0 + 1e-9));
    }

    #[test]
    fn test_one_vs_rest_iris() {
        let (x, y) = load_iris();
        let svc = SvcParams::default().with_kernel(Kernel::Rbf { gamma: 0.5 }).with_c(10.0).fit(&x, &y).unwrap();
        assert_eq!(svc.machines().len(), 3);
        assert!(svc.score(&x, &y).unwrap() >= 0.9);
        let scores = svc.decision_function(&x).unwrap();
        assert_eq!(scores.shape_vec(), vec![30, 3]);
        for row in svc.predict_proba(&x).unwrap().rows() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_binary_proba_follows_decision_sign() {
        let (x, y) = separable();
        let svc = SvcParams::default().with_kernel(Kernel::Linear).fit(&x, &y).unwrap();
        let proba = svc.predict_proba_one(&[3.0, 3.0]).unwrap();
        assert!(proba[1] > 0.5);
        assert_eq!(svc.predict_one(&[3.0, 3.0]).unwrap(), 1.0);
        assert_eq!(svc.predict_one(&[-3.0, -3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_single_class_and_bad_c() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0]]).unwrap();
        let y = Tensor::from_slice(&[1.0, 1.0]);
        assert!(matches!(SvcParams::default().fit(&x, &y), Err(MlError::InvalidLabel(_))));
        let y2 = Tensor::from_slice(&[0.0, 1.0]);
        assert!(SvcParams::default().with_c(0.0).fit(&x, &y2).is_err());
    }

    #[test]
    fn test_params_json_roundtrip() {
        let params = SvcParams::default().with_kernel(Kernel::Polynomial { gamma: 0.5, coef0: 1.0, degree: 3 });
        let back: SvcParams = serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(params, back);
    }
}
