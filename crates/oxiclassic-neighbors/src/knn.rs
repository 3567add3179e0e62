use log::debug;
use oxiclassic_core::traits::argmax;
use oxiclassic_core::validate::{check_matrix, check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, Metric, MlError, MlResult, Predict, Regressor, Tensor};
use serde::{Deserialize, Serialize};

use crate::kd_tree::{brute_force_kneighbors, check_k, KdTree, Neighbor};

/// Auto mode indexes at most this many features.
const AUTO_MAX_FEATURES: usize = 20;
/// Auto mode indexes only training sets larger than this.
const AUTO_MIN_SAMPLES: usize = 30;

/// How neighbor votes are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weights {
    Uniform,
    /// `1 / distance`; exact matches take all the weight.
    Distance,
}

/// Neighbor search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// K-D tree for low-dimensional, non-trivial training sets with a
    /// compatible metric; brute force otherwise.
    Auto,
    BruteForce,
    KdTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnParams {
    pub k: usize,
    pub metric: Metric,
    pub weights: Weights,
    pub algorithm: Algorithm,
}

impl Default for KnnParams {
    fn default() -> Self {
        KnnParams { k: 5, metric: Metric::Euclidean, weights: Weights::Uniform, algorithm: Algorithm::Auto }
    }
}

impl KnnParams {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    fn validate(&self) -> MlResult<()> {
        if self.k == 0 {
            return Err(MlError::InvalidParameter("k must be at least 1".into()));
        }
        self.metric.validate()?;
        if self.algorithm == Algorithm::KdTree && !self.metric.supports_kd_tree() {
            return Err(MlError::InvalidParameter(format!(
                "{:?} distance requires brute-force search",
                self.metric
            )));
        }
        Ok(())
    }

    fn build_index<T: Float>(&self, x: &Tensor<T>) -> MlResult<SearchIndex<T>> {
        let (n, p) = check_matrix(x)?;
        check_k(self.k, n)?;
        let use_tree = match self.algorithm {
            Algorithm::BruteForce => false,
            Algorithm::KdTree => true,
            Algorithm::Auto => {
                self.metric.supports_kd_tree() && p <= AUTO_MAX_FEATURES && n > AUTO_MIN_SAMPLES
            }
        };
        debug!(
            "k-nearest neighbors: k = {}, {} samples x {} features, {}",
            self.k,
            n,
            p,
            if use_tree { "k-d tree" } else { "brute force" }
        );
        Ok(if use_tree {
            SearchIndex::KdTree(KdTree::build(x, self.metric)?)
        } else {
            SearchIndex::Brute { points: x.clone(), metric: self.metric }
        })
    }

    pub fn fit_classifier<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<KNeighborsClassifier<T>> {
        self.validate()?;
        check_xy(x, y)?;
        let index = self.build_index(x)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        Ok(KNeighborsClassifier { index, labels, encoded, k: self.k, weights: self.weights })
    }

    pub fn fit_regressor<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<KNeighborsRegressor<T>> {
        self.validate()?;
        check_xy(x, y)?;
        let index = self.build_index(x)?;
        let targets = y.data().iter().map(|v| v.to_f64()).collect();
        Ok(KNeighborsRegressor { index, targets, k: self.k, weights: self.weights })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
enum SearchIndex<T: Float> {
    Brute { points: Tensor<T>, metric: Metric },
    KdTree(KdTree<T>),
}

impl<T: Float> SearchIndex<T> {
    fn kneighbors(&self, sample: &[T], k: usize) -> MlResult<Vec<Neighbor>> {
        match self {
            SearchIndex::Brute { points, metric } => brute_force_kneighbors(points, *metric, sample, k),
            SearchIndex::KdTree(tree) => tree.query(sample, k),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            SearchIndex::Brute { points, .. } => points.ncols(),
            SearchIndex::KdTree(tree) => tree.n_features(),
        }
    }
}

/// Per-neighbor vote weights. With distance weighting, any exact match
/// takes the whole vote.
fn vote_weights(neighbors: &[Neighbor], weights: Weights) -> Vec<f64> {
    match weights {
        Weights::Uniform => vec![1.0; neighbors.len()],
        Weights::Distance => {
            if neighbors.iter().any(|n| n.distance == 0.0) {
                neighbors.iter().map(|n| if n.distance == 0.0 { 1.0 } else { 0.0 }).collect()
            } else {
                neighbors.iter().map(|n| 1.0 / n.distance).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct KNeighborsClassifier<T: Float> {
    index: SearchIndex<T>,
    labels: ClassLabels<T>,
    encoded: Vec<usize>,
    k: usize,
    weights: Weights,
}

impl<T: Float> KNeighborsClassifier<T> {
    /// The `k` closest training rows to `sample`, closest first.
    pub fn kneighbors(&self, sample: &[T], k: usize) -> MlResult<Vec<Neighbor>> {
        check_n_features(sample.len(), self.index.n_features())?;
        self.index.kneighbors(sample, k)
    }

    pub fn uses_kd_tree(&self) -> bool {
        matches!(self.index, SearchIndex::KdTree(_))
    }
}

impl<T: Float> Predict<T> for KNeighborsClassifier<T> {
    fn n_features(&self) -> usize {
        self.index.n_features()
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let proba = self.predict_proba_one(sample)?;
        Ok(self.labels.label(argmax(&proba)))
    }
}

impl<T: Float> Classifier<T> for KNeighborsClassifier<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        let neighbors = self.kneighbors(sample, self.k)?;
        let mut votes = vec![0.0f64; self.labels.len()];
        for (n, w) in neighbors.iter().zip(vote_weights(&neighbors, self.weights)) {
            votes[self.encoded[n.index]] += w;
        }
        let total: f64 = votes.iter().sum();
        Ok(votes.into_iter().map(|v| T::from_f64(v / total)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct KNeighborsRegressor<T: Float> {
    index: SearchIndex<T>,
    targets: Vec<f64>,
    k: usize,
    weights: Weights,
}

impl<T: Float> KNeighborsRegressor<T> {
    pub fn kneighbors(&self, sample: &[T], k: usize) -> MlResult<Vec<Neighbor>> {
        check_n_features(sample.len(), self.index.n_features())?;
        self.index.kneighbors(sample, k)
    }

    pub fn uses_kd_tree(&self) -> bool {
        matches!(self.index, SearchIndex::KdTree(_))
    }
}

impl<T: Float> Predict<T> for KNeighborsRegressor<T> {
    fn n_features(&self) -> usize {
        self.index.n_features()
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let neighbors = self.kneighbors(sample, self.k)?;
        let w = vote_weights(&neighbors, self.weights);
        let total: f64 = w.iter().sum();
        let sum: f64 = neighbors.iter().zip(&w).map(|(n, w)| w * self.targets[n.index]).sum();
        Ok(T::from_f64(sum / total))
    }
}

impl<T: Float> Regressor<T> for KNeighborsRegressor<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use oxiclassic_datasets::{load_iris, make_blobs, make_linear};

    #[test]
    fn test_one_nearest_neighbor() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0, 0.0], vec![10.0, 10.0]]).unwrap();
        let y = Tensor::from_slice(&[0.0, 1.0]);
        let knn = KnnParams::default().with_k(1).fit_classifier(&x, &y).unwrap();
        assert!(!knn.uses_kd_tree());
        assert_eq!(knn.predict_one(&[0.1, 0.1]).unwrap(), 0.0);
        assert_eq!(knn.predict_one(&[9.0, 9.5]).unwrap(), 1.0);
    }

    #[test]
    fn test_auto_algorithm_selection() {
        let (x, y) = make_blobs(&[vec![0.0, 0.0], vec![5.0, 5.0]], 20, 1.0, Some(1));
        assert!(KnnParams::default().fit_classifier(&x, &y).unwrap().uses_kd_tree());
        let cosine = KnnParams::default().with_metric(Metric::Cosine);
        assert!(!cosine.fit_classifier(&x, &y).unwrap().uses_kd_tree());
        let forced = KnnParams::default().with_algorithm(Algorithm::BruteForce);
        assert!(!forced.fit_classifier(&x, &y).unwrap().uses_kd_tree());
        let bad = KnnParams::default().with_metric(Metric::Cosine).with_algorithm(Algorithm::KdTree);
        assert!(matches!(bad.fit_classifier(&x, &y), Err(MlError::InvalidParameter(_))));
    }

    #[test]
    fn test_kd_tree_and_brute_force_predict_alike() {
        let (x, y) = make_blobs(&[vec![0.0, 0.0], vec![2.0, 2.0], vec![0.0, 3.0]], 30, 1.0, Some(2));
        let kd = KnnParams::default().with_algorithm(Algorithm::KdTree).fit_classifier(&x, &y).unwrap();
        let brute = KnnParams::default().with_algorithm(Algorithm::BruteForce).fit_classifier(&x, &y).unwrap();
        assert_eq!(kd.predict_proba(&x).unwrap(), brute.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_iris_probabilities() {
        let (x, y) = load_iris();
        let knn = KnnParams::default().with_k(3).fit_classifier(&x, &y).unwrap();
        assert!(knn.score(&x, &y).unwrap() >= 0.9);
        let proba = knn.predict_proba_one(x.row(0).unwrap()).unwrap();
        assert_eq!(proba.len(), 3);
        assert_abs_diff_eq!(proba.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_weights_exact_match_dominates() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0], vec![1.2]]).unwrap();
        let y = Tensor::from_slice(&[0.0, 1.0, 1.0]);
        let knn = KnnParams::default().with_k(3).with_weights(Weights::Distance).fit_classifier(&x, &y).unwrap();
        assert_eq!(knn.predict_proba_one(&[0.0]).unwrap(), vec![1.0, 0.0]);
        // uniform voting would say class 1
        let uniform = KnnParams::default().with_k(3).fit_classifier(&x, &y).unwrap();
        assert_eq!(uniform.predict_one(&[0.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_regressor_weighted_mean() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0], vec![3.0]]).unwrap();
        let y = Tensor::from_slice(&[0.0, 10.0, 30.0]);
        let uniform = KnnParams::default().with_k(2).fit_regressor(&x, &y).unwrap();
        assert_abs_diff_eq!(uniform.predict_one(&[0.25]).unwrap(), 5.0);
        let weighted = KnnParams::default().with_k(2).with_weights(Weights::Distance).fit_regressor(&x, &y).unwrap();
        // weights 1/0.25 and 1/0.75
        assert_abs_diff_eq!(weighted.predict_one(&[0.25]).unwrap(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_regressor_on_linear_data() {
        let (x, y) = make_linear(200, &[1.0, 2.0], 0.0, 0.0, Some(6));
        let knn = KnnParams::default().fit_regressor(&x, &y).unwrap();
        assert!(knn.uses_kd_tree());
        assert!(knn.score(&x, &y).unwrap() > 0.95);
    }

    #[test]
    fn test_fit_requires_k_samples() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0]]).unwrap();
        let y = Tensor::from_slice(&[0.0, 1.0]);
        assert!(matches!(
            KnnParams::default().fit_classifier(&x, &y),
            Err(MlError::InsufficientSamples { required: 5, got: 2 })
        ));
    }

    #[test]
    fn test_kneighbors_returns_sorted_pairs() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![5.0], vec![1.0], vec![2.5]]).unwrap();
        let y = Tensor::from_slice(&[0.0, 1.0, 0.0, 1.0]);
        let knn = KnnParams::default().with_k(2).fit_classifier(&x, &y).unwrap();
        let res = knn.kneighbors(&[2.0], 3).unwrap();
        let idx: Vec<usize> = res.iter().map(|n| n.index).collect();
        assert_eq!(idx, vec![3, 2, 0]);
        assert_abs_diff_eq!(res[0].distance, 0.5);
    }
}
