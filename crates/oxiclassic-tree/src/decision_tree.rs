use log::debug;
use oxiclassic_core::rng::seeded;
use oxiclassic_core::validate::{check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, MlResult, Predict, Regressor, Tensor};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::builder::{Grower, Node, Targets};
use crate::params::TreeParams;

impl TreeParams {
    /// Grow a classification tree (Gini or entropy criterion).
    pub fn fit_classifier<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<DecisionTreeClassifier<T>> {
        self.validate(true)?;
        let (n, _) = check_xy(x, y)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        Ok(DecisionTreeClassifier::grow(self, x, &encoded, labels, (0..n).collect(), seeded(self.seed)))
    }

    /// Grow a regression tree (squared or absolute error criterion).
    pub fn fit_regressor<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<DecisionTreeRegressor<T>> {
        self.validate(false)?;
        let (n, _) = check_xy(x, y)?;
        Ok(DecisionTreeRegressor::grow(self, x, y.data(), (0..n).collect(), seeded(self.seed)))
    }
}

/// CART classification tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct DecisionTreeClassifier<T: Float> {
    root: Node<T>,
    labels: ClassLabels<T>,
    n_features: usize,
    importances: Option<Vec<f64>>,
}

impl<T: Float> DecisionTreeClassifier<T> {
    /// Grow on the sample subset `indices` (duplicates allowed). Inputs are
    /// assumed validated by the caller.
    pub(crate) fn grow(
        params: &TreeParams,
        x: &Tensor<T>,
        encoded: &[usize],
        labels: ClassLabels<T>,
        indices: Vec<usize>,
        rng: StdRng,
    ) -> Self {
        let targets = Targets::Classes { encoded, n_classes: labels.len() };
        let grown = Grower::new(x, targets, params, rng).grow(indices);
        debug!(
            "decision tree classifier: depth {}, {} classes, {} features",
            grown.root.depth(),
            labels.len(),
            x.ncols()
        );
        DecisionTreeClassifier {
            root: grown.root,
            labels,
            n_features: x.ncols(),
            importances: grown.importances,
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_sizes().len()
    }

    /// Training-sample count of every leaf, left to right.
    pub fn leaf_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        self.root.leaf_sizes(&mut sizes);
        sizes
    }

    /// Gain-weighted importances summing to 1, or `None` if the tree never split.
    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    /// Feature and threshold of the root split, if any.
    pub fn root_split(&self) -> Option<(usize, T)> {
        match &self.root {
            Node::Split { feature, threshold, .. } => Some((*feature, *threshold)),
            Node::Leaf(_) => None,
        }
    }

    /// Leaf class distribution as `f64`, aligned to `classes()`.
    pub(crate) fn distribution(&self, sample: &[T]) -> &[f64] {
        &self.root.leaf_for(sample).distribution
    }
}

impl<T: Float> Predict<T> for DecisionTreeClassifier<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        check_n_features(sample.len(), self.n_features)?;
        let leaf = self.root.leaf_for(sample);
        Ok(self.labels.label(leaf.value.to_f64() as usize))
    }
}

impl<T: Float> Classifier<T> for DecisionTreeClassifier<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        check_n_features(sample.len(), self.n_features)?;
        Ok(self.distribution(sample).iter().map(|&p| T::from_f64(p)).collect())
    }
}

/// CART regression tree; leaves predict the mean of their training targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct DecisionTreeRegressor<T: Float> {
    root: Node<T>,
    n_features: usize,
    importances: Option<Vec<f64>>,
}

impl<T: Float> DecisionTreeRegressor<T> {
    pub(crate) fn grow(params: &TreeParams, x: &Tensor<T>, targets: &[T], indices: Vec<usize>, rng: StdRng) -> Self {
        let grown = Grower::new(x, Targets::Values(targets), params, rng).grow(indices);
        debug!("decision tree regressor: depth {}, {} features", grown.root.depth(), x.ncols());
        DecisionTreeRegressor { root: grown.root, n_features: x.ncols(), importances: grown.importances }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_sizes().len()
    }

    pub fn leaf_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        self.root.leaf_sizes(&mut sizes);
        sizes
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    /// Leaf value without the feature-count check, for ensembles that
    /// already validated the sample.
    pub(crate) fn value(&self, sample: &[T]) -> T {
        self.root.leaf_for(sample).value
    }
}

impl<T: Float> Predict<T> for DecisionTreeRegressor<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        check_n_features(sample.len(), self.n_features)?;
        Ok(self.value(sample))
    }
}

impl<T: Float> Regressor<T> for DecisionTreeRegressor<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Criterion;
    use approx::assert_abs_diff_eq;
    use oxiclassic_core::MlError;
    use oxiclassic_datasets::{load_iris, make_linear};

    fn four_points() -> (Tensor<f64>, Tensor<f64>) {
        let x = Tensor::from_vec2d(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        (x, Tensor::from_slice(&[0.0, 0.0, 1.0, 1.0]))
    }

    #[test]
    fn test_stump_splits_at_midpoint() {
        let (x, y) = four_points();
        let tree = TreeParams::classification().with_max_depth(1).fit_classifier(&x, &y).unwrap();
        let (feature, threshold) = tree.root_split().unwrap();
        assert_eq!(feature, 0);
        assert_abs_diff_eq!(threshold, 1.5);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_abs_diff_eq!(tree.score(&x, &y).unwrap(), 1.0);
    }

    #[test]
    fn test_entropy_criterion_fits_iris() {
        let (x, y) = load_iris();
        let tree = TreeParams::classification()
            .with_criterion(Criterion::Entropy)
            .fit_classifier(&x, &y)
            .unwrap();
        assert_abs_diff_eq!(tree.score(&x, &y).unwrap(), 1.0);
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.shape_vec(), vec![x.nrows(), 3]);
        for row in proba.rows() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_leaf_sizes_and_depth_respect_limits() {
        let (x, y) = load_iris();
        for (max_depth, min_leaf) in [(1, 1), (2, 3), (3, 5), (6, 2)] {
            let tree = TreeParams::classification()
                .with_max_depth(max_depth)
                .with_min_samples_leaf(min_leaf)
                .fit_classifier(&x, &y)
                .unwrap();
            assert!(tree.depth() <= max_depth);
            assert!(tree.leaf_sizes().iter().all(|&s| s >= min_leaf), "{:?}", tree.leaf_sizes());
            assert_eq!(tree.leaf_sizes().iter().sum::<usize>(), x.nrows());
        }
    }

    #[test]
    fn test_labels_are_preserved() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0], vec![5.0], vec![6.0]]).unwrap();
        let y = Tensor::from_slice(&[-3.0, -3.0, 7.0, 7.0]);
        let tree = TreeParams::classification().fit_classifier(&x, &y).unwrap();
        assert_eq!(tree.classes(), &[-3.0, 7.0]);
        assert_eq!(tree.predict_one(&[5.5]).unwrap(), 7.0);
    }

    #[test]
    fn test_regressor_piecewise_constant() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[
            vec![0.0], vec![1.0], vec![2.0], vec![10.0], vec![11.0], vec![12.0],
        ]).unwrap();
        let y = Tensor::from_slice(&[1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);
        let tree = TreeParams::regression().fit_regressor(&x, &y).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        assert_abs_diff_eq!(tree.predict_one(&[3.0]).unwrap(), 1.0);
        assert_abs_diff_eq!(tree.predict_one(&[9.0]).unwrap(), 5.0);
        assert_eq!(tree.feature_importances(), Some(&[1.0][..]));
    }

    #[test]
    fn test_regressor_absolute_error_fits_linear_data() {
        let (x, y) = make_linear(80, &[2.0, -1.0], 0.5, 0.0, Some(3));
        let tree = TreeParams::regression()
            .with_criterion(Criterion::AbsoluteError)
            .with_max_depth(6)
            .fit_regressor(&x, &y)
            .unwrap();
        assert!(tree.score(&x, &y).unwrap() > 0.9);
        let imp = tree.feature_importances().unwrap();
        assert_abs_diff_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_max_features_subset_is_deterministic() {
        let (x, y) = load_iris();
        let params = TreeParams::classification()
            .with_max_features(crate::params::MaxFeatures::Count(1))
            .with_seed(Some(9));
        let a = params.fit_classifier(&x, &y).unwrap();
        let b = params.fit_classifier(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.leaf_sizes(), b.leaf_sizes());
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let (x, _) = four_points();
        let short = Tensor::from_slice(&[0.0, 1.0]);
        assert!(matches!(
            TreeParams::classification().fit_classifier(&x, &short),
            Err(MlError::LengthMismatch { .. })
        ));
        let fractional = Tensor::from_slice(&[0.0, 0.5, 1.0, 1.0]);
        assert!(matches!(
            TreeParams::classification().fit_classifier(&x, &fractional),
            Err(MlError::InvalidLabel(_))
        ));
        assert!(TreeParams::classification().fit_regressor(&x, &short).is_err());
    }

    #[test]
    fn test_predict_checks_feature_count() {
        let (x, y) = four_points();
        let tree = TreeParams::classification().fit_classifier(&x, &y).unwrap();
        assert!(tree.predict_one(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_trained_tree_serializes() {
        let (x, y) = four_points();
        let tree = TreeParams::classification().fit_classifier(&x, &y).unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        let back: DecisionTreeClassifier<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict(&x).unwrap(), tree.predict(&x).unwrap());
    }
}
