//! # OxiClassic
//!
//! Classic machine learning in pure Rust.
//!
//! ## Modules
//!
//! - **core** - `Tensor`, the `Float` element trait, errors, model traits, distance metrics
//! - **linalg** - Gaussian elimination with partial pivoting
//! - **metrics** - accuracy, confusion matrix, MSE/MAE/R², silhouette, inertia
//! - **datasets** - Iris excerpt, Gaussian blobs, noisy linear targets
//! - **tree** - CART decision trees, random forests with out-of-bag scoring, gradient boosting
//! - **neighbors** - KD-tree and k-nearest-neighbor classifier/regressor
//! - **svm** - kernels, SMO-trained SVC, epsilon-insensitive SVR
//! - **cluster** - K-Means (k-means++), mini-batch K-Means, DBSCAN
//! - **linear** - OLS/Ridge/Lasso/ElasticNet and logistic regression
//!
//! Every estimator follows the same shape: a `*Params` value holds the
//! hyper-parameters and `fit` returns an immutable trained model.
//!
//! ```no_run
//! use oxiclassic::prelude::*;
//!
//! let (x, y) = oxiclassic::datasets::load_iris();
//! let forest = ForestParams::classification().with_oob_score(true).fit_classifier(&x, &y)?;
//! println!("oob accuracy: {:?}", forest.oob_score());
//! # Ok::<(), MlError>(())
//! ```

/// Tensor, element trait, errors and model traits.
pub use oxiclassic_core as core;

/// Linear system solver.
pub use oxiclassic_linalg as linalg;

/// Evaluation metrics.
pub use oxiclassic_metrics as metrics;

/// Built-in datasets and generators.
pub use oxiclassic_datasets as datasets;

/// Decision trees and tree ensembles.
pub use oxiclassic_tree as tree;

/// Spatial index and nearest-neighbor models.
pub use oxiclassic_neighbors as neighbors;

/// Support vector machines.
pub use oxiclassic_svm as svm;

/// Clustering.
pub use oxiclassic_cluster as cluster;

/// Linear models.
pub use oxiclassic_linear as linear;

pub mod prelude {
    pub use oxiclassic_core::{Classifier, Float, Metric, MlError, MlResult, Predict, Regressor, Tensor};

    pub use oxiclassic_cluster::{Dbscan, DbscanParams, KMeans, KMeansInit, KMeansParams, MiniBatchKMeans, MiniBatchParams};
    pub use oxiclassic_linear::{
        GradientDescent, LinearRegression, LinearRegressionParams, LogisticRegression, LogisticRegressionParams,
        Penalty, Solver,
    };
    pub use oxiclassic_neighbors::{Algorithm, KNeighborsClassifier, KNeighborsRegressor, KdTree, KnnParams, Weights};
    pub use oxiclassic_svm::{Kernel, Svc, SvcParams, Svr, SvrParams};
    pub use oxiclassic_tree::{
        BoostingParams, Criterion, DecisionTreeClassifier, DecisionTreeRegressor, ForestParams,
        GradientBoostingClassifier, GradientBoostingRegressor, MaxFeatures, RandomForestClassifier,
        RandomForestRegressor, TreeParams,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use super::{datasets, metrics};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn assert_classifier<C: Classifier<f64>>(model: &C, x: &Tensor<f64>, y: &Tensor<f64>, min_accuracy: f64) {
        let score = model.score(x, y).unwrap();
        assert!(score >= min_accuracy, "accuracy {} below {}", score, min_accuracy);
        let proba = model.predict_proba(x).unwrap();
        assert_eq!(proba.shape_vec(), vec![x.nrows(), model.classes().len()]);
    }

    #[test]
    fn test_every_classifier_fits_iris() {
        init();
        let (x, y) = datasets::load_iris();
        assert_classifier(&TreeParams::classification().fit_classifier(&x, &y).unwrap(), &x, &y, 1.0);
        assert_classifier(
            &ForestParams::classification().with_n_estimators(25).fit_classifier(&x, &y).unwrap(),
            &x,
            &y,
            0.95,
        );
        assert_classifier(
            &BoostingParams::default().with_n_estimators(20).fit_classifier(&x, &y).unwrap(),
            &x,
            &y,
            0.95,
        );
        assert_classifier(&KnnParams::default().with_k(3).fit_classifier(&x, &y).unwrap(), &x, &y, 0.9);
        assert_classifier(&SvcParams::default().fit(&x, &y).unwrap(), &x, &y, 0.9);
    }

    #[test]
    fn test_regressors_share_r2_scoring() {
        init();
        let (x, y) = datasets::make_linear(80, &[1.0, -1.0], 0.5, 0.05, Some(11));
        let linear = LinearRegressionParams::default().fit(&x, &y).unwrap();
        let knn = KnnParams::default().fit_regressor(&x, &y).unwrap();
        let boosted = BoostingParams::default().fit_regressor(&x, &y).unwrap();
        for score in [linear.score(&x, &y), knn.score(&x, &y), boosted.score(&x, &y)] {
            assert!(score.unwrap() > 0.8);
        }
        let mse = metrics::mse(&y, &linear.predict(&x).unwrap()).unwrap();
        assert!(mse < 0.01);
    }

    #[test]
    fn test_clusterers_find_separated_blobs() {
        init();
        let (x, _) = datasets::make_blobs(&[vec![0.0, 0.0], vec![8.0, 8.0]], 30, 0.4, Some(5));
        let kmeans = KMeansParams::new(2).fit(&x).unwrap();
        let labels = kmeans.labels().to_vec();
        assert!(metrics::silhouette_score(&x, &labels).unwrap() > 0.8);

        let dbscan = DbscanParams::new(1.5, 4).fit(&x).unwrap();
        assert_eq!(dbscan.n_clusters(), 2);
    }
}
