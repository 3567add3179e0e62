use log::{debug, trace};
use oxiclassic_core::rng::seeded;
use oxiclassic_core::traits::{argmax, softmax};
use oxiclassic_core::validate::{check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, MlError, MlResult, Predict, Regressor, Tensor};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::decision_tree::DecisionTreeRegressor;
use crate::params::TreeParams;
use crate::random_forest::average_importances;

/// Configuration shared by [`GradientBoostingClassifier`] and
/// [`GradientBoostingRegressor`]. Every round fits shallow squared-error
/// regression trees to the current residuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each round.
    pub subsample: f64,
    pub seed: Option<u64>,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: Some(42),
        }
    }
}

impl BoostingParams {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n;
        self
    }

    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> MlResult<()> {
        if self.n_estimators == 0 {
            return Err(MlError::InvalidParameter("n_estimators must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MlError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(MlError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        self.tree_params().validate(false)
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            ..TreeParams::regression()
        }
    }

    /// Row subset for one round plus the RNG handed to that round's trees.
    fn round_sample(&self, rng: &mut StdRng, n: usize) -> (Vec<usize>, StdRng) {
        let indices = if self.subsample < 1.0 {
            let m = ((self.subsample * n as f64).round() as usize).clamp(1, n);
            index::sample(rng, n, m).into_vec()
        } else {
            (0..n).collect()
        };
        (indices, StdRng::seed_from_u64(rng.gen()))
    }

    /// Multi-class boosting on the softmax cross-entropy: one tree per class
    /// per round, each fitted to `indicator - probability`.
    pub fn fit_classifier<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<GradientBoostingClassifier<T>> {
        self.validate()?;
        let (n, p) = check_xy(x, y)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        let k = labels.len();
        let tree_params = self.tree_params();
        let mut rng = seeded(self.seed);

        let mut counts = vec![0usize; k];
        for &c in &encoded {
            counts[c] += 1;
        }
        let init_scores: Vec<f64> = counts.iter().map(|&c| (c as f64 / n as f64).ln()).collect();
        let mut scores = vec![init_scores.clone(); n];
        let mut rounds: Vec<Vec<DecisionTreeRegressor<T>>> = Vec::with_capacity(self.n_estimators);
        let mut train_loss = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
            let (indices, mut tree_rng) = self.round_sample(&mut rng, n);
            let mut trees = Vec::with_capacity(k);
            for class in 0..k {
                let residuals: Vec<T> = (0..n)
                    .map(|i| {
                        let indicator = if encoded[i] == class { 1.0 } else { 0.0 };
                        T::from_f64(indicator - probs[i][class])
                    })
                    .collect();
                let tree_seed = StdRng::seed_from_u64(tree_rng.gen());
                let tree = DecisionTreeRegressor::grow(&tree_params, x, &residuals, indices.clone(), tree_seed);
                for (i, row) in x.rows().enumerate() {
                    scores[i][class] += self.learning_rate * tree.value(row).to_f64();
                }
                trees.push(tree);
            }
            rounds.push(trees);

            let loss = scores
                .iter()
                .zip(&encoded)
                .map(|(s, &c)| -softmax(s)[c].max(1e-15).ln())
                .sum::<f64>()
                / n as f64;
            trace!("boosting round {}: cross-entropy {:.6}", round, loss);
            train_loss.push(loss);
        }

        debug!(
            "gradient boosting classifier: {} rounds x {} classes, final loss {:.6}",
            rounds.len(),
            k,
            train_loss.last().copied().unwrap_or(f64::NAN)
        );
        let importances = average_importances(rounds.iter().flatten().map(|t| t.feature_importances()), p);
        Ok(GradientBoostingClassifier {
            labels,
            init_scores,
            rounds,
            learning_rate: self.learning_rate,
            n_features: p,
            train_loss,
            importances,
        })
    }

    /// Least-squares boosting starting from the target mean.
    pub fn fit_regressor<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<GradientBoostingRegressor<T>> {
        self.validate()?;
        let (n, p) = check_xy(x, y)?;
        let tree_params = self.tree_params();
        let mut rng = seeded(self.seed);
        let targets: Vec<f64> = y.data().iter().map(|v| v.to_f64()).collect();

        let init = targets.iter().sum::<f64>() / n as f64;
        let mut preds = vec![init; n];
        let mut trees = Vec::with_capacity(self.n_estimators);
        let mut train_loss = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let residuals: Vec<T> = targets.iter().zip(&preds).map(|(t, p)| T::from_f64(t - p)).collect();
            let (indices, tree_rng) = self.round_sample(&mut rng, n);
            let tree = DecisionTreeRegressor::grow(&tree_params, x, &residuals, indices, tree_rng);
            for (pred, row) in preds.iter_mut().zip(x.rows()) {
                *pred += self.learning_rate * tree.value(row).to_f64();
            }
            trees.push(tree);

            let mse = targets.iter().zip(&preds).map(|(t, p)| (t - p) * (t - p)).sum::<f64>() / n as f64;
            trace!("boosting round {}: mse {:.6}", round, mse);
            train_loss.push(mse);
        }

        debug!(
            "gradient boosting regressor: {} rounds, final mse {:.6}",
            trees.len(),
            train_loss.last().copied().unwrap_or(f64::NAN)
        );
        let importances = average_importances(trees.iter().map(|t| t.feature_importances()), p);
        Ok(GradientBoostingRegressor {
            init,
            trees,
            learning_rate: self.learning_rate,
            n_features: p,
            train_loss,
            importances,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct GradientBoostingClassifier<T: Float> {
    labels: ClassLabels<T>,
    init_scores: Vec<f64>,
    rounds: Vec<Vec<DecisionTreeRegressor<T>>>,
    learning_rate: f64,
    n_features: usize,
    train_loss: Vec<f64>,
    importances: Option<Vec<f64>>,
}

impl<T: Float> GradientBoostingClassifier<T> {
    /// Raw per-class scores (log-odds scale) before the softmax.
    pub fn decision_function_one(&self, sample: &[T]) -> MlResult<Vec<f64>> {
        check_n_features(sample.len(), self.n_features)?;
        let mut scores = self.init_scores.clone();
        for trees in &self.rounds {
            for (s, tree) in scores.iter_mut().zip(trees) {
                *s += self.learning_rate * tree.value(sample).to_f64();
            }
        }
        Ok(scores)
    }

    /// Log class priors the boosting started from.
    pub fn init_scores(&self) -> &[f64] {
        &self.init_scores
    }

    pub fn n_estimators(&self) -> usize {
        self.rounds.len()
    }

    /// Mean training cross-entropy after each round.
    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

impl<T: Float> Predict<T> for GradientBoostingClassifier<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let scores = self.decision_function_one(sample)?;
        Ok(self.labels.label(argmax(&scores)))
    }
}

impl<T: Float> Classifier<T> for GradientBoostingClassifier<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        let scores = self.decision_function_one(sample)?;
        Ok(softmax(&scores).into_iter().map(T::from_f64).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct GradientBoostingRegressor<T: Float> {
    init: f64,
    trees: Vec<DecisionTreeRegressor<T>>,
    learning_rate: f64,
    n_features: usize,
    train_loss: Vec<f64>,
    importances: Option<Vec<f64>>,
}

impl<T: Float> GradientBoostingRegressor<T> {
    /// Mean of the training targets.
    pub fn init_prediction(&self) -> f64 {
        self.init
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Training mean squared error after each round.
    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

impl<T: Float> Predict<T> for GradientBoostingRegressor<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        check_n_features(sample.len(), self.n_features)?;
        let boost: f64 = self.trees.iter().map(|t| t.value(sample).to_f64()).sum();
        Ok(T::from_f64(self.init + self.learning_rate * boost))
    }
}

impl<T: Float> Regressor<T> for GradientBoostingRegressor<T> {}
