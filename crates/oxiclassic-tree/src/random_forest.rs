use log::{debug, warn};
use oxiclassic_core::rng::{child_seeds, seeded};
use oxiclassic_core::scoring::r2_score;
use oxiclassic_core::traits::argmax;
use oxiclassic_core::validate::{check_n_features, check_xy};
use oxiclassic_core::{ClassLabels, Classifier, Float, MlError, MlResult, Predict, Regressor, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::criterion::Criterion;
use crate::decision_tree::{DecisionTreeClassifier, DecisionTreeRegressor};
use crate::params::{MaxFeatures, TreeParams};

/// Bagging configuration for [`RandomForestClassifier`] and [`RandomForestRegressor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Per-tree growth controls; `tree.seed` is ignored in favour of
    /// per-tree seeds drawn from `seed`.
    pub tree: TreeParams,
    pub bootstrap: bool,
    pub oob_score: bool,
    /// Train trees on the rayon pool. Results do not depend on this flag.
    pub parallel: bool,
    pub seed: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams::classification()
    }
}

impl ForestParams {
    /// 100 Gini trees, `sqrt(p)` features per split.
    pub fn classification() -> Self {
        ForestParams {
            n_estimators: 100,
            tree: TreeParams::classification().with_max_features(MaxFeatures::Sqrt),
            bootstrap: true,
            oob_score: false,
            parallel: true,
            seed: Some(42),
        }
    }

    /// 100 squared-error trees over all features.
    pub fn regression() -> Self {
        ForestParams { tree: TreeParams::regression(), ..ForestParams::classification() }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.tree.max_depth = Some(max_depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.tree.min_samples_leaf = n;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.tree.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.tree.criterion = criterion;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self, classification: bool) -> MlResult<()> {
        if self.n_estimators == 0 {
            return Err(MlError::InvalidParameter("n_estimators must be at least 1".into()));
        }
        if self.oob_score && !self.bootstrap {
            return Err(MlError::InvalidParameter(
                "out-of-bag scoring requires bootstrap sampling".into(),
            ));
        }
        self.tree.validate(classification)
    }

    /// Fit every tree on its own sample, returning each tree with its
    /// in-bag mask. Per-tree seeds are drawn up front so the result is the
    /// same with or without rayon.
    fn train<M, F>(&self, n_samples: usize, fit_one: F) -> Vec<(M, Vec<bool>)>
    where
        M: Send,
        F: Fn(Vec<usize>, StdRng) -> M + Sync,
    {
        let seeds = child_seeds(&mut seeded(self.seed), self.n_estimators);
        let job = |&seed: &u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let (indices, in_bag) = draw_sample(&mut rng, n_samples, self.bootstrap);
            (fit_one(indices, rng), in_bag)
        };
        if self.parallel {
            seeds.par_iter().map(job).collect()
        } else {
            seeds.iter().map(job).collect()
        }
    }

    pub fn fit_classifier<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<RandomForestClassifier<T>> {
        self.validate(true)?;
        let (n, p) = check_xy(x, y)?;
        let (labels, encoded) = ClassLabels::fit(y)?;
        let n_classes = labels.len();

        let fitted = self.train(n, |indices, rng| {
            DecisionTreeClassifier::grow(&self.tree, x, &encoded, labels.clone(), indices, rng)
        });

        let oob = if self.oob_score {
            let mut votes = vec![vec![0usize; n_classes]; n];
            for (tree, in_bag) in &fitted {
                for i in (0..n).filter(|&i| !in_bag[i]) {
                    votes[i][argmax(tree.distribution(x.row(i)?))] += 1;
                }
            }
            let evaluated: Vec<usize> = (0..n).filter(|&i| votes[i].iter().any(|&v| v > 0)).collect();
            let correct = evaluated
                .iter()
                .filter(|&&i| majority(&votes[i]) == encoded[i])
                .count();
            oob_summary("classifier", n, evaluated.len(), || correct as f64 / evaluated.len() as f64)
        } else {
            None
        };

        let importances = average_importances(fitted.iter().map(|(t, _)| t.feature_importances()), p);
        let trees: Vec<_> = fitted.into_iter().map(|(t, _)| t).collect();
        debug!(
            "random forest classifier: {} trees, mean depth {:.1}",
            trees.len(),
            trees.iter().map(|t| t.depth() as f64).sum::<f64>() / trees.len() as f64
        );
        Ok(RandomForestClassifier {
            trees,
            labels,
            n_features: p,
            oob_score: oob.map(|(score, _)| score),
            oob_samples: oob.map_or(0, |(_, count)| count),
            importances,
        })
    }

    pub fn fit_regressor<T: Float>(&self, x: &Tensor<T>, y: &Tensor<T>) -> MlResult<RandomForestRegressor<T>> {
        self.validate(false)?;
        let (n, p) = check_xy(x, y)?;
        let targets = y.data();

        let fitted = self.train(n, |indices, rng| DecisionTreeRegressor::grow(&self.tree, x, targets, indices, rng));

        let oob = if self.oob_score {
            let mut sums = vec![0.0f64; n];
            let mut counts = vec![0usize; n];
            for (tree, in_bag) in &fitted {
                for i in (0..n).filter(|&i| !in_bag[i]) {
                    sums[i] += tree.value(x.row(i)?).to_f64();
                    counts[i] += 1;
                }
            }
            let evaluated: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
            let truth: Vec<f64> = evaluated.iter().map(|&i| targets[i].to_f64()).collect();
            let preds: Vec<f64> = evaluated.iter().map(|&i| sums[i] / counts[i] as f64).collect();
            let score = if evaluated.is_empty() {
                0.0
            } else {
                r2_score(&Tensor::from_slice(&truth), &Tensor::from_slice(&preds))?
            };
            oob_summary("regressor", n, evaluated.len(), || score)
        } else {
            None
        };

        let importances = average_importances(fitted.iter().map(|(t, _)| t.feature_importances()), p);
        let trees: Vec<_> = fitted.into_iter().map(|(t, _)| t).collect();
        debug!("random forest regressor: {} trees", trees.len());
        Ok(RandomForestRegressor {
            trees,
            n_features: p,
            oob_score: oob.map(|(score, _)| score),
            oob_samples: oob.map_or(0, |(_, count)| count),
            importances,
        })
    }
}

/// Bootstrap (with replacement, size `n`) or the identity sample, plus the
/// in-bag mask.
fn draw_sample(rng: &mut StdRng, n: usize, bootstrap: bool) -> (Vec<usize>, Vec<bool>) {
    if !bootstrap {
        return ((0..n).collect(), vec![true; n]);
    }
    let mut in_bag = vec![false; n];
    let indices = (0..n)
        .map(|_| {
            let i = rng.gen_range(0..n);
            in_bag[i] = true;
            i
        })
        .collect();
    (indices, in_bag)
}

/// Most-voted class; ties go to the lowest class index.
fn majority(votes: &[usize]) -> usize {
    let mut best = 0;
    for (c, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = c;
        }
    }
    best
}

fn oob_summary(kind: &str, n: usize, evaluated: usize, score: impl FnOnce() -> f64) -> Option<(f64, usize)> {
    if evaluated == 0 {
        warn!("random forest {}: no sample was left out of every bootstrap, OOB score unavailable", kind);
        return None;
    }
    let score = score();
    debug!("random forest {}: OOB score {:.4} over {}/{} samples", kind, score, evaluated, n);
    Some((score, evaluated))
}

/// Mean of the per-tree importance vectors that exist, renormalised.
pub(crate) fn average_importances<'a>(per_tree: impl Iterator<Item = Option<&'a [f64]>>, n_features: usize) -> Option<Vec<f64>> {
    let mut total = vec![0.0f64; n_features];
    let mut defined = 0usize;
    for imp in per_tree.flatten() {
        for (t, v) in total.iter_mut().zip(imp) {
            *t += v;
        }
        defined += 1;
    }
    let sum: f64 = total.iter().sum();
    if defined == 0 || sum <= 0.0 {
        return None;
    }
    Some(total.into_iter().map(|v| v / sum).collect())
}

/// Bagged ensemble of classification trees; predicts the mean of the
/// trees' class distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct RandomForestClassifier<T: Float> {
    trees: Vec<DecisionTreeClassifier<T>>,
    labels: ClassLabels<T>,
    n_features: usize,
    oob_score: Option<f64>,
    oob_samples: usize,
    importances: Option<Vec<f64>>,
}

impl<T: Float> RandomForestClassifier<T> {
    pub fn trees(&self) -> &[DecisionTreeClassifier<T>] {
        &self.trees
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Majority-vote accuracy over samples left out of at least one bootstrap.
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }

    /// Number of samples that contributed to [`Self::oob_score`].
    pub fn oob_samples(&self) -> usize {
        self.oob_samples
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

impl<T: Float> Predict<T> for RandomForestClassifier<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        let proba = self.predict_proba_one(sample)?;
        Ok(self.labels.label(argmax(&proba)))
    }
}

impl<T: Float> Classifier<T> for RandomForestClassifier<T> {
    fn classes(&self) -> &[T] {
        self.labels.classes()
    }

    fn predict_proba_one(&self, sample: &[T]) -> MlResult<Vec<T>> {
        check_n_features(sample.len(), self.n_features)?;
        let mut mean = vec![0.0f64; self.labels.len()];
        for tree in &self.trees {
            for (m, p) in mean.iter_mut().zip(tree.distribution(sample)) {
                *m += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(mean.into_iter().map(|m| T::from_f64(m / n_trees)).collect())
    }
}

/// Bagged ensemble of regression trees; predicts the mean tree output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct RandomForestRegressor<T: Float> {
    trees: Vec<DecisionTreeRegressor<T>>,
    n_features: usize,
    oob_score: Option<f64>,
    oob_samples: usize,
    importances: Option<Vec<f64>>,
}

impl<T: Float> RandomForestRegressor<T> {
    pub fn trees(&self) -> &[DecisionTreeRegressor<T>] {
        &self.trees
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// R² of the averaged out-of-bag predictions.
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }

    pub fn oob_samples(&self) -> usize {
        self.oob_samples
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

impl<T: Float> Predict<T> for RandomForestRegressor<T> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, sample: &[T]) -> MlResult<T> {
        check_n_features(sample.len(), self.n_features)?;
        let sum: f64 = self.trees.iter().map(|t| t.value(sample).to_f64()).sum();
        Ok(T::from_f64(sum / self.trees.len() as f64))
    }
}

impl<T: Float> Regressor<T> for RandomForestRegressor<T> {}
