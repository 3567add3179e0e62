use oxiclassic_core::{MlError, MlResult};
use serde::{Deserialize, Serialize};

use crate::criterion::Criterion;

/// How many features a node may consider when searching for a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Count(usize),
    /// Fraction of the feature count, in `(0, 1]`.
    Fraction(f64),
}

impl MaxFeatures {
    /// Concrete feature count for a matrix with `n_features` columns,
    /// clamped to `[1, n_features]`.
    pub fn resolve(&self, n_features: usize) -> usize {
        let p = n_features as f64;
        let k = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => p.sqrt().floor() as usize,
            MaxFeatures::Log2 => p.log2().floor() as usize,
            MaxFeatures::Count(k) => k,
            MaxFeatures::Fraction(f) => (f * p).floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }

    fn validate(&self) -> MlResult<()> {
        match *self {
            MaxFeatures::Count(0) => Err(MlError::InvalidParameter(
                "max_features count must be at least 1".into(),
            )),
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(MlError::InvalidParameter(
                format!("max_features fraction must be in (0, 1], got {}", f),
            )),
            _ => Ok(()),
        }
    }
}

/// Growth controls shared by the tree classifier and regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Deepest allowed leaf (root is depth 0); `None` grows until pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    pub max_features: MaxFeatures,
    pub seed: Option<u64>,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams::classification()
    }
}

impl TreeParams {
    /// Gini impurity, every feature at every node.
    pub fn classification() -> Self {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            max_features: MaxFeatures::All,
            seed: Some(42),
        }
    }

    /// Squared-error impurity, every feature at every node.
    pub fn regression() -> Self {
        TreeParams { criterion: Criterion::SquaredError, ..TreeParams::classification() }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n;
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self, classification: bool) -> MlResult<()> {
        if self.min_samples_split < 2 {
            return Err(MlError::InvalidParameter(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf < 1 {
            return Err(MlError::InvalidParameter("min_samples_leaf must be at least 1".into()));
        }
        if self.criterion.is_classification() != classification {
            return Err(MlError::InvalidParameter(format!(
                "criterion {:?} cannot be used for {}",
                self.criterion,
                if classification { "classification" } else { "regression" }
            )));
        }
        self.max_features.validate()
    }
}
