//! Recursive CART growth over index subsets.
//!
//! Subsets are contiguous slices of one index buffer that is partitioned in
//! place at every split, so bootstrap duplicates are handled naturally.

use log::trace;
use oxiclassic_core::{Float, Tensor};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::criterion::{Criterion, MomentAccumulator};
use crate::params::TreeParams;

/// Impurity reductions at or below this are treated as no improvement.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub(crate) struct Leaf<T: Float> {
    /// Class index (classification) or subset mean (regression).
    pub value: T,
    /// Class proportions; empty for regression leaves.
    pub distribution: Vec<f64>,
    pub n_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub(crate) enum Node<T: Float> {
    Split {
        feature: usize,
        threshold: T,
        left: Box<Node<T>>,
        right: Box<Node<T>>,
    },
    Leaf(Leaf<T>),
}

impl<T: Float> Node<T> {
    /// Walk to the leaf reached by `sample` (`<=` goes left).
    pub fn leaf_for(&self, sample: &[T]) -> &Leaf<T> {
        let mut node = self;
        loop {
            match node {
                Node::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
                Node::Leaf(leaf) => return leaf,
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
            Node::Leaf(_) => 0,
        }
    }

    pub fn leaf_sizes(&self, out: &mut Vec<usize>) {
        match self {
            Node::Split { left, right, .. } => {
                left.leaf_sizes(out);
                right.leaf_sizes(out);
            }
            Node::Leaf(leaf) => out.push(leaf.n_samples),
        }
    }
}

/// What the tree is fitted against.
pub(crate) enum Targets<'a, T> {
    Classes { encoded: &'a [usize], n_classes: usize },
    Values(&'a [T]),
}

pub(crate) struct GrownTree<T: Float> {
    pub root: Node<T>,
    /// Normalised gain-weighted importances; `None` when the root is a leaf.
    pub importances: Option<Vec<f64>>,
}

struct BestSplit<T> {
    feature: usize,
    threshold: T,
    gain: f64,
}

pub(crate) struct Grower<'a, T: Float> {
    data: &'a [T],
    n_features: usize,
    targets: Targets<'a, T>,
    params: &'a TreeParams,
    max_features: usize,
    rng: StdRng,
    importances: Vec<f64>,
    sorted: Vec<(T, usize)>,
}

impl<'a, T: Float> Grower<'a, T> {
    pub fn new(x: &'a Tensor<T>, targets: Targets<'a, T>, params: &'a TreeParams, rng: StdRng) -> Self {
        let n_features = x.ncols();
        Grower {
            data: x.data(),
            n_features,
            targets,
            params,
            max_features: params.max_features.resolve(n_features),
            rng,
            importances: vec![0.0; n_features],
            sorted: Vec::new(),
        }
    }

    pub fn grow(mut self, mut indices: Vec<usize>) -> GrownTree<T> {
        let root = self.build(&mut indices, 0);
        let total: f64 = self.importances.iter().sum();
        let importances = if total > 0.0 {
            Some(self.importances.iter().map(|v| v / total).collect())
        } else {
            None
        };
        GrownTree { root, importances }
    }

    #[inline]
    fn value(&self, sample: usize, feature: usize) -> T {
        self.data[sample * self.n_features + feature]
    }

    fn build(&mut self, indices: &mut [usize], depth: usize) -> Node<T> {
        let n = indices.len();
        let params = self.params;
        let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || n < params.min_samples_split
            || n < 2 * params.min_samples_leaf
            || self.is_pure(indices)
        {
            return Node::Leaf(self.make_leaf(indices));
        }

        let parent = self.impurity(indices);
        let Some(split) = self.best_split(indices, parent) else {
            return Node::Leaf(self.make_leaf(indices));
        };
        trace!(
            "depth {}: split feature {} at {} (gain {:.6}, n = {})",
            depth,
            split.feature,
            split.threshold,
            split.gain,
            n
        );

        let (data, p) = (self.data, self.n_features);
        let mid = partition(indices, |i| data[i * p + split.feature] <= split.threshold);
        if mid == 0 || mid == n {
            return Node::Leaf(self.make_leaf(indices));
        }
        self.importances[split.feature] += split.gain * n as f64;
        let (left, right) = indices.split_at_mut(mid);
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        match &self.targets {
            Targets::Classes { encoded, .. } => {
                let first = encoded[indices[0]];
                indices.iter().all(|&i| encoded[i] == first)
            }
            Targets::Values(values) => {
                let first = values[indices[0]];
                indices.iter().all(|&i| values[i] == first)
            }
        }
    }

    fn class_counts(encoded: &[usize], n_classes: usize, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; n_classes];
        for &i in indices {
            counts[encoded[i]] += 1;
        }
        counts
    }

    fn impurity(&self, indices: &[usize]) -> f64 {
        match &self.targets {
            Targets::Classes { encoded, n_classes } => {
                let counts = Self::class_counts(encoded, *n_classes, indices);
                self.params.criterion.class_impurity(&counts, indices.len())
            }
            Targets::Values(values) => self
                .params
                .criterion
                .value_impurity(indices.iter().map(|&i| values[i].to_f64())),
        }
    }

    fn make_leaf(&self, indices: &[usize]) -> Leaf<T> {
        let n = indices.len();
        match &self.targets {
            Targets::Classes { encoded, n_classes } => {
                let counts = Self::class_counts(encoded, *n_classes, indices);
                let mut majority = 0;
                for (c, &count) in counts.iter().enumerate() {
                    if count > counts[majority] {
                        majority = c;
                    }
                }
                Leaf {
                    value: T::from_usize(majority),
                    distribution: counts.iter().map(|&c| c as f64 / n as f64).collect(),
                    n_samples: n,
                }
            }
            Targets::Values(values) => {
                let sum: f64 = indices.iter().map(|&i| values[i].to_f64()).sum();
                Leaf { value: T::from_f64(sum / n as f64), distribution: Vec::new(), n_samples: n }
            }
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        if self.max_features >= self.n_features {
            return (0..self.n_features).collect();
        }
        let mut features = index::sample(&mut self.rng, self.n_features, self.max_features).into_vec();
        features.sort_unstable();
        features
    }

    fn best_split(&mut self, indices: &[usize], parent: f64) -> Option<BestSplit<T>> {
        let mut sorted = std::mem::take(&mut self.sorted);
        let mut best: Option<BestSplit<T>> = None;
        for feature in self.candidate_features() {
            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (self.value(i, feature), i)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            if let Some((threshold, gain)) = self.sweep(&sorted, parent) {
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature, threshold, gain });
                }
            }
        }
        self.sorted = sorted;
        best
    }

    /// Scan every boundary between distinct sorted values of one feature and
    /// return the best `(threshold, gain)`.
    fn sweep(&self, sorted: &[(T, usize)], parent: f64) -> Option<(T, f64)> {
        let n = sorted.len();
        let nf = n as f64;
        let min_leaf = self.params.min_samples_leaf;
        let criterion = self.params.criterion;
        let mut best: Option<(T, f64)> = None;
        let mut consider = |threshold: T, weighted: f64| {
            let gain = parent - weighted;
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((threshold, gain));
            }
        };

        match &self.targets {
            Targets::Classes { encoded, n_classes } => {
                let mut left = vec![0usize; *n_classes];
                let mut right = vec![0usize; *n_classes];
                for &(_, i) in sorted {
                    right[encoded[i]] += 1;
                }
                for pos in 0..n - 1 {
                    let c = encoded[sorted[pos].1];
                    left[c] += 1;
                    right[c] -= 1;
                    if let Some(threshold) = boundary(sorted, pos, min_leaf) {
                        let n_left = pos + 1;
                        let n_right = n - n_left;
                        let weighted = (n_left as f64 * criterion.class_impurity(&left, n_left)
                            + n_right as f64 * criterion.class_impurity(&right, n_right))
                            / nf;
                        consider(threshold, weighted);
                    }
                }
            }
            Targets::Values(values) if criterion == Criterion::SquaredError => {
                let mut total = MomentAccumulator::default();
                for &(_, i) in sorted {
                    total.push(values[i].to_f64());
                }
                let mut left = MomentAccumulator::default();
                for pos in 0..n - 1 {
                    left.push(values[sorted[pos].1].to_f64());
                    if let Some(threshold) = boundary(sorted, pos, min_leaf) {
                        let right = total.minus(&left);
                        let weighted = (left.count as f64 * left.variance()
                            + right.count as f64 * right.variance())
                            / nf;
                        consider(threshold, weighted);
                    }
                }
            }
            Targets::Values(values) => {
                let side = |part: &[(T, usize)]| {
                    criterion.value_impurity(part.iter().map(|&(_, i)| values[i].to_f64()))
                };
                for pos in 0..n - 1 {
                    if let Some(threshold) = boundary(sorted, pos, min_leaf) {
                        let (l, r) = sorted.split_at(pos + 1);
                        let weighted = (l.len() as f64 * side(l) + r.len() as f64 * side(r)) / nf;
                        consider(threshold, weighted);
                    }
                }
            }
        }
        best
    }
}

/// Threshold between `sorted[pos]` and `sorted[pos + 1]`, or `None` when the
/// two values are equal or either side would hold fewer than `min_leaf`.
fn boundary<T: Float>(sorted: &[(T, usize)], pos: usize, min_leaf: usize) -> Option<T> {
    let n_left = pos + 1;
    if n_left < min_leaf || sorted.len() - n_left < min_leaf {
        return None;
    }
    let (lo, hi) = (sorted[pos].0, sorted[pos + 1].0);
    if lo >= hi {
        return None;
    }
    // Halve first so values near the float range cannot overflow.
    let mid = lo * T::HALF + hi * T::HALF;
    // Adjacent floats can round the midpoint up onto `hi`.
    Some(if mid < hi { mid } else { lo })
}

/// Move every index satisfying `goes_left` to the front; returns the count.
fn partition(indices: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for k in 0..indices.len() {
        if goes_left(indices[k]) {
            indices.swap(mid, k);
            mid += 1;
        }
    }
    mid
}
