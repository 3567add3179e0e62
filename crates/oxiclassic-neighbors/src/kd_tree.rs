//! Balanced K-D tree for exact k-nearest-neighbor queries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;
use oxiclassic_core::validate::{check_matrix, check_n_features};
use oxiclassic_core::{Float, Metric, MlError, MlResult, Tensor};
use serde::{Deserialize, Serialize};

/// One result of a nearest-neighbor query: a training row and its distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    // distance first, index as the tie-breaker
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdNode {
    /// Row of the stored training point.
    index: usize,
    axis: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct KdTree<T: Float> {
    points: Tensor<T>,
    metric: Metric,
    root: Option<Box<KdNode>>,
}

impl<T: Float> KdTree<T> {
    /// Build over the rows of `points`, splitting on `depth % n_features`
    /// at the median. The metric must admit per-axis pruning.
    pub fn build(points: &Tensor<T>, metric: Metric) -> MlResult<Self> {
        check_matrix(points)?;
        metric.validate()?;
        if !metric.supports_kd_tree() {
            return Err(MlError::InvalidParameter(format!(
                "{:?} distance cannot be indexed by a K-D tree",
                metric
            )));
        }
        let mut indices: Vec<usize> = (0..points.nrows()).collect();
        let root = Self::build_node(points, &mut indices, 0);
        let tree = KdTree { points: points.clone(), metric, root };
        debug!("k-d tree: {} points, depth {}", tree.len(), tree.depth());
        Ok(tree)
    }

    fn build_node(points: &Tensor<T>, indices: &mut [usize], depth: usize) -> Option<Box<KdNode>> {
        if indices.is_empty() {
            return None;
        }
        let p = points.ncols();
        let axis = depth % p;
        let data = points.data();
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            data[a * p + axis].total_cmp(&data[b * p + axis]).then(a.cmp(&b))
        });
        let index = indices[mid];
        let (left, rest) = indices.split_at_mut(mid);
        Some(Box::new(KdNode {
            index,
            axis,
            left: Self::build_node(points, left, depth + 1),
            right: Self::build_node(points, &mut rest[1..], depth + 1),
        }))
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_features(&self) -> usize {
        self.points.ncols()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(node: &Option<Box<KdNode>>) -> usize {
            node.as_ref().map_or(0, |n| 1 + walk(&n.left).max(walk(&n.right)))
        }
        walk(&self.root)
    }

    /// The `k` nearest training rows to `query`, closest first.
    pub fn query(&self, query: &[T], k: usize) -> MlResult<Vec<Neighbor>> {
        check_n_features(query.len(), self.n_features())?;
        check_k(k, self.len())?;
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = &self.root {
            self.search(root, query, k, &mut heap);
        }
        Ok(heap.into_sorted_vec())
    }

    fn search(&self, node: &KdNode, query: &[T], k: usize, heap: &mut BinaryHeap<Neighbor>) {
        let p = self.n_features();
        let point = &self.points.data()[node.index * p..(node.index + 1) * p];
        let candidate = Neighbor { index: node.index, distance: self.metric.distance(query, point) };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let gap = (query[node.axis] - point[node.axis]).to_f64();
        let (near, far) = if gap <= 0.0 { (&node.left, &node.right) } else { (&node.right, &node.left) };
        if let Some(near) = near {
            self.search(near, query, k, heap);
        }
        if let Some(far) = far {
            let worst = heap.peek().map_or(f64::INFINITY, |w| w.distance);
            if heap.len() < k || gap.abs() <= worst {
                self.search(far, query, k, heap);
            }
        }
    }
}

pub(crate) fn check_k(k: usize, n_points: usize) -> MlResult<()> {
    if k == 0 {
        return Err(MlError::InvalidParameter("k must be at least 1".into()));
    }
    if k > n_points {
        return Err(MlError::InsufficientSamples { required: k, got: n_points });
    }
    Ok(())
}

/// Exhaustive k-nearest scan, closest first.
pub fn brute_force_kneighbors<T: Float>(
    points: &Tensor<T>,
    metric: Metric,
    query: &[T],
    k: usize,
) -> MlResult<Vec<Neighbor>> {
    check_n_features(query.len(), points.ncols())?;
    check_k(k, points.nrows())?;
    let mut all: Vec<Neighbor> = points
        .rows()
        .enumerate()
        .map(|(index, row)| Neighbor { index, distance: metric.distance(query, row) })
        .collect();
    if k < all.len() {
        all.select_nth_unstable(k - 1);
        all.truncate(k);
    }
    all.sort_unstable();
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiclassic_datasets::make_uniform;
    use std::collections::HashSet;

    fn index_set(neighbors: &[Neighbor]) -> HashSet<usize> {
        neighbors.iter().map(|n| n.index).collect()
    }

    #[test]
    fn test_kd_tree_matches_brute_force() {
        let points = make_uniform(300, 3, Some(17));
        let queries = make_uniform(25, 3, Some(18));
        for metric in [Metric::Euclidean, Metric::Manhattan, Metric::Minkowski { p: 3.0 }] {
            let tree = KdTree::build(&points, metric).unwrap();
            for q in queries.rows() {
                for k in [1, 4, 10] {
                    let fast = tree.query(q, k).unwrap();
                    let slow = brute_force_kneighbors(&points, metric, q, k).unwrap();
                    assert_eq!(index_set(&fast), index_set(&slow), "metric {:?}, k {}", metric, k);
                }
            }
        }
    }

    #[test]
    fn test_query_sorted_and_exact_hit() {
        let points = make_uniform(50, 2, Some(1));
        let tree = KdTree::build(&points, Metric::Euclidean).unwrap();
        let q = points.row(7).unwrap().to_vec();
        let res = tree.query(&q, 5).unwrap();
        assert_eq!(res[0].index, 7);
        assert_eq!(res[0].distance, 0.0);
        assert!(res.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_tree_is_balanced() {
        let points = make_uniform(127, 2, Some(2));
        let tree = KdTree::build(&points, Metric::Euclidean).unwrap();
        assert_eq!(tree.len(), 127);
        assert_eq!(tree.depth(), 7);
    }

    #[test]
    fn test_build_rejects_cosine() {
        let points = make_uniform(10, 2, Some(3));
        assert!(matches!(
            KdTree::build(&points, Metric::Cosine),
            Err(MlError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_query_validates_k_and_width() {
        let points = make_uniform(5, 2, Some(4));
        let tree = KdTree::build(&points, Metric::Euclidean).unwrap();
        assert!(tree.query(&[0.5, 0.5], 0).is_err());
        assert!(matches!(
            tree.query(&[0.5, 0.5], 6),
            Err(MlError::InsufficientSamples { required: 6, got: 5 })
        ));
        assert!(tree.query(&[0.5], 1).is_err());
    }
}
