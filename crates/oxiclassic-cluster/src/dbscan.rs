use std::collections::VecDeque;

use log::debug;
use oxiclassic_core::validate::check_matrix;
use oxiclassic_core::{Float, Metric, MlError, MlResult, Tensor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    /// Neighborhood radius.
    pub eps: f64,
    /// Neighbors (the point itself included) needed for a core point.
    pub min_samples: usize,
    pub metric: Metric,
}

impl Default for DbscanParams {
    fn default() -> Self {
        DbscanParams { eps: 0.5, min_samples: 5, metric: Metric::Euclidean }
    }
}

impl DbscanParams {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        DbscanParams { eps, min_samples, ..DbscanParams::default() }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn fit<T: Float>(&self, x: &Tensor<T>) -> MlResult<Dbscan> {
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(MlError::InvalidParameter(format!("eps must be positive, got {}", self.eps)));
        }
        if self.min_samples == 0 {
            return Err(MlError::InvalidParameter("min_samples must be at least 1".into()));
        }
        self.metric.validate()?;
        let (n, _) = check_matrix(x)?;

        let rows: Vec<&[T]> = x.rows().collect();
        let neighborhoods: Vec<Vec<usize>> = (0..n)
            .map(|i| (0..n).filter(|&j| self.metric.distance(rows[i], rows[j]) <= self.eps).collect())
            .collect();
        let is_core: Vec<bool> = neighborhoods.iter().map(|nb| nb.len() >= self.min_samples).collect();

        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut n_clusters = 0;
        let mut queue = VecDeque::new();
        for seed in 0..n {
            if labels[seed].is_some() || !is_core[seed] {
                continue;
            }
            let cluster = n_clusters;
            n_clusters += 1;
            labels[seed] = Some(cluster);
            queue.push_back(seed);
            while let Some(point) = queue.pop_front() {
                // only core points extend the region
                if !is_core[point] {
                    continue;
                }
                for &nb in &neighborhoods[point] {
                    if labels[nb].is_none() {
                        labels[nb] = Some(cluster);
                        queue.push_back(nb);
                    }
                }
            }
        }

        let core_sample_indices: Vec<usize> = (0..n).filter(|&i| is_core[i]).collect();
        let model = Dbscan { labels, core_sample_indices, n_clusters };
        debug!(
            "dbscan: {} clusters, {} core points, {} noise points",
            model.n_clusters,
            model.core_sample_indices.len(),
            model.n_noise()
        );
        Ok(model)
    }
}

/// Density-based clustering result. Noise points have no label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dbscan {
    labels: Vec<Option<usize>>,
    core_sample_indices: Vec<usize>,
    n_clusters: usize,
}

impl Dbscan {
    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    pub fn core_sample_indices(&self) -> &[usize] {
        &self.core_sample_indices
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiclassic_datasets::make_blobs;

    #[test]
    fn test_two_dense_groups_and_an_outlier() {
        let (blobs, _) = make_blobs(&[vec![0.0, 0.0], vec![6.0, 6.0]], 25, 0.3, Some(5));
        let outlier: Tensor<f64> = Tensor::from_vec2d(&[vec![20.0, -20.0]]).unwrap();
        let x = Tensor::concatenate(&[&blobs, &outlier], 0).unwrap();
        let model = DbscanParams::new(1.0, 4).fit(&x).unwrap();
        assert_eq!(model.n_clusters(), 2);
        assert_eq!(model.n_noise(), 1);
        assert_eq!(model.labels()[50], None);
        assert!(model.labels()[..25].iter().all(|&l| l == model.labels()[0]));
        assert_ne!(model.labels()[0], model.labels()[25]);
    }

    #[test]
    fn test_border_point_joins_but_does_not_expand() {
        // 0, 1 and 2 are core; 3 is a border point of their cluster and
        // 4 lies within eps of no core point.
        let x: Tensor<f64> = Tensor::from_vec2d(&[
            vec![0.0], vec![0.5], vec![1.0], vec![1.9], vec![3.0],
        ]).unwrap();
        let model = DbscanParams::new(1.0, 3).fit(&x).unwrap();
        assert_eq!(model.core_sample_indices(), &[0, 1, 2]);
        assert_eq!(model.labels(), &[Some(0), Some(0), Some(0), Some(0), None]);
    }

    #[test]
    fn test_min_samples_one_makes_every_point_core() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![10.0], vec![20.0]]).unwrap();
        let model = DbscanParams::new(1.0, 1).fit(&x).unwrap();
        assert_eq!(model.n_clusters(), 3);
        assert_eq!(model.n_noise(), 0);
    }

    #[test]
    fn test_manhattan_metric() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0, 0.0], vec![0.6, 0.6], vec![1.2, 1.2]]).unwrap();
        // Euclidean steps are ~0.85 and join; Manhattan steps are 1.2 and do not.
        assert_eq!(DbscanParams::new(1.0, 2).fit(&x).unwrap().n_clusters(), 1);
        let manhattan = DbscanParams::new(1.0, 2).with_metric(Metric::Manhattan).fit(&x).unwrap();
        assert_eq!(manhattan.n_noise(), 3);
    }

    #[test]
    fn test_rejects_bad_params() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0]]).unwrap();
        assert!(DbscanParams::new(0.0, 3).fit(&x).is_err());
        assert!(DbscanParams::new(1.0, 0).fit(&x).is_err());
    }
}
