use log::{debug, trace};
use oxiclassic_core::rng::seeded;
use oxiclassic_core::validate::{check_matrix, check_min_samples, check_n_features};
use oxiclassic_core::{Float, MlError, MlResult, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::kmeans::{as_f64, check_fixed, initial_centroids, nearest, to_tensor, KMeansInit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniBatchParams {
    pub n_clusters: usize,
    pub init: KMeansInit,
    pub batch_size: usize,
    /// Number of mini-batches drawn by `fit`.
    pub max_iter: usize,
    /// Stop early once a batch moves every centroid less than `tol`;
    /// zero disables the check.
    pub tol: f64,
    pub seed: Option<u64>,
}

impl Default for MiniBatchParams {
    fn default() -> Self {
        MiniBatchParams {
            n_clusters: 8,
            init: KMeansInit::KMeansPlusPlus,
            batch_size: 100,
            max_iter: 100,
            tol: 0.0,
            seed: Some(42),
        }
    }
}

impl MiniBatchParams {
    pub fn new(n_clusters: usize) -> Self {
        MiniBatchParams { n_clusters, ..MiniBatchParams::default() }
    }

    pub fn with_init(mut self, init: KMeansInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit<T: Float>(&self, x: &Tensor<T>) -> MlResult<MiniBatchKMeans<T>> {
        if self.n_clusters == 0 || self.batch_size == 0 || self.max_iter == 0 {
            return Err(MlError::InvalidParameter(
                "n_clusters, batch_size and max_iter must be at least 1".into(),
            ));
        }
        if !(self.tol >= 0.0) {
            return Err(MlError::InvalidParameter(format!("tol must be non-negative, got {}", self.tol)));
        }
        let (n, p) = check_matrix(x)?;
        check_min_samples(n, self.n_clusters)?;
        if let KMeansInit::Fixed(rows) = &self.init {
            check_fixed(rows, self.n_clusters, p)?;
        }
        let points = as_f64(x);
        let mut rng = seeded(self.seed);
        let centroids = initial_centroids(&self.init, &points, p, self.n_clusters, &mut rng);
        let mut model = MiniBatchKMeans {
            centroids,
            counts: vec![0; self.n_clusters],
            n_features: p,
            n_iter: 0,
            inertia: 0.0,
            _marker: std::marker::PhantomData,
        };

        let mut batch = Vec::with_capacity(self.batch_size * p);
        for step in 0..self.max_iter {
            batch.clear();
            for _ in 0..self.batch_size {
                let i = rng.gen_range(0..n);
                batch.extend_from_slice(&points[i * p..(i + 1) * p]);
            }
            let shift = model.update(&batch);
            model.n_iter += 1;
            trace!("mini-batch {}: largest squared centroid shift {:.3e}", step, shift);
            if shift < self.tol * self.tol {
                break;
            }
        }
        model.inertia = model.inertia_of(&points);
        debug!(
            "mini-batch k-means: k = {}, {} batches of {}, inertia {:.6}",
            self.n_clusters,
            model.n_iter,
            self.batch_size,
            model.inertia
        );
        Ok(model)
    }
}

/// Streaming k-means: each centroid is the running mean of the samples
/// assigned to it, with step `1 / count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniBatchKMeans<T> {
    centroids: Vec<f64>,
    counts: Vec<usize>,
    n_features: usize,
    n_iter: usize,
    inertia: f64,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T: Float> MiniBatchKMeans<T> {
    /// Assign the batch against the current centroids, then fold each
    /// sample into its centroid. Returns the largest squared shift.
    fn update(&mut self, batch: &[f64]) -> f64 {
        let p = self.n_features;
        let assigned: Vec<usize> = batch.chunks_exact(p).map(|x| nearest(&self.centroids, p, x).0).collect();
        let before = self.centroids.clone();
        for (&c, x) in assigned.iter().zip(batch.chunks_exact(p)) {
            self.counts[c] += 1;
            let eta = 1.0 / self.counts[c] as f64;
            for (v, &xi) in self.centroids[c * p..(c + 1) * p].iter_mut().zip(x) {
                *v = (1.0 - eta) * *v + eta * xi;
            }
        }
        before
            .chunks_exact(p)
            .zip(self.centroids.chunks_exact(p))
            .map(|(a, b)| a.iter().zip(b).map(|(u, v)| (u - v) * (u - v)).sum::<f64>())
            .fold(0.0, f64::max)
    }

    fn inertia_of(&self, points: &[f64]) -> f64 {
        points.chunks_exact(self.n_features).map(|x| nearest(&self.centroids, self.n_features, x).1).sum()
    }

    /// Fold one more batch into the centroids. `inertia()` keeps describing
    /// the data passed to `fit`.
    pub fn partial_fit(&mut self, batch: &Tensor<T>) -> MlResult<()> {
        let (_, p) = check_matrix(batch)?;
        check_n_features(p, self.n_features)?;
        self.update(&as_f64(batch));
        self.n_iter += 1;
        Ok(())
    }

    pub fn centroids(&self) -> MlResult<Tensor<T>> {
        to_tensor(&self.centroids, self.counts.len(), self.n_features)
    }

    /// Samples folded into each centroid so far.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Mini-batches processed, including `partial_fit` calls.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn predict(&self, x: &Tensor<T>) -> MlResult<Vec<usize>> {
        let (_, p) = check_matrix(x)?;
        check_n_features(p, self.n_features)?;
        Ok(as_f64(x).chunks_exact(p).map(|point| nearest(&self.centroids, p, point).0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiclassic_datasets::make_blobs;

    fn three_blobs() -> Tensor<f64> {
        make_blobs(&[vec![0.0, 0.0], vec![8.0, 0.0], vec![0.0, 8.0]], 60, 0.6, Some(12)).0
    }

    #[test]
    fn test_minibatch_finds_blob_centers() {
        let x = three_blobs();
        let model = MiniBatchParams::new(3).with_batch_size(30).with_max_iter(50).fit(&x).unwrap();
        let centroids = model.centroids().unwrap();
        for center in [[0.0, 0.0], [8.0, 0.0], [0.0, 8.0]] {
            let closest = centroids
                .rows()
                .map(|c| ((c[0] - center[0]).powi(2) + (c[1] - center[1]).powi(2)).sqrt())
                .fold(f64::INFINITY, f64::min);
            assert!(closest < 0.5, "no centroid near {:?}", center);
        }
        assert_eq!(model.counts().iter().sum::<usize>(), 30 * 50);
        assert_eq!(model.n_iter(), 50);
    }

    #[test]
    fn test_partial_fit_updates_counts() {
        let x = three_blobs();
        let mut model = MiniBatchParams::new(3).with_max_iter(5).fit(&x).unwrap();
        let before: usize = model.counts().iter().sum();
        let batch = x.select_rows(&[0, 1, 2, 3]).unwrap();
        model.partial_fit(&batch).unwrap();
        assert_eq!(model.counts().iter().sum::<usize>(), before + 4);
        assert_eq!(model.n_iter(), 6);
        let wide: Tensor<f64> = Tensor::zeros(vec![1, 3]);
        assert!(model.partial_fit(&wide).is_err());
    }

    #[test]
    fn test_tol_stops_early() {
        let x = three_blobs();
        let model = MiniBatchParams::new(3).with_max_iter(10_000).with_tol(1e-3).fit(&x).unwrap();
        assert!(model.n_iter() < 10_000);
    }

    #[test]
    fn test_rejects_negative_or_nan_tol() {
        let x = three_blobs();
        for tol in [-1.0, f64::NAN] {
            let result = MiniBatchParams::new(3).with_tol(tol).fit(&x);
            assert!(matches!(result, Err(MlError::InvalidParameter(_))), "tol {} accepted", tol);
        }
        assert!(MiniBatchParams::new(3).with_tol(0.0).fit(&x).is_ok());
    }

    #[test]
    fn test_predict_matches_nearest_centroid() {
        let x = three_blobs();
        let model = MiniBatchParams::new(3).fit(&x).unwrap();
        let labels = model.predict(&x).unwrap();
        assert_eq!(labels.len(), x.nrows());
        assert_eq!(labels[0], labels[1]);
        assert_ne!(labels[0], labels[60]);
    }
}
