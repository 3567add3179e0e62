use log::{debug, trace, warn};
use oxiclassic_core::distance::squared_euclidean;
use oxiclassic_core::rng::{child_seeds, seeded};
use oxiclassic_core::validate::{check_matrix, check_min_samples, check_n_features};
use oxiclassic_core::{Float, MlError, MlResult, Tensor};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Starting centroids for Lloyd's algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KMeansInit {
    /// `k` distinct training rows chosen uniformly.
    Random,
    /// D² seeding: each new centroid is drawn with probability proportional
    /// to its squared distance from the nearest centroid chosen so far.
    KMeansPlusPlus,
    /// Caller-supplied centroids, one row per cluster.
    Fixed(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub init: KMeansInit,
    /// Independent restarts; the lowest-inertia result is kept.
    pub n_init: usize,
    pub max_iter: usize,
    /// Stop once every centroid moves less than `tol`.
    pub tol: f64,
    pub seed: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        KMeansParams {
            n_clusters: 8,
            init: KMeansInit::KMeansPlusPlus,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: Some(42),
        }
    }
}

impl KMeansParams {
    pub fn new(n_clusters: usize) -> Self {
        KMeansParams { n_clusters, ..KMeansParams::default() }
    }

    pub fn with_init(mut self, init: KMeansInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
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

    fn validate(&self) -> MlResult<()> {
        if self.n_clusters == 0 || self.n_init == 0 || self.max_iter == 0 {
            return Err(MlError::InvalidParameter(
                "n_clusters, n_init and max_iter must be at least 1".into(),
            ));
        }
        if !(self.tol >= 0.0) {
            return Err(MlError::InvalidParameter(format!("tol must be non-negative, got {}", self.tol)));
        }
        Ok(())
    }

    pub fn fit<T: Float>(&self, x: &Tensor<T>) -> MlResult<KMeans<T>> {
        self.validate()?;
        let (n, p) = check_matrix(x)?;
        check_min_samples(n, self.n_clusters)?;
        let points = as_f64(x);
        if let KMeansInit::Fixed(rows) = &self.init {
            check_fixed(rows, self.n_clusters, p)?;
        }

        // Fixed starting centroids make every restart identical.
        let n_init = if matches!(self.init, KMeansInit::Fixed(_)) { 1 } else { self.n_init };
        let seeds = child_seeds(&mut seeded(self.seed), n_init);

        let mut best: Option<LloydRun> = None;
        let mut restart_inertias = Vec::with_capacity(n_init);
        for (restart, seed) in seeds.into_iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed);
            let start = initial_centroids(&self.init, &points, p, self.n_clusters, &mut rng);
            let run = lloyd(&points, p, start, self.max_iter, self.tol);
            trace!("k-means restart {}: inertia {:.6} after {} iterations", restart, run.inertia, run.n_iter);
            restart_inertias.push(run.inertia);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or(MlError::EmptyInput)?;
        if !best.converged {
            warn!("k-means: best restart hit max_iter ({}) before converging", self.max_iter);
        }
        debug!(
            "k-means: k = {}, best inertia {:.6} over {} restart(s), {} iterations",
            self.n_clusters,
            best.inertia,
            n_init,
            best.n_iter
        );

        Ok(KMeans {
            centroids: to_tensor(&best.centroids, self.n_clusters, p)?,
            labels: best.labels,
            inertia: best.inertia,
            n_iter: best.n_iter,
            converged: best.converged,
            restart_inertias,
        })
    }
}

pub(crate) fn as_f64<T: Float>(x: &Tensor<T>) -> Vec<f64> {
    x.data().iter().map(|v| v.to_f64()).collect()
}

pub(crate) fn to_tensor<T: Float>(data: &[f64], rows: usize, cols: usize) -> MlResult<Tensor<T>> {
    Tensor::new(data.iter().map(|&v| T::from_f64(v)).collect(), vec![rows, cols])
}

pub(crate) fn check_fixed(rows: &[Vec<f64>], k: usize, p: usize) -> MlResult<()> {
    if rows.len() != k || rows.iter().any(|r| r.len() != p) {
        return Err(MlError::ShapeMismatch {
            expected: vec![k, p],
            got: vec![rows.len(), rows.first().map_or(0, Vec::len)],
        });
    }
    Ok(())
}

/// Index and squared distance of the centroid nearest to `point`.
pub(crate) fn nearest(centroids: &[f64], p: usize, point: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (k, c) in centroids.chunks_exact(p).enumerate() {
        let d = squared_euclidean(point, c);
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

/// Flat `k x p` starting centroids.
pub(crate) fn initial_centroids(init: &KMeansInit, points: &[f64], p: usize, k: usize, rng: &mut StdRng) -> Vec<f64> {
    let n = points.len() / p;
    let row = |i: usize| &points[i * p..(i + 1) * p];
    match init {
        KMeansInit::Fixed(rows) => rows.iter().flatten().copied().collect(),
        KMeansInit::Random => index::sample(rng, n, k).iter().flat_map(|i| row(i).to_vec()).collect(),
        KMeansInit::KMeansPlusPlus => {
            let mut centroids = Vec::with_capacity(k * p);
            centroids.extend_from_slice(row(rng.gen_range(0..n)));
            let mut d2: Vec<f64> = (0..n).map(|i| squared_euclidean(row(i), &centroids[..p])).collect();
            while centroids.len() < k * p {
                let total: f64 = d2.iter().sum();
                let chosen = if total > 0.0 {
                    let mut target = rng.gen::<f64>() * total;
                    let mut pick = n - 1;
                    for (i, &d) in d2.iter().enumerate() {
                        if target < d {
                            pick = i;
                            break;
                        }
                        target -= d;
                    }
                    pick
                } else {
                    // every point already coincides with a centroid
                    rng.gen_range(0..n)
                };
                let start = centroids.len();
                centroids.extend_from_slice(row(chosen));
                for (i, d) in d2.iter_mut().enumerate() {
                    *d = d.min(squared_euclidean(row(i), &centroids[start..]));
                }
            }
            centroids
        }
    }
}

struct LloydRun {
    centroids: Vec<f64>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
    converged: bool,
}

fn lloyd(points: &[f64], p: usize, mut centroids: Vec<f64>, max_iter: usize, tol: f64) -> LloydRun {
    let k = centroids.len() / p;
    let mut labels = vec![0usize; points.len() / p];
    let mut n_iter = 0;
    let mut converged = false;

    while n_iter < max_iter {
        n_iter += 1;
        for (label, point) in labels.iter_mut().zip(points.chunks_exact(p)) {
            *label = nearest(&centroids, p, point).0;
        }

        let mut sums = vec![0.0f64; k * p];
        let mut counts = vec![0usize; k];
        for (&label, point) in labels.iter().zip(points.chunks_exact(p)) {
            counts[label] += 1;
            for (s, v) in sums[label * p..(label + 1) * p].iter_mut().zip(point) {
                *s += v;
            }
        }
        let mut max_shift = 0.0f64;
        for c in 0..k {
            // an empty cluster keeps its previous centroid
            if counts[c] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[c * p..(c + 1) * p].iter().map(|s| s / counts[c] as f64).collect();
            let old = &mut centroids[c * p..(c + 1) * p];
            max_shift = max_shift.max(squared_euclidean(old, &updated));
            old.copy_from_slice(&updated);
        }
        if max_shift < tol * tol {
            converged = true;
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, point) in labels.iter_mut().zip(points.chunks_exact(p)) {
        let (c, d) = nearest(&centroids, p, point);
        *label = c;
        inertia += d;
    }
    LloydRun { centroids, labels, inertia, n_iter, converged }
}

/// Result of Lloyd's k-means.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct KMeans<T: Float> {
    centroids: Tensor<T>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
    converged: bool,
    restart_inertias: Vec<f64>,
}

impl<T: Float> KMeans<T> {
    /// Centroids, shape `[n_clusters, n_features]`.
    pub fn centroids(&self) -> &Tensor<T> {
        &self.centroids
    }

    /// Cluster of every training sample.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Final inertia of every restart, in the order they ran.
    pub fn restart_inertias(&self) -> &[f64] {
        &self.restart_inertias
    }

    pub fn predict_one(&self, sample: &[T]) -> MlResult<usize> {
        check_n_features(sample.len(), self.centroids.ncols())?;
        let point: Vec<f64> = sample.iter().map(|v| v.to_f64()).collect();
        Ok(nearest(&as_f64(&self.centroids), self.centroids.ncols(), &point).0)
    }

    /// Nearest centroid for every row.
    pub fn predict(&self, x: &Tensor<T>) -> MlResult<Vec<usize>> {
        let (_, p) = check_matrix(x)?;
        check_n_features(p, self.centroids.ncols())?;
        let centroids = as_f64(&self.centroids);
        Ok(as_f64(x).chunks_exact(p).map(|point| nearest(&centroids, p, point).0).collect())
    }

    /// Euclidean distance from every row to every centroid, shape
    /// `[n_samples, n_clusters]`.
    pub fn transform(&self, x: &Tensor<T>) -> MlResult<Tensor<T>> {
        let (n, p) = check_matrix(x)?;
        check_n_features(p, self.centroids.ncols())?;
        let mut data = Vec::with_capacity(n * self.n_clusters());
        for row in x.rows() {
            for c in self.centroids.rows() {
                data.push(T::from_f64(squared_euclidean(row, c).sqrt()));
            }
        }
        Tensor::new(data, vec![n, self.n_clusters()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use oxiclassic_datasets::make_blobs;

    fn two_blobs() -> Tensor<f64> {
        make_blobs(&[vec![0.0, 0.0], vec![10.0, 10.0]], 50, 0.5, Some(7)).0
    }

    fn distance_to(c: &[f64], target: [f64; 2]) -> f64 {
        ((c[0] - target[0]).powi(2) + (c[1] - target[1]).powi(2)).sqrt()
    }

    #[test]
    fn test_two_blobs_kmeans_plus_plus() {
        let x = two_blobs();
        let model = KMeansParams::new(2).with_n_init(5).fit(&x).unwrap();
        assert!(model.inertia() < 80.0, "inertia {}", model.inertia());
        for center in [[0.0, 0.0], [10.0, 10.0]] {
            let closest = model
                .centroids()
                .rows()
                .map(|c| distance_to(c, center))
                .fold(f64::INFINITY, f64::min);
            assert!(closest < 0.3, "no centroid near {:?}", center);
        }
        assert!(model.converged());
    }

    #[test]
    fn test_best_restart_has_lowest_inertia() {
        let (x, _) = make_blobs(&[vec![0.0, 0.0], vec![3.0, 0.0], vec![0.0, 3.0], vec![3.0, 3.0]], 15, 1.0, Some(3));
        let model = KMeansParams::new(4).with_init(KMeansInit::Random).with_n_init(8).fit(&x).unwrap();
        assert_eq!(model.restart_inertias().len(), 8);
        for &r in model.restart_inertias() {
            assert!(model.inertia() <= r);
        }
    }

    #[test]
    fn test_empty_cluster_keeps_centroid() {
        let x = two_blobs();
        let init = KMeansInit::Fixed(vec![vec![0.0, 0.0], vec![10.0, 10.0], vec![100.0, 100.0]]);
        let model = KMeansParams::new(3).with_init(init).fit(&x).unwrap();
        assert_eq!(model.centroids().row(2).unwrap(), &[100.0, 100.0]);
        assert!(model.labels().iter().all(|&l| l != 2));
        assert_eq!(model.restart_inertias().len(), 1);
    }

    #[test]
    fn test_fixed_init_shape_is_checked() {
        let x = two_blobs();
        let init = KMeansInit::Fixed(vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]]);
        assert!(matches!(KMeansParams::new(2).with_init(init).fit(&x), Err(MlError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_predict_and_transform() {
        let x = two_blobs();
        let model = KMeansParams::new(2).fit(&x).unwrap();
        assert_eq!(model.predict(&x).unwrap(), model.labels());
        let far = model.predict_one(&[9.5, 10.5]).unwrap();
        let near = model.predict_one(&[0.2, -0.1]).unwrap();
        assert_ne!(far, near);

        let q: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0, 0.0]]).unwrap();
        let d = model.transform(&q).unwrap();
        assert_eq!(d.shape_vec(), vec![1, 2]);
        let c = model.centroids().row(near).unwrap();
        assert_abs_diff_eq!(d.data()[near], (c[0] * c[0] + c[1] * c[1]).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_inertia_matches_metric() {
        let x = two_blobs();
        let model = KMeansParams::new(2).fit(&x).unwrap();
        let direct = oxiclassic_metrics::inertia(&x, model.centroids(), model.labels()).unwrap();
        assert_abs_diff_eq!(model.inertia(), direct, epsilon = 1e-9);
    }

    #[test]
    fn test_requires_k_samples() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0], vec![1.0]]).unwrap();
        assert!(matches!(
            KMeansParams::new(3).fit(&x),
            Err(MlError::InsufficientSamples { required: 3, got: 2 })
        ));
    }

    #[test]
    fn test_max_iter_bound_reports_not_converged() {
        let x = two_blobs();
        let model = KMeansParams::new(5).with_init(KMeansInit::Random).with_n_init(1).with_max_iter(1).with_tol(0.0).fit(&x).unwrap();
        assert_eq!(model.n_iter(), 1);
        assert!(!model.converged());
    }
}
