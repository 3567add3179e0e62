use oxiclassic_core::rng::seeded;
use oxiclassic_core::Tensor;
use rand::Rng;

/// A 30-sample, 3-class excerpt of the Iris dataset (4 features).
pub fn load_iris() -> (Tensor<f64>, Tensor<f64>) {
    // sepal_length, sepal_width, petal_length, petal_width
    let features: Vec<f64> = vec![
        // Setosa (class 0) - 10 samples
        5.1,3.5,1.4,0.2, 4.9,3.0,1.4,0.2, 4.7,3.2,1.3,0.2, 4.6,3.1,1.5,0.2,
        5.0,3.6,1.4,0.2, 5.4,3.9,1.7,0.4, 4.6,3.4,1.4,0.3, 5.0,3.4,1.5,0.2,
        4.4,2.9,1.4,0.2, 4.9,3.1,1.5,0.1,
        // Versicolor (class 1) - 10 samples
        7.0,3.2,4.7,1.4, 6.4,3.2,4.5,1.5, 6.9,3.1,4.9,1.5, 5.5,2.3,4.0,1.3,
        6.5,2.8,4.6,1.5, 5.7,2.8,4.5,1.3, 6.3,3.3,4.7,1.6, 4.9,2.4,3.3,1.0,
        6.6,2.9,4.6,1.3, 5.2,2.7,3.9,1.4,
        // Virginica (class 2) - 10 samples
        6.3,3.3,6.0,2.5, 5.8,2.7,5.1,1.9, 7.1,3.0,5.9,2.1, 6.3,2.9,5.6,1.8,
        6.5,3.0,5.8,2.2, 7.6,3.0,6.6,2.1, 4.9,2.5,4.5,1.7, 7.3,2.9,6.3,1.8,
        6.7,2.5,5.8,1.8, 7.2,3.6,6.1,2.5,
    ];
    let labels: Vec<f64> = vec![
        0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,
        1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0,
        2.0,2.0,2.0,2.0,2.0,2.0,2.0,2.0,2.0,2.0,
    ];

    (
        Tensor::new(features, vec![30, 4]).expect("iris features"),
        Tensor::new(labels, vec![30]).expect("iris labels"),
    )
}

/// Standard normal draw via Box-Muller.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Isotropic Gaussian blobs around the given centers, `n_per_center` points
/// each. Labels are the center index.
pub fn make_blobs(
    centers: &[Vec<f64>],
    n_per_center: usize,
    cluster_std: f64,
    seed: Option<u64>,
) -> (Tensor<f64>, Tensor<f64>) {
    let mut rng = seeded(seed);
    let n_features = centers.first().map_or(0, Vec::len);
    let mut features = Vec::with_capacity(centers.len() * n_per_center * n_features);
    let mut labels = Vec::with_capacity(centers.len() * n_per_center);

    for (c, center) in centers.iter().enumerate() {
        for _ in 0..n_per_center {
            for &mu in center {
                features.push(mu + cluster_std * standard_normal(&mut rng));
            }
            labels.push(c as f64);
        }
    }

    let n = labels.len();
    (
        Tensor::new(features, vec![n, n_features]).expect("blobs features"),
        Tensor::new(labels, vec![n]).expect("blobs labels"),
    )
}

/// Features uniform in `[-1, 1)` and `y = X·weights + intercept + noise·N(0, 1)`.
pub fn make_linear(
    n_samples: usize,
    weights: &[f64],
    intercept: f64,
    noise: f64,
    seed: Option<u64>,
) -> (Tensor<f64>, Tensor<f64>) {
    let mut rng = seeded(seed);
    let n_features = weights.len();
    let mut features = Vec::with_capacity(n_samples * n_features);
    let mut targets = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let mut y = intercept;
        for &w in weights {
            let x: f64 = rng.gen::<f64>() * 2.0 - 1.0;
            features.push(x);
            y += x * w;
        }
        if noise > 0.0 {
            y += noise * standard_normal(&mut rng);
        }
        targets.push(y);
    }

    (
        Tensor::new(features, vec![n_samples, n_features]).expect("linear features"),
        Tensor::new(targets, vec![n_samples]).expect("linear targets"),
    )
}

/// Points uniform in the unit hypercube; useful for index/brute-force
/// comparisons where ties are practically impossible.
pub fn make_uniform(n_samples: usize, n_features: usize, seed: Option<u64>) -> Tensor<f64> {
    let mut rng = seeded(seed);
    let data = (0..n_samples * n_features).map(|_| rng.gen::<f64>()).collect();
    Tensor::new(data, vec![n_samples, n_features]).expect("uniform features")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_iris() {
        let (x, y) = load_iris();
        assert_eq!(x.shape_vec(), vec![30, 4]);
        assert_eq!(y.numel(), 30);
    }

    #[test]
    fn test_make_blobs_is_deterministic() {
        let centers = vec![vec![0.0, 0.0], vec![5.0, 5.0], vec![-5.0, 5.0]];
        let (x, y) = make_blobs(&centers, 10, 0.5, Some(42));
        assert_eq!(x.shape_vec(), vec![30, 2]);
        assert_eq!(y.data()[29], 2.0);
        let (x2, _) = make_blobs(&centers, 10, 0.5, Some(42));
        assert_eq!(x, x2);
    }

    #[test]
    fn test_make_linear_without_noise_is_exact() {
        let (x, y) = make_linear(20, &[2.0, -1.0], 0.5, 0.0, Some(1));
        for (row, &t) in x.rows().zip(y.data()) {
            assert!((2.0 * row[0] - row[1] + 0.5 - t).abs() < 1e-12);
        }
    }
}
