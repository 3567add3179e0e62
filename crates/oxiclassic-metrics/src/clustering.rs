use oxiclassic_core::distance::squared_euclidean;
use oxiclassic_core::validate::check_matrix;
use oxiclassic_core::{Float, MlError, MlResult, Tensor};

/// Mean silhouette coefficient over all samples (Euclidean distance).
///
/// For each sample, `s = (b - a) / max(a, b)` where `a` is the mean distance
/// to the other members of its cluster and `b` the mean distance to the
/// nearest other cluster. Members of singleton clusters score 0.
/// Requires `2 <= n_clusters <= n_samples - 1`.
pub fn silhouette_score<T: Float>(x: &Tensor<T>, labels: &[usize]) -> MlResult<f64> {
    let (n, _) = check_matrix(x)?;
    if labels.len() != n {
        return Err(MlError::LengthMismatch { samples: n, targets: labels.len() });
    }
    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for &l in labels {
        sizes[l] += 1;
    }
    let distinct = sizes.iter().filter(|&&s| s > 0).count();
    if distinct < 2 || distinct >= n {
        return Err(MlError::InvalidParameter(format!(
            "silhouette needs 2..={} distinct clusters, got {}",
            n - 1,
            distinct
        )));
    }

    let rows: Vec<&[T]> = x.rows().collect();
    let mut total = 0.0;
    let mut sums = vec![0.0f64; n_clusters];
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }
        sums.iter_mut().for_each(|s| *s = 0.0);
        for j in 0..n {
            if i != j {
                sums[labels[j]] += squared_euclidean(rows[i], rows[j]).sqrt();
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Ok(total / n as f64)
}

/// Sum of squared distances from each sample to its assigned centroid.
pub fn inertia<T: Float>(x: &Tensor<T>, centroids: &Tensor<T>, labels: &[usize]) -> MlResult<f64> {
    let (n, p) = check_matrix(x)?;
    if labels.len() != n {
        return Err(MlError::LengthMismatch { samples: n, targets: labels.len() });
    }
    if centroids.ncols() != p {
        return Err(MlError::ShapeMismatch {
            expected: vec![centroids.nrows(), p],
            got: centroids.shape_vec(),
        });
    }
    x.rows()
        .zip(labels)
        .map(|(row, &k)| Ok(squared_euclidean(row, centroids.row(k)?)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_pairs() -> Tensor<f64> {
        Tensor::from_vec2d(&[
            vec![0.0, 0.0], vec![0.0, 1.0],
            vec![10.0, 0.0], vec![10.0, 1.0],
        ]).unwrap()
    }

    #[test]
    fn test_silhouette_well_separated() {
        let s = silhouette_score(&two_pairs(), &[0, 0, 1, 1]).unwrap();
        assert!(s > 0.9, "silhouette {}", s);
    }

    #[test]
    fn test_silhouette_bad_labels_is_negative() {
        let s = silhouette_score(&two_pairs(), &[0, 1, 0, 1]).unwrap();
        assert!(s < 0.0, "silhouette {}", s);
    }

    #[test]
    fn test_silhouette_requires_two_clusters() {
        assert!(silhouette_score(&two_pairs(), &[0, 0, 0, 0]).is_err());
        assert!(silhouette_score(&two_pairs(), &[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_inertia() {
        let c: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0, 0.5], vec![10.0, 0.5]]).unwrap();
        assert_abs_diff_eq!(inertia(&two_pairs(), &c, &[0, 0, 1, 1]).unwrap(), 1.0);
    }
}
