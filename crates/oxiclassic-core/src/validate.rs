//! Input-contract checks run at the top of every `fit` and `predict`.

use crate::dtype::Float;
use crate::error::{MlError, MlResult};
use crate::tensor::Tensor;

/// Check that `x` is a non-empty 2-D matrix of finite values.
/// Returns `(n_samples, n_features)`.
pub fn check_matrix<T: Float>(x: &Tensor<T>) -> MlResult<(usize, usize)> {
    if x.ndim() != 2 {
        return Err(MlError::DimensionMismatch(format!(
            "expected a 2D sample matrix, got {} dimensions",
            x.ndim()
        )));
    }
    let (n, p) = (x.nrows(), x.ncols());
    if n == 0 || p == 0 {
        return Err(MlError::EmptyInput);
    }
    if let Some(pos) = x.data().iter().position(|v| !v.is_finite()) {
        return Err(MlError::InvalidOperation(format!(
            "sample matrix contains a non-finite value at row {}, column {}",
            pos / p,
            pos % p
        )));
    }
    Ok((n, p))
}

/// Check a sample matrix together with its parallel label/target vector.
pub fn check_xy<T: Float>(x: &Tensor<T>, y: &Tensor<T>) -> MlResult<(usize, usize)> {
    let (n, p) = check_matrix(x)?;
    if y.ndim() != 1 {
        return Err(MlError::DimensionMismatch(format!(
            "expected a 1D target vector, got {} dimensions",
            y.ndim()
        )));
    }
    if y.numel() != n {
        return Err(MlError::LengthMismatch { samples: n, targets: y.numel() });
    }
    if let Some(pos) = y.data().iter().position(|v| !v.is_finite()) {
        return Err(MlError::InvalidOperation(format!(
            "target vector contains a non-finite value at index {}",
            pos
        )));
    }
    Ok((n, p))
}

pub fn check_min_samples(n_samples: usize, required: usize) -> MlResult<()> {
    if n_samples < required {
        return Err(MlError::InsufficientSamples { required, got: n_samples });
    }
    Ok(())
}

/// Check that a query row has the feature count seen during `fit`.
pub fn check_n_features(got: usize, expected: usize) -> MlResult<()> {
    if got != expected {
        return Err(MlError::ShapeMismatch {
            expected: vec![expected],
            got: vec![got],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_xy_rejects_length_mismatch() {
        let x: Tensor<f64> = Tensor::zeros(vec![3, 2]);
        let y: Tensor<f64> = Tensor::zeros(vec![2]);
        assert_eq!(
            check_xy(&x, &y),
            Err(MlError::LengthMismatch { samples: 3, targets: 2 })
        );
    }

    #[test]
    fn test_check_matrix_rejects_empty_and_nan() {
        let empty: Tensor<f64> = Tensor::zeros(vec![0, 2]);
        assert_eq!(check_matrix(&empty), Err(MlError::EmptyInput));

        let x: Tensor<f64> = Tensor::new(vec![1.0, f64::NAN], vec![1, 2]).unwrap();
        assert!(check_matrix(&x).is_err());
        assert!(check_matrix(&Tensor::<f64>::zeros(vec![4])).is_err());
    }

    #[test]
    fn test_min_samples() {
        assert!(check_min_samples(5, 5).is_ok());
        assert_eq!(
            check_min_samples(2, 3),
            Err(MlError::InsufficientSamples { required: 3, got: 2 })
        );
    }
}
