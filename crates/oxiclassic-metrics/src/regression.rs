use oxiclassic_core::{Float, MlError, MlResult, Tensor};

pub use oxiclassic_core::scoring::r2_score;

fn residuals<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<Vec<f64>> {
    if y_true.numel() != y_pred.numel() {
        return Err(MlError::LengthMismatch {
            samples: y_true.numel(),
            targets: y_pred.numel(),
        });
    }
    if y_true.numel() == 0 {
        return Err(MlError::EmptyInput);
    }
    Ok(y_true
        .data()
        .iter()
        .zip(y_pred.data())
        .map(|(&t, &p)| (t - p).to_f64())
        .collect())
}

/// Mean Squared Error.
pub fn mse<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<f64> {
    let n = y_true.numel() as f64;
    Ok(residuals(y_true, y_pred)?.iter().map(|d| d * d).sum::<f64>() / n)
}

/// Mean Absolute Error.
pub fn mae<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<f64> {
    let n = y_true.numel() as f64;
    Ok(residuals(y_true, y_pred)?.iter().map(|d| d.abs()).sum::<f64>() / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mse_mae() {
        let t: Tensor<f64> = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        let p: Tensor<f64> = Tensor::from_slice(&[1.0, 3.0, 1.0]);
        assert_abs_diff_eq!(mse(&t, &p).unwrap(), 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mae(&t, &p).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_r2_perfect() {
        let t: Tensor<f64> = Tensor::from_slice(&[3.0, -0.5, 2.0, 7.0]);
        assert_abs_diff_eq!(r2_score(&t, &t).unwrap(), 1.0);
    }
}
