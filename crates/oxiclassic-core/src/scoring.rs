use crate::dtype::Float;
use crate::error::{MlError, MlResult};
use crate::tensor::Tensor;

fn check_same_len<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<usize> {
    if y_true.numel() != y_pred.numel() {
        return Err(MlError::LengthMismatch {
            samples: y_true.numel(),
            targets: y_pred.numel(),
        });
    }
    if y_true.numel() == 0 {
        return Err(MlError::EmptyInput);
    }
    Ok(y_true.numel())
}

/// Fraction of predictions equal to the true class label.
pub fn accuracy<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<f64> {
    let n = check_same_len(y_true, y_pred)?;
    let correct = y_true
        .data()
        .iter()
        .zip(y_pred.data())
        .filter(|(&a, &b)| (a - b).abs() < T::HALF)
        .count();
    Ok(correct as f64 / n as f64)
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2_score<T: Float>(y_true: &Tensor<T>, y_pred: &Tensor<T>) -> MlResult<f64> {
    let n = check_same_len(y_true, y_pred)?;
    let mean = y_true.data().iter().map(|v| v.to_f64()).sum::<f64>() / n as f64;
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (&t, &p) in y_true.data().iter().zip(y_pred.data()) {
        let (t, p) = (t.to_f64(), p.to_f64());
        ss_res += (t - p) * (t - p);
        ss_tot += (t - mean) * (t - mean);
    }
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_accuracy() {
        let t: Tensor<f64> = Tensor::from_slice(&[0.0, 1.0, 2.0, 1.0]);
        let p: Tensor<f64> = Tensor::from_slice(&[0.0, 1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(accuracy(&t, &p).unwrap(), 0.75);
    }

    #[test]
    fn test_r2() {
        let t: Tensor<f64> = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(r2_score(&t, &t).unwrap(), 1.0);
        let mean: Tensor<f64> = Tensor::from_slice(&[2.0, 2.0, 2.0]);
        assert_abs_diff_eq!(r2_score(&t, &mean).unwrap(), 0.0);
        assert!(r2_score(&t, &Tensor::from_slice(&[1.0])).is_err());
    }
}
