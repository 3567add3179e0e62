use oxiclassic_core::{ClassLabels, Float, MlError, MlResult, Tensor};

pub use oxiclassic_core::scoring::accuracy;

/// Confusion matrix over the classes present in `y_true` or `y_pred`.
///
/// Returns the sorted class list and `matrix[true][pred]` counts.
pub fn confusion_matrix<T: Float>(
    y_true: &Tensor<T>,
    y_pred: &Tensor<T>,
) -> MlResult<(Vec<T>, Vec<Vec<usize>>)> {
    if y_true.numel() != y_pred.numel() {
        return Err(MlError::LengthMismatch {
            samples: y_true.numel(),
            targets: y_pred.numel(),
        });
    }
    let both = Tensor::from_slice(&[y_true.data(), y_pred.data()].concat());
    let (labels, encoded) = ClassLabels::fit(&both)?;
    let n = y_true.numel();
    let k = labels.len();
    let mut matrix = vec![vec![0usize; k]; k];
    for i in 0..n {
        matrix[encoded[i]][encoded[n + i]] += 1;
    }
    Ok((labels.classes().to_vec(), matrix))
}
