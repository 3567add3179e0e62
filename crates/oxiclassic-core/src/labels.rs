use crate::dtype::Float;
use crate::error::{MlError, MlResult};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Sorted, de-duplicated set of class labels observed during training.
///
/// Probability vectors returned by classifiers are aligned to this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct ClassLabels<T: Float> {
    classes: Vec<T>,
}

impl<T: Float> ClassLabels<T> {
    /// Collect the classes present in `y` and encode every label as an index
    /// into the sorted class list. Labels must be finite integers.
    pub fn fit(y: &Tensor<T>) -> MlResult<(Self, Vec<usize>)> {
        if let Some(bad) = y.data().iter().find(|v| !v.is_finite() || v.round() != **v) {
            return Err(MlError::InvalidLabel(format!(
                "class labels must be integers, got {}",
                bad
            )));
        }
        let mut classes = y.data().to_vec();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();
        let labels = ClassLabels { classes };
        let encoded = y
            .data()
            .iter()
            .map(|&v| labels.index_of(v).ok_or_else(|| MlError::InvalidLabel(v.to_string())))
            .collect::<MlResult<Vec<_>>>()?;
        Ok((labels, encoded))
    }

    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Label value for a class index.
    pub fn label(&self, index: usize) -> T {
        self.classes[index]
    }

    pub fn index_of(&self, label: T) -> Option<usize> {
        self.classes.binary_search_by(|c| c.total_cmp(&label)).ok()
    }
}
