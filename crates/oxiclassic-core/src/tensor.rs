use crate::dtype::Float;
use crate::error::{MlError, MlResult};
use crate::shape::Shape;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::slice::ChunksExact;

/// Dense numeric array with row-major (C-order) layout.
///
/// Feature matrices are 2-D `[n_samples, n_features]`, label and target
/// vectors are 1-D `[n_samples]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct Tensor<T: Float> {
    data: Vec<T>,
    shape: Shape,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> MlResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(MlError::ShapeMismatch {
                expected: s.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape: s })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ZERO)
    }

    pub fn ones(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ONE)
    }

    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![value; s.numel()],
            shape: s,
        }
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice(data: &[T]) -> Self {
        Tensor {
            data: data.to_vec(),
            shape: Shape::new(vec![data.len()]),
        }
    }

    /// Create a 2-D tensor from rows. Every row must have the same length.
    pub fn from_vec2d(data: &[Vec<T>]) -> MlResult<Self> {
        if data.is_empty() {
            return Ok(Tensor::zeros(vec![0, 0]));
        }
        let rows = data.len();
        let cols = data[0].len();
        if let Some(bad) = data.iter().find(|r| r.len() != cols) {
            return Err(MlError::ShapeMismatch {
                expected: vec![cols],
                got: vec![bad.len()],
            });
        }
        let flat: Vec<T> = data.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::new(flat, vec![rows, cols])
    }

    /// Identity matrix of size n×n.
    pub fn eye(n: usize) -> Self {
        let mut t = Tensor::zeros(vec![n, n]);
        for i in 0..n {
            t.data[i * n + i] = T::ONE;
        }
        t
    }
}

// ─── Accessors ──────────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Number of rows of a 2-D tensor, or length of a 1-D tensor.
    pub fn nrows(&self) -> usize {
        self.shape.dims().first().copied().unwrap_or(0)
    }

    /// Number of columns of a 2-D tensor; 1 for a 1-D tensor.
    pub fn ncols(&self) -> usize {
        match self.shape.dims() {
            [_, c] => *c,
            _ => 1,
        }
    }

    fn offset(&self, indices: &[usize]) -> MlResult<usize> {
        if indices.len() != self.ndim() {
            return Err(MlError::DimensionMismatch(format!(
                "expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let mut offset = 0;
        for (axis, (&idx, &size)) in indices.iter().zip(self.shape.dims()).enumerate() {
            if idx >= size {
                return Err(MlError::IndexOutOfBounds { index: idx, axis, size });
            }
            offset = offset * size + idx;
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[usize]) -> MlResult<T> {
        Ok(self.data[self.offset(indices)?])
    }

    pub fn set(&mut self, indices: &[usize], value: T) -> MlResult<()> {
        let offset = self.offset(indices)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Borrow row `i` of a 2-D tensor.
    pub fn row(&self, i: usize) -> MlResult<&[T]> {
        if self.ndim() != 2 {
            return Err(MlError::InvalidOperation("row() requires a 2D tensor".into()));
        }
        let cols = self.ncols();
        if i >= self.nrows() {
            return Err(MlError::IndexOutOfBounds { index: i, axis: 0, size: self.nrows() });
        }
        Ok(&self.data[i * cols..(i + 1) * cols])
    }

    /// Iterate over the rows of a 2-D tensor.
    pub fn rows(&self) -> ChunksExact<'_, T> {
        self.data.chunks_exact(self.ncols().max(1))
    }

    /// Gather the given rows (duplicates allowed) into a new tensor.
    pub fn select_rows(&self, indices: &[usize]) -> MlResult<Tensor<T>> {
        let n = self.nrows();
        let cols = self.ncols();
        let mut data = Vec::with_capacity(indices.len() * cols);
        for &i in indices {
            if i >= n {
                return Err(MlError::IndexOutOfBounds { index: i, axis: 0, size: n });
            }
            data.extend_from_slice(&self.data[i * cols..(i + 1) * cols]);
        }
        let mut shape = self.shape.to_vec();
        shape[0] = indices.len();
        Tensor::new(data, shape)
    }
}

// ─── Shape manipulation ─────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    pub fn reshape(&self, new_shape: Vec<usize>) -> MlResult<Tensor<T>> {
        let ns = Shape::new(new_shape);
        if self.numel() != ns.numel() {
            return Err(MlError::ShapeMismatch {
                expected: ns.to_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(Tensor { data: self.data.clone(), shape: ns })
    }

    /// Transpose of a 2-D tensor.
    pub fn t(&self) -> MlResult<Tensor<T>> {
        if self.ndim() != 2 {
            return Err(MlError::InvalidOperation("transpose requires a 2D tensor".into()));
        }
        let (rows, cols) = (self.nrows(), self.ncols());
        let mut data = vec![T::ZERO; self.numel()];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = self.data[i * cols + j];
            }
        }
        Tensor::new(data, vec![cols, rows])
    }

    /// Concatenate 2-D tensors along axis 0 (rows) or 1 (columns).
    pub fn concatenate(tensors: &[&Tensor<T>], axis: usize) -> MlResult<Tensor<T>> {
        let first = tensors.first().ok_or(MlError::EmptyInput)?;
        if tensors.iter().any(|t| t.ndim() != 2) {
            return Err(MlError::InvalidOperation("concatenate requires 2D tensors".into()));
        }
        match axis {
            0 => {
                let cols = first.ncols();
                let mut data = Vec::new();
                for t in tensors {
                    if t.ncols() != cols {
                        return Err(MlError::ShapeMismatch {
                            expected: first.shape_vec(),
                            got: t.shape_vec(),
                        });
                    }
                    data.extend_from_slice(&t.data);
                }
                let rows = data.len() / cols.max(1);
                Tensor::new(data, vec![rows, cols])
            }
            1 => {
                let rows = first.nrows();
                if let Some(bad) = tensors.iter().find(|t| t.nrows() != rows) {
                    return Err(MlError::ShapeMismatch {
                        expected: first.shape_vec(),
                        got: bad.shape_vec(),
                    });
                }
                let cols: usize = tensors.iter().map(|t| t.ncols()).sum();
                let mut data = Vec::with_capacity(rows * cols);
                for i in 0..rows {
                    for t in tensors {
                        data.extend_from_slice(t.row(i)?);
                    }
                }
                Tensor::new(data, vec![rows, cols])
            }
            _ => Err(MlError::DimensionMismatch(format!("invalid concatenation axis {}", axis))),
        }
    }
}

// ─── Arithmetic ─────────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    pub fn apply<F: Fn(T) -> T>(&self, f: F) -> Tensor<T> {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn add_scalar(&self, s: T) -> Tensor<T> { self.apply(|x| x + s) }
    pub fn mul_scalar(&self, s: T) -> Tensor<T> { self.apply(|x| x * s) }

    /// Element-wise binary op. `other` must have the same shape, or be a
    /// 1-D vector matching the column count (broadcast across rows).
    fn zip_with<F: Fn(T, T) -> T>(&self, other: &Tensor<T>, op: F) -> MlResult<Tensor<T>> {
        if self.shape == other.shape {
            let data = self.data.iter().zip(&other.data).map(|(&a, &b)| op(a, b)).collect();
            return Ok(Tensor { data, shape: self.shape.clone() });
        }
        if self.ndim() == 2 && other.ndim() == 1 && other.numel() == self.ncols() {
            let data = self
                .rows()
                .flat_map(|row| row.iter().zip(&other.data).map(|(&a, &b)| op(a, b)))
                .collect();
            return Ok(Tensor { data, shape: self.shape.clone() });
        }
        Err(MlError::ShapeMismatch {
            expected: self.shape_vec(),
            got: other.shape_vec(),
        })
    }

    pub fn add(&self, other: &Tensor<T>) -> MlResult<Tensor<T>> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Tensor<T>) -> MlResult<Tensor<T>> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Tensor<T>) -> MlResult<Tensor<T>> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn sum_all(&self) -> T {
        self.data.iter().copied().sum()
    }

    pub fn mean_all(&self) -> T {
        if self.data.is_empty() {
            return T::ZERO;
        }
        self.sum_all() / T::from_usize(self.numel())
    }

    /// Dense 2-D matrix product.
    pub fn matmul(&self, other: &Tensor<T>) -> MlResult<Tensor<T>> {
        if self.ndim() != 2 || other.ndim() != 2 {
            return Err(MlError::InvalidOperation("matmul requires 2D tensors".into()));
        }
        let (m, k) = (self.nrows(), self.ncols());
        let (k2, n) = (other.nrows(), other.ncols());
        if k != k2 {
            return Err(MlError::DimensionMismatch(format!(
                "matmul: inner dimensions must match, got {} and {}",
                k, k2
            )));
        }
        let mut data = vec![T::ZERO; m * n];
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == T::ZERO {
                    continue;
                }
                let out = &mut data[i * n..(i + 1) * n];
                for (o, &b) in out.iter_mut().zip(&other.data[p * n..(p + 1) * n]) {
                    *o += a * b;
                }
            }
        }
        Tensor::new(data, vec![m, n])
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl<T: Float> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ndim() == 2 {
            writeln!(f, "tensor([")?;
            for row in self.rows().take(8) {
                write!(f, "  [")?;
                for (j, v) in row.iter().take(8).enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:.4}", v)?;
                }
                if row.len() > 8 {
                    write!(f, ", ...")?;
                }
                writeln!(f, "],")?;
            }
            if self.nrows() > 8 {
                writeln!(f, "  ...")?;
            }
            return write!(f, "], shape={})", self.shape);
        }
        write!(f, "tensor([")?;
        for (i, v) in self.data.iter().take(8).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", v)?;
        }
        if self.numel() > 8 {
            write!(f, ", ...")?;
        }
        write!(f, "], shape={})", self.shape)
    }
}
