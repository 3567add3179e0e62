use oxiclassic_core::{Float, MlError, MlResult, Tensor};

/// Pivots with magnitude below this (relative to the largest entry of `A`)
/// are treated as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve the square system `Ax = b` by Gaussian elimination with partial
/// pivoting.
///
/// `b` may be a vector `[n]` or a matrix `[n, m]` of right-hand sides; the
/// result has the same shape. Returns [`MlError::SingularMatrix`] when a
/// pivot vanishes.
pub fn solve<T: Float>(a: &Tensor<T>, b: &Tensor<T>) -> MlResult<Tensor<T>> {
    if a.ndim() != 2 || a.nrows() != a.ncols() {
        return Err(MlError::InvalidOperation(format!(
            "solve: A must be square, got shape {}",
            a.shape()
        )));
    }
    let n = a.nrows();
    if b.nrows() != n || b.ndim() > 2 {
        return Err(MlError::DimensionMismatch(format!(
            "solve: b has shape {} but A is {}x{}",
            b.shape(),
            n,
            n
        )));
    }
    let m = b.ncols();

    // Augmented matrix [A | B] in f64 for stability regardless of T.
    let width = n + m;
    let mut aug = vec![0.0f64; n * width];
    for i in 0..n {
        for j in 0..n {
            aug[i * width + j] = a.data()[i * n + j].to_f64();
        }
        for j in 0..m {
            aug[i * width + n + j] = b.data()[i * m + j].to_f64();
        }
    }

    let scale = a.data().iter().map(|v| v.to_f64().abs()).fold(0.0, f64::max).max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| {
                aug[r1 * width + col].abs().total_cmp(&aug[r2 * width + col].abs())
            })
            .unwrap_or(col);
        if aug[pivot_row * width + col].abs() <= PIVOT_TOLERANCE * scale {
            return Err(MlError::SingularMatrix);
        }
        if pivot_row != col {
            for j in 0..width {
                aug.swap(col * width + j, pivot_row * width + j);
            }
        }

        let pivot = aug[col * width + col];
        for row in (col + 1)..n {
            let factor = aug[row * width + col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..width {
                aug[row * width + j] -= factor * aug[col * width + j];
            }
        }
    }

    // Back substitution, one right-hand side at a time.
    let mut x = vec![0.0f64; n * m];
    for rhs in 0..m {
        for i in (0..n).rev() {
            let mut sum = aug[i * width + n + rhs];
            for j in (i + 1)..n {
                sum -= aug[i * width + j] * x[j * m + rhs];
            }
            x[i * m + rhs] = sum / aug[i * width + i];
        }
    }

    let data = x.into_iter().map(T::from_f64).collect();
    if b.ndim() == 1 {
        Tensor::new(data, vec![n])
    } else {
        Tensor::new(data, vec![n, m])
    }
}
