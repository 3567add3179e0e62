use oxiclassic_core::{Float, MlError, MlResult, Tensor};
use serde::{Deserialize, Serialize};

/// Kernel function `k(a, b)`, chosen once per model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    /// `a·b`
    Linear,
    /// `exp(-γ‖a - b‖²)`
    Rbf { gamma: f64 },
    /// `(γ a·b + c₀)^d`
    Polynomial { gamma: f64, coef0: f64, degree: u32 },
    /// `tanh(γ a·b + c₀)`
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Rbf { gamma: 1.0 }
    }
}

fn dot<T: Float>(a: &[T], b: &[T]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x.to_f64() * y.to_f64()).sum()
}

impl Kernel {
    pub fn validate(&self) -> MlResult<()> {
        let gamma = match *self {
            Kernel::Linear => return Ok(()),
            Kernel::Rbf { gamma } | Kernel::Sigmoid { gamma, .. } => gamma,
            Kernel::Polynomial { gamma, degree, .. } => {
                if degree == 0 {
                    return Err(MlError::InvalidParameter("polynomial degree must be at least 1".into()));
                }
                gamma
            }
        };
        if !(gamma > 0.0 && gamma.is_finite()) {
            return Err(MlError::InvalidParameter(format!("kernel gamma must be positive, got {}", gamma)));
        }
        Ok(())
    }

    pub fn compute<T: Float>(&self, a: &[T], b: &[T]) -> f64 {
        match *self {
            Kernel::Linear => dot(a, b),
            Kernel::Rbf { gamma } => {
                let sq: f64 = a
                    .iter()
                    .zip(b)
                    .map(|(&x, &y)| {
                        let d = (x - y).to_f64();
                        d * d
                    })
                    .sum();
                (-gamma * sq).exp()
            }
            Kernel::Polynomial { gamma, coef0, degree } => (gamma * dot(a, b) + coef0).powi(degree as i32),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
        }
    }

    /// Row-major `n x n` Gram matrix of the rows of `x`.
    pub fn gram<T: Float>(&self, x: &Tensor<T>) -> Vec<f64> {
        let n = x.nrows();
        let rows: Vec<&[T]> = x.rows().collect();
        let mut gram = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = self.compute(rows[i], rows[j]);
                gram[i * n + j] = v;
                gram[j * n + i] = v;
            }
        }
        gram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_kernel_values() {
        let a = [1.0f64, 2.0];
        let b = [3.0f64, -1.0];
        assert_abs_diff_eq!(Kernel::Linear.compute(&a, &b), 1.0);
        assert_abs_diff_eq!(Kernel::Rbf { gamma: 0.1 }.compute(&a, &b), (-1.3f64).exp(), epsilon = 1e-12);
        let poly = Kernel::Polynomial { gamma: 1.0, coef0: 1.0, degree: 2 };
        assert_abs_diff_eq!(poly.compute(&a, &b), 4.0);
        let sig = Kernel::Sigmoid { gamma: 0.5, coef0: 0.0 };
        assert_abs_diff_eq!(sig.compute(&a, &b), 0.5f64.tanh(), epsilon = 1e-12);
    }

    #[test]
    fn test_gram_is_symmetric_with_unit_rbf_diagonal() {
        let x: Tensor<f64> = Tensor::from_vec2d(&[vec![0.0, 1.0], vec![2.0, 0.5], vec![-1.0, 3.0]]).unwrap();
        let g = Kernel::Rbf { gamma: 0.5 }.gram(&x);
        for i in 0..3 {
            assert_abs_diff_eq!(g[i * 3 + i], 1.0);
            for j in 0..3 {
                assert_eq!(g[i * 3 + j], g[j * 3 + i]);
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(Kernel::Rbf { gamma: 0.0 }.validate().is_err());
        assert!(Kernel::Polynomial { gamma: 1.0, coef0: 0.0, degree: 0 }.validate().is_err());
        assert!(Kernel::Linear.validate().is_ok());
    }
}
