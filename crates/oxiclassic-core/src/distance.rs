use crate::dtype::Float;
use crate::error::{MlError, MlResult};
use serde::{Deserialize, Serialize};

/// Distance strategy shared by the neighbor and clustering engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    Euclidean,
    Manhattan,
    /// `(Σ|aᵢ - bᵢ|^p)^(1/p)`, `p ≥ 1`.
    Minkowski { p: f64 },
    /// `1 - cos(a, b)`. A zero vector has similarity 0 with everything.
    Cosine,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Euclidean
    }
}

impl Metric {
    pub fn validate(&self) -> MlResult<()> {
        match *self {
            Metric::Minkowski { p } if !(p >= 1.0 && p.is_finite()) => Err(
                MlError::InvalidParameter(format!("Minkowski p must be a finite value >= 1, got {}", p)),
            ),
            _ => Ok(()),
        }
    }

    pub fn distance<T: Float>(&self, a: &[T], b: &[T]) -> f64 {
        match *self {
            Metric::Euclidean => squared_euclidean(a, b).sqrt(),
            Metric::Manhattan => a
                .iter()
                .zip(b)
                .map(|(&x, &y)| (x - y).to_f64().abs())
                .sum(),
            Metric::Minkowski { p } => a
                .iter()
                .zip(b)
                .map(|(&x, &y)| (x - y).to_f64().abs().powf(p))
                .sum::<f64>()
                .powf(1.0 / p),
            Metric::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
                for (&x, &y) in a.iter().zip(b) {
                    let (x, y) = (x.to_f64(), y.to_f64());
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (na.sqrt() * nb.sqrt())
            }
        }
    }

    /// Whether a per-axis coordinate gap is a lower bound on this distance,
    /// which is what K-D tree pruning relies on.
    pub fn supports_kd_tree(&self) -> bool {
        !matches!(self, Metric::Cosine)
    }
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_euclidean<T: Float>(a: &[T], b: &[T]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = (x - y).to_f64();
            d * d
        })
        .sum()
}
