use serde::{Deserialize, Serialize};

/// Impurity measure used to score candidate splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// `1 - Σ p²`
    Gini,
    /// `-Σ p·log2 p`
    Entropy,
    /// Mean squared deviation from the subset mean.
    SquaredError,
    /// Mean absolute deviation from the subset mean.
    AbsoluteError,
}

impl Criterion {
    pub fn is_classification(&self) -> bool {
        matches!(self, Criterion::Gini | Criterion::Entropy)
    }

    /// Impurity of a class-count histogram.
    pub(crate) fn class_impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    -p * p.log2()
                })
                .sum(),
            _ => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum::<f64>()
            }
        }
    }

    /// Impurity of a set of regression targets.
    pub(crate) fn value_impurity(&self, values: impl Iterator<Item = f64> + Clone) -> f64 {
        let (count, sum) = values.clone().fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
        if count == 0 {
            return 0.0;
        }
        let mean = sum / count as f64;
        let dev: f64 = match self {
            Criterion::AbsoluteError => values.map(|v| (v - mean).abs()).sum(),
            _ => values.map(|v| (v - mean) * (v - mean)).sum(),
        };
        dev / count as f64
    }
}

/// Running sums for O(1) squared-error updates during a split sweep.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MomentAccumulator {
    pub count: usize,
    pub sum: f64,
    pub sum_sq: f64,
}

impl MomentAccumulator {
    pub fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    pub fn minus(&self, other: &MomentAccumulator) -> MomentAccumulator {
        MomentAccumulator {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    /// Mean squared deviation, clamped at zero against cancellation.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gini_and_entropy() {
        assert_abs_diff_eq!(Criterion::Gini.class_impurity(&[5, 5], 10), 0.5);
        assert_abs_diff_eq!(Criterion::Gini.class_impurity(&[10, 0], 10), 0.0);
        assert_abs_diff_eq!(Criterion::Entropy.class_impurity(&[5, 5], 10), 1.0);
        assert_abs_diff_eq!(Criterion::Entropy.class_impurity(&[4, 4, 0, 0], 8), 1.0);
    }

    #[test]
    fn test_value_impurity() {
        let values = [1.0, 2.0, 3.0, 6.0];
        assert_abs_diff_eq!(Criterion::SquaredError.value_impurity(values.iter().copied()), 3.5);
        assert_abs_diff_eq!(Criterion::AbsoluteError.value_impurity(values.iter().copied()), 1.5);
    }

    #[test]
    fn test_moment_accumulator_matches_direct_variance() {
        let mut acc = MomentAccumulator::default();
        for v in [1.0, 2.0, 3.0, 6.0] {
            acc.push(v);
        }
        assert_abs_diff_eq!(acc.variance(), 3.5, epsilon = 1e-12);
        let mut head = MomentAccumulator::default();
        head.push(1.0);
        assert_abs_diff_eq!(acc.minus(&head).variance(), 26.0 / 9.0, epsilon = 1e-12);
    }
}
