//! Simplified sequential minimal optimization for the binary C-SVM dual.
//!
//! The second multiplier of each pair is drawn uniformly at random from the
//! other samples rather than by the maximum-violation heuristic, so
//! convergence takes more passes than a production solver would need.

use log::trace;
use rand::rngs::StdRng;
use rand::Rng;

/// Steps on `α_j` smaller than this are discarded.
const MIN_ALPHA_STEP: f64 = 1e-5;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SmoConfig {
    pub c: f64,
    pub tol: f64,
    /// Consecutive passes without a change before stopping.
    pub max_passes: usize,
    pub max_iter: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct SmoSolution {
    pub alphas: Vec<f64>,
    pub bias: f64,
    pub n_iter: usize,
    pub converged: bool,
}

/// Solve for `α` given a precomputed `n x n` Gram matrix and `±1` labels.
pub(crate) fn solve(gram: &[f64], y: &[f64], config: SmoConfig, rng: &mut StdRng) -> SmoSolution {
    let n = y.len();
    let c = config.c;
    let k = |i: usize, j: usize| gram[i * n + j];
    let mut alphas = vec![0.0f64; n];
    let mut b = 0.0f64;

    let output = |alphas: &[f64], b: f64, i: usize| -> f64 {
        (0..n).filter(|&j| alphas[j] != 0.0).map(|j| alphas[j] * y[j] * k(j, i)).sum::<f64>() + b
    };

    let mut quiet_passes = 0;
    let mut n_iter = 0;
    while quiet_passes < config.max_passes && n_iter < config.max_iter {
        let mut changed = 0;
        for i in 0..n {
            let e_i = output(&alphas, b, i) - y[i];
            let violates = (y[i] * e_i < -config.tol && alphas[i] < c) || (y[i] * e_i > config.tol && alphas[i] > 0.0);
            if !violates || n < 2 {
                continue;
            }
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            let e_j = output(&alphas, b, j) - y[j];
            let (a_i, a_j) = (alphas[i], alphas[j]);

            let (lo, hi) = if y[i] != y[j] {
                ((a_j - a_i).max(0.0), (c + a_j - a_i).min(c))
            } else {
                ((a_i + a_j - c).max(0.0), (a_i + a_j).min(c))
            };
            if hi - lo <= 0.0 {
                continue;
            }
            let eta = 2.0 * k(i, j) - k(i, i) - k(j, j);
            if eta >= 0.0 {
                continue;
            }

            let new_j = (a_j - y[j] * (e_i - e_j) / eta).clamp(lo, hi);
            if (new_j - a_j).abs() < MIN_ALPHA_STEP {
                continue;
            }
            let new_i = a_i + y[i] * y[j] * (a_j - new_j);
            alphas[i] = new_i;
            alphas[j] = new_j;

            let d_i = y[i] * (new_i - a_i);
            let d_j = y[j] * (new_j - a_j);
            let b1 = b - e_i - d_i * k(i, i) - d_j * k(i, j);
            let b2 = b - e_j - d_i * k(i, j) - d_j * k(j, j);
            b = if new_i > 0.0 && new_i < c {
                b1
            } else if new_j > 0.0 && new_j < c {
                b2
            } else {
                (b1 + b2) / 2.0
            };
            changed += 1;
        }
        n_iter += 1;
        trace!("smo pass {}: {} pairs changed", n_iter, changed);
        quiet_passes = if changed == 0 { quiet_passes + 1 } else { 0 };
    }

    SmoSolution { alphas, bias: b, n_iter, converged: quiet_passes >= config.max_passes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_two_point_problem_has_analytic_solution() {
        // x = -1 (y = -1) and x = +1 (y = +1) with a linear kernel:
        // w = 1, b = 0, α = 0.5 each.
        let gram = [1.0, -1.0, -1.0, 1.0];
        let y = [-1.0, 1.0];
        let config = SmoConfig { c: 10.0, tol: 1e-6, max_passes: 5, max_iter: 100 };
        let sol = solve(&gram, &y, config, &mut StdRng::seed_from_u64(0));
        assert!(sol.converged);
        assert!((sol.alphas[0] - 0.5).abs() < 1e-9, "{:?}", sol.alphas);
        assert!((sol.alphas[1] - 0.5).abs() < 1e-9);
        assert!(sol.bias.abs() < 1e-9);
    }

    #[test]
    fn test_equality_constraint_holds() {
        let xs = [-3.0, -2.0, -1.5, 1.0, 2.0, 2.5];
        let y = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        let n = xs.len();
        let gram: Vec<f64> = (0..n * n).map(|ij| xs[ij / n] * xs[ij % n]).collect();
        let config = SmoConfig { c: 1.0, tol: 1e-4, max_passes: 10, max_iter: 1000 };
        let sol = solve(&gram, &y, config, &mut StdRng::seed_from_u64(3));
        let balance: f64 = sol.alphas.iter().zip(&y).map(|(a, y)| a * y).sum();
        assert!(balance.abs() < 1e-9);
        assert!(sol.alphas.iter().all(|&a| a > -1e-12 && a < 1.0 + 1e-12));
    }

    #[test]
    fn test_iteration_cap_stops_without_convergence() {
        let xs = [-3.0, -2.0, 1.0, 2.0];
        let y = [-1.0, -1.0, 1.0, 1.0];
        let gram: Vec<f64> = (0..16).map(|ij| xs[ij / 4] * xs[ij % 4]).collect();
        let config = SmoConfig { c: 1.0, tol: 1e-3, max_passes: 50, max_iter: 1 };
        let sol = solve(&gram, &y, config, &mut StdRng::seed_from_u64(1));
        assert_eq!(sol.n_iter, 1);
        assert!(!sol.converged);
    }
}
