//! Levenberg–Marquardt for small weighted nonlinear least squares problems.
//!
//! The caller supplies a closure that, for a parameter vector θ, returns
//!
//! - the weighted residuals `r_i = (y_i - f(x_i; θ)) / σ_i`
//! - the weighted model Jacobian `J_ij = (∂f(x_i; θ)/∂θ_j) / σ_i`
//!
//! or `None` when the model cannot be evaluated at θ (non-finite values).
//!
//! Each iteration solves `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr` (Marquardt's scaling,
//! which makes the damping independent of parameter units) and accepts the
//! step only if χ² decreases.
//!
//! Termination:
//! - converged: χ² is numerically zero, the gradient is orthogonal to the
//!   residual (cosine test), the relative χ² decrease drops below `tolerance`
//!   at a point whose gradient cosine is below `DECREASE_GTOL`, or the first
//!   trial step of an iteration is negligible
//! - stalled: λ exceeds `max_lambda` without finding a decrease
//! - budget: `max_iterations` accepted-or-rejected iterations

use nalgebra::{DMatrix, DVector};

/// χ² below which the data are reproduced exactly.
const CHI2_FLOOR: f64 = 1e-24;
/// Gradient cosine below which the current point is a stationary point.
const GTOL: f64 = 1e-12;
/// Cosine required before a tiny χ² decrease is accepted as convergence.
/// Slow slides along a flat valley decrease χ² a little at every step.
const DECREASE_GTOL: f64 = 1e-8;
/// Looser cosine used to classify a stall as marginal convergence.
const STALL_GTOL: f64 = 1e-4;
/// Floor for diagonal entries of `JᵀJ` in the damping term.
const MIN_DIAG: f64 = 1e-300;

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub initial_lambda: f64,
    pub max_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_lambda: 1e-3,
            max_lambda: 1e16,
        }
    }
}

/// How the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    Converged,
    /// Damping ran away close to a stationary point.
    Marginal,
    /// Damping ran away far from any stationary point.
    Stalled,
    IterationLimit,
    /// The model could not be evaluated at the starting point.
    InvalidStart,
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: DVector<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub status: LmStatus,
    /// Weighted Jacobian at `params`.
    pub jacobian: DMatrix<f64>,
}

/// Minimize `Σ r_i(θ)²` starting at `start`.
pub fn levenberg_marquardt<F>(start: DVector<f64>, eval: F, opts: &LmOptions) -> LmOutcome
where
    F: Fn(&DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)>,
{
    let p = start.len();
    let Some((mut r, mut j)) = eval(&start).filter(|(r, _)| r.norm_squared().is_finite()) else {
        return LmOutcome {
            params: start,
            chi2: f64::INFINITY,
            iterations: 0,
            status: LmStatus::InvalidStart,
            jacobian: DMatrix::zeros(0, p),
        };
    };

    let mut params = start;
    let mut chi2 = r.norm_squared();
    let mut lambda = opts.initial_lambda;
    let mut iterations = 0;

    let status = loop {
        if chi2 <= CHI2_FLOOR {
            break LmStatus::Converged;
        }
        if iterations >= opts.max_iterations {
            break LmStatus::IterationLimit;
        }
        iterations += 1;

        let jtj = j.tr_mul(&j);
        let g = j.tr_mul(&r);
        if gradient_cosine(&j, &r, &g) <= GTOL {
            break LmStatus::Converged;
        }

        let mut first_attempt = true;
        let accepted = loop {
            let mut a = jtj.clone();
            for i in 0..p {
                a[(i, i)] += lambda * jtj[(i, i)].max(MIN_DIAG);
            }
            let delta = a.cholesky().map(|c| c.solve(&g));

            if let Some(delta) = delta {
                if first_attempt && step_is_negligible(&delta, &params, opts.tolerance) {
                    break None;
                }
                first_attempt = false;

                let trial = &params + &delta;
                if let Some((rt, jt)) = eval(&trial) {
                    let chi2_trial = rt.norm_squared();
                    if chi2_trial.is_finite() && chi2_trial < chi2 {
                        break Some((trial, rt, jt, chi2_trial));
                    }
                }
            }

            lambda *= 10.0;
            if lambda > opts.max_lambda {
                break None;
            }
        };

        match accepted {
            Some((trial, rt, jt, chi2_trial)) => {
                let decrease = chi2 - chi2_trial;
                params = trial;
                r = rt;
                j = jt;
                let chi2_old = chi2;
                chi2 = chi2_trial;
                lambda = (lambda / 10.0).max(f64::MIN_POSITIVE);
                if decrease <= opts.tolerance * chi2_old && gradient_cosine(&j, &r, &j.tr_mul(&r)) <= DECREASE_GTOL {
                    break LmStatus::Converged;
                }
            }
            None if lambda <= opts.max_lambda => break LmStatus::Converged,
            None => {
                let g = j.tr_mul(&r);
                if gradient_cosine(&j, &r, &g) <= STALL_GTOL {
                    break LmStatus::Marginal;
                }
                break LmStatus::Stalled;
            }
        }
    };

    LmOutcome {
        params,
        chi2,
        iterations,
        status,
        jacobian: j,
    }
}

/// `max_k |(Jᵀr)_k| / (‖J_k‖·‖r‖)`: zero at a stationary point, scale free.
fn gradient_cosine(j: &DMatrix<f64>, r: &DVector<f64>, g: &DVector<f64>) -> f64 {
    let r_norm = r.norm();
    if r_norm == 0.0 {
        return 0.0;
    }
    let mut worst: f64 = 0.0;
    for k in 0..j.ncols() {
        let col_norm = j.column(k).norm();
        if col_norm > 0.0 {
            worst = worst.max(g[k].abs() / (col_norm * r_norm));
        }
    }
    worst
}

fn step_is_negligible(delta: &DVector<f64>, params: &DVector<f64>, tol: f64) -> bool {
    delta
        .iter()
        .zip(params.iter())
        .all(|(d, p)| d.abs() <= tol * (p.abs() + tol))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `y = A·exp(k·x)` sampled exactly on a small grid.
    fn exp_problem(x: &[f64], a: f64, k: f64) -> impl Fn(&DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        let x = x.to_vec();
        let y: Vec<f64> = x.iter().map(|&xi| a * (k * xi).exp()).collect();
        move |theta: &DVector<f64>| {
            let n = x.len();
            let mut r = DVector::zeros(n);
            let mut jac = DMatrix::zeros(n, 2);
            for i in 0..n {
                let e = (theta[1] * x[i]).exp();
                r[i] = y[i] - theta[0] * e;
                jac[(i, 0)] = e;
                jac[(i, 1)] = theta[0] * x[i] * e;
            }
            if r.iter().all(|v| v.is_finite()) { Some((r, jac)) } else { None }
        }
    }

    #[test]
    fn recovers_exact_exponential() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.3).collect();
        let eval = exp_problem(&x, 2.0, 0.7);
        let out = levenberg_marquardt(DVector::from_row_slice(&[1.0, 0.3]), eval, &LmOptions::default());
        assert_eq!(out.status, LmStatus::Converged);
        assert!((out.params[0] - 2.0).abs() < 1e-8, "A = {}", out.params[0]);
        assert!((out.params[1] - 0.7).abs() < 1e-8, "k = {}", out.params[1]);
    }

    #[test]
    fn non_finite_start_is_reported() {
        let x = [0.0, 500.0, 1000.0];
        let eval = exp_problem(&x, 1.0, 0.001);
        let out = levenberg_marquardt(DVector::from_row_slice(&[1.0, 10.0]), eval, &LmOptions::default());
        assert_eq!(out.status, LmStatus::InvalidStart);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.3).collect();
        let eval = exp_problem(&x, 2.0, 0.7);
        let opts = LmOptions {
            max_iterations: 1,
            ..LmOptions::default()
        };
        let out = levenberg_marquardt(DVector::from_row_slice(&[0.1, 0.05]), eval, &opts);
        assert_eq!(out.status, LmStatus::IterationLimit);
        assert_eq!(out.iterations, 1);
    }
}
