//! The curve fitter.
//!
//! Given:
//! - samples `(x_i, y_i, σx_i, σy_i)`
//! - a model kind and an initial guess
//! - a closed fit domain `[min, max]`
//!
//! we minimize `Σ ((y_i − f(x_i; θ)) / σ_i)²` over the in-domain samples and
//! return θ̂ with its covariance and goodness-of-fit statistics.
//!
//! The linear model is solved in closed form; the Shockley model goes through
//! Levenberg–Marquardt. Both share the covariance step in `math::ols`.

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitDomain, FitResult, ModelKind, Sample, XErrorMode};
use crate::error::FitError;
use crate::math::{LmOptions, LmStatus, covariance_from_design, levenberg_marquardt, solve_weighted};
use crate::models::{fill_jacobian_row, is_identifiable, predict, slope};

/// Solver settings.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Iteration budget of the nonlinear solver.
    pub max_iterations: usize,
    /// Relative χ² decrease (and relative step size) that counts as converged.
    pub tolerance: f64,
    /// Initial Levenberg–Marquardt damping.
    pub initial_lambda: f64,
    pub x_errors: XErrorMode,
    /// Maximum refit passes in `EffectiveVariance` mode.
    pub x_error_passes: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_lambda: 1e-3,
            x_errors: XErrorMode::Ignore,
            x_error_passes: 5,
        }
    }
}

/// Parameter change (relative) below which effective-variance passes stop.
const X_ERROR_PASS_TOL: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Solution {
    params: Vec<f64>,
    covariance: DMatrix<f64>,
    chi2: f64,
    iterations: usize,
    converged: bool,
}

/// Fit `model` to the samples inside `domain`.
///
/// `initial_guess` seeds the iterative solver; the closed-form linear fit ignores it.
pub fn fit(
    samples: &[Sample],
    model: ModelKind,
    initial_guess: &[f64],
    domain: FitDomain,
    opts: &FitOptions,
) -> Result<FitResult, FitError> {
    let p = model.param_count();
    if model == ModelKind::Shockley {
        validate_initial_guess(model, initial_guess)?;
    }

    // Keep the original index for error messages.
    let mut used: Vec<Sample> = Vec::with_capacity(samples.len());
    for (index, s) in samples.iter().enumerate() {
        if !(s.x.is_finite() && s.y.is_finite()) || !domain.contains(s.x) {
            continue;
        }
        if !(s.sigma_y.is_finite() && s.sigma_y > 0.0) {
            return Err(FitError::InvalidUncertainty {
                index,
                sigma: s.sigma_y,
            });
        }
        used.push(*s);
    }

    let n = used.len();
    if n < p + 1 {
        return Err(FitError::InsufficientData { needed: p + 1, got: n });
    }
    let ndf = n - p;

    let sigmas: Vec<f64> = used.iter().map(|s| s.sigma_y).collect();
    let mut solution = solve(model, &used, &sigmas, initial_guess, opts, ndf)?;

    let has_x_errors = used.iter().any(|s| s.sigma_x.is_finite() && s.sigma_x > 0.0);
    if opts.x_errors == XErrorMode::EffectiveVariance && has_x_errors {
        let mut total_iterations = solution.iterations;
        for _ in 0..opts.x_error_passes {
            let sigmas = effective_sigmas(model, &used, &solution.params);
            let next = solve(model, &used, &sigmas, &solution.params, opts, ndf)?;
            total_iterations += next.iterations;
            let settled = relative_change(&solution.params, &next.params) <= X_ERROR_PASS_TOL;
            solution = next;
            if settled {
                break;
            }
        }
        solution.iterations = total_iterations;
    }

    Ok(FitResult {
        model,
        params: solution.params,
        covariance: solution.covariance,
        chi2: solution.chi2,
        ndf,
        n_used: n,
        iterations: solution.iterations,
        converged: solution.converged,
        domain,
    })
}

fn validate_initial_guess(model: ModelKind, guess: &[f64]) -> Result<(), FitError> {
    let p = model.param_count();
    if guess.len() != p {
        return Err(FitError::InvalidInitialGuess(format!(
            "{} model needs {p} parameters, got {}",
            model.display_name(),
            guess.len()
        )));
    }
    if guess.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInitialGuess("non-finite starting value".to_string()));
    }
    if model == ModelKind::Shockley && guess[1] == 0.0 {
        return Err(FitError::InvalidInitialGuess("eta must be non-zero".to_string()));
    }
    Ok(())
}

fn solve(
    model: ModelKind,
    samples: &[Sample],
    sigmas: &[f64],
    guess: &[f64],
    opts: &FitOptions,
    ndf: usize,
) -> Result<Solution, FitError> {
    match model {
        ModelKind::Linear => solve_linear(samples, sigmas),
        ModelKind::Shockley => solve_nonlinear(model, samples, sigmas, guess, opts, ndf),
    }
}

fn solve_linear(samples: &[Sample], sigmas: &[f64]) -> Result<Solution, FitError> {
    let n = samples.len();
    let mut xw = DMatrix::<f64>::zeros(n, 2);
    let mut yw = DVector::<f64>::zeros(n);
    for (i, (s, &sigma)) in samples.iter().zip(sigmas).enumerate() {
        xw[(i, 0)] = 1.0 / sigma;
        xw[(i, 1)] = s.x / sigma;
        yw[i] = s.y / sigma;
    }

    let sol = solve_weighted(&xw, &yw).ok_or(FitError::SingularMatrix)?;
    let params: Vec<f64> = sol.beta.iter().copied().collect();
    let chi2 = chi2(ModelKind::Linear, samples, sigmas, &params);

    Ok(Solution {
        params,
        covariance: sol.covariance,
        chi2,
        iterations: 0,
        converged: true,
    })
}

fn solve_nonlinear(
    model: ModelKind,
    samples: &[Sample],
    sigmas: &[f64],
    guess: &[f64],
    opts: &FitOptions,
    ndf: usize,
) -> Result<Solution, FitError> {
    let p = model.param_count();
    let n = samples.len();

    let eval = |theta: &DVector<f64>| -> Option<(DVector<f64>, DMatrix<f64>)> {
        let params = theta.as_slice();
        let mut r = DVector::<f64>::zeros(n);
        let mut j = DMatrix::<f64>::zeros(n, p);
        let mut row = vec![0.0; p];
        for (i, (s, &sigma)) in samples.iter().zip(sigmas).enumerate() {
            r[i] = (s.y - predict(model, s.x, params)) / sigma;
            fill_jacobian_row(model, s.x, params, &mut row);
            for (k, v) in row.iter().enumerate() {
                j[(i, k)] = v / sigma;
            }
        }
        let finite = r.iter().all(|v| v.is_finite()) && j.iter().all(|v| v.is_finite());
        finite.then_some((r, j))
    };

    let lm_opts = LmOptions {
        max_iterations: opts.max_iterations,
        tolerance: opts.tolerance,
        initial_lambda: opts.initial_lambda,
        ..LmOptions::default()
    };
    let outcome = levenberg_marquardt(DVector::from_row_slice(guess), eval, &lm_opts);
    let non_convergence = || FitError::NonConvergence {
        iterations: outcome.iterations,
        chi2: outcome.chi2,
        ndf,
    };

    let converged = match outcome.status {
        LmStatus::Converged => true,
        LmStatus::Marginal => false,
        LmStatus::Stalled | LmStatus::IterationLimit | LmStatus::InvalidStart => {
            return Err(non_convergence());
        }
    };

    // A solver that slid off to a degenerate asymptote has not found a fit.
    let x_max = samples.iter().map(|s| s.x.abs()).fold(0.0, f64::max);
    if !is_identifiable(model, x_max, outcome.params.as_slice()) {
        return Err(non_convergence());
    }
    let covariance = covariance_from_design(&outcome.jacobian).ok_or_else(non_convergence)?;
    Ok(Solution {
        params: outcome.params.iter().copied().collect(),
        covariance,
        chi2: outcome.chi2,
        iterations: outcome.iterations,
        converged,
    })
}

fn chi2(model: ModelKind, samples: &[Sample], sigmas: &[f64], params: &[f64]) -> f64 {
    samples
        .iter()
        .zip(sigmas)
        .map(|(s, &sigma)| {
            let r = (s.y - predict(model, s.x, params)) / sigma;
            r * r
        })
        .sum()
}

fn effective_sigmas(model: ModelKind, samples: &[Sample], params: &[f64]) -> Vec<f64> {
    samples
        .iter()
        .map(|s| {
            let sx = if s.sigma_x.is_finite() { s.sigma_x } else { 0.0 };
            let eff = s.sigma_y.hypot(slope(model, s.x, params) * sx);
            if eff.is_finite() && eff > 0.0 { eff } else { s.sigma_y }
        })
        .collect()
}

fn relative_change(old: &[f64], new: &[f64]) -> f64 {
    old.iter()
        .zip(new)
        .map(|(a, b)| (a - b).abs() / a.abs().max(b.abs()).max(f64::MIN_POSITIVE))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(points: &[(f64, f64)], sigma: f64) -> Vec<Sample> {
        points.iter().map(|&(x, y)| Sample::new(x, y, 0.0, sigma)).collect()
    }

    fn shockley_samples(i0: f64, eta: f64) -> Vec<Sample> {
        (0..16)
            .map(|k| {
                let v = 400.0 + 20.0 * k as f64;
                let i = i0 * (v / eta).exp_m1();
                Sample::new(v, i, 0.0, 0.01 * i)
            })
            .collect()
    }

    #[test]
    fn three_point_line_is_exact() {
        let samples = line(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0)], 1.0);
        let fit = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap();

        assert!(fit.params[0].abs() < 1e-12);
        assert_relative_eq!(fit.params[1], 2.0, epsilon = 1e-12);
        assert!(fit.chi2 < 1e-20);
        assert_eq!(fit.ndf, 1);
        assert!(fit.converged);
        // Non-degenerate covariance at the ndf = 1 boundary.
        assert!(fit.covariance[(0, 0)] > 0.0 && fit.covariance[(1, 1)] > 0.0);
        let det = fit.covariance[(0, 0)] * fit.covariance[(1, 1)] - fit.covariance[(0, 1)].powi(2);
        assert!(det > 0.0);
    }

    #[test]
    fn noiseless_line_recovers_generator() {
        let samples: Vec<Sample> = (0..20)
            .map(|i| {
                let x = i as f64 * 50.0;
                Sample::new(x, 3.5 + 0.98 * x, 0.0, 1e-6)
            })
            .collect();
        let fit = fit(&samples, ModelKind::Linear, &[], FitDomain::new(0.0, 1000.0), &FitOptions::default()).unwrap();
        assert_relative_eq!(fit.params[0], 3.5, epsilon = 1e-8);
        assert_relative_eq!(fit.params[1], 0.98, epsilon = 1e-10);
        assert!(fit.chi2 < 1e-6);
        assert!(fit.errors().iter().all(|e| *e < 1e-5));
    }

    #[test]
    fn weights_follow_sigma_y() {
        // Two clusters disagree; the tight one wins.
        let mut samples = line(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)], 0.01);
        samples.extend(line(&[(0.0, 10.0), (1.0, 11.0), (2.0, 12.0)], 100.0));
        let fit = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap();
        assert!(fit.params[0].abs() < 0.01, "intercept {}", fit.params[0]);
    }

    #[test]
    fn too_few_points_is_insufficient_data() {
        let samples = line(&[(0.0, 0.0), (1.0, 2.0)], 1.0);
        let err = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 3, got: 2 });

        let err = fit(&[], ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 3, got: 0 });
    }

    #[test]
    fn domain_excludes_points() {
        let mut samples = line(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0), (3.0, 6.0)], 1.0);
        samples.push(Sample::new(5000.0, -1e6, 0.0, 1.0));
        let used = fit(&samples, ModelKind::Linear, &[], FitDomain::new(0.0, 1000.0), &FitOptions::default()).unwrap();
        assert_eq!(used.n_used, 4);
        assert_eq!(used.ndf, 2);
        assert_relative_eq!(used.params[1], 2.0, epsilon = 1e-10);

        let err = fit(&samples, ModelKind::Linear, &[], FitDomain::new(2.5, 1000.0), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData { got: 1, .. }));
    }

    #[test]
    fn non_positive_sigma_is_rejected() {
        let mut samples = line(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0)], 1.0);
        samples[1].sigma_y = 0.0;
        let err = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::InvalidUncertainty { index: 1, .. }));

        // Out-of-domain samples are never inspected.
        let fit = fit(&samples, ModelKind::Linear, &[], FitDomain::new(1.5, 10.0), &FitOptions::default());
        assert!(matches!(fit, Err(FitError::InsufficientData { .. })));
    }

    #[test]
    fn identical_x_is_singular() {
        let samples = line(&[(1.0, 0.0), (1.0, 2.0), (1.0, 4.0)], 1.0);
        let err = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::SingularMatrix);
    }

    #[test]
    fn shockley_recovers_exact_parameters() {
        let samples = shockley_samples(1e-6, 40.0);
        for guess in [[1e-6, 40.0], [3e-6, 45.0], [4e-7, 36.0]] {
            let fit = fit(&samples, ModelKind::Shockley, &guess, FitDomain::new(0.0, 1000.0), &FitOptions::default())
                .unwrap_or_else(|e| panic!("guess {guess:?}: {e}"));
            assert_relative_eq!(fit.params[0], 1e-6, max_relative = 1e-6);
            assert_relative_eq!(fit.params[1], 40.0, max_relative = 1e-6);
            assert!(fit.converged);
            assert_eq!(fit.ndf, 14);
        }
    }

    #[test]
    fn shockley_pathological_guess_does_not_converge() {
        let samples = shockley_samples(1e-6, 40.0);
        // exp(700 / 0.5) overflows: the solver cannot even start.
        let err = fit(&samples, ModelKind::Shockley, &[1e-6, 0.5], FitDomain::unbounded(), &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, FitError::NonConvergence { iterations: 0, ndf: 14, .. }));
    }

    #[test]
    fn shockley_budget_exhaustion_is_non_convergence() {
        let samples = shockley_samples(1e-6, 40.0);
        let opts = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };
        let err = fit(&samples, ModelKind::Shockley, &[1e-5, 60.0], FitDomain::unbounded(), &opts).unwrap_err();
        match err {
            FitError::NonConvergence { iterations, chi2, .. } => {
                assert_eq!(iterations, 1);
                assert!(chi2.is_finite());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn shockley_runaway_towards_a_line_is_not_a_converged_fit() {
        // From these starts the solver can slide towards eta -> inf, where the
        // curve flattens into a line and chi2 barely moves per step.
        let samples = shockley_samples(1e-6, 40.0);
        for guess in [[1e-4, 50.0], [1e-3, 80.0], [1e-3, 60.0]] {
            match fit(&samples, ModelKind::Shockley, &guess, FitDomain::unbounded(), &FitOptions::default()) {
                Err(FitError::NonConvergence { ndf, chi2, .. }) => {
                    assert_eq!(ndf, 14);
                    assert!(!chi2.is_nan());
                }
                Ok(result) if !result.converged => {}
                Ok(result) => {
                    // Exact data: a converged fit must reproduce the generator.
                    assert!(result.chi2 / (result.ndf as f64) < 1e-6, "guess {guess:?}: chi2 = {}", result.chi2);
                    assert_relative_eq!(result.params[1], 40.0, max_relative = 1e-6);
                }
                Err(other) => panic!("guess {guess:?}: unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn shockley_fit_to_straight_line_reports_failure() {
        // No finite eta describes a line through the origin.
        let samples: Vec<Sample> = (1..=12)
            .map(|k| {
                let v = 50.0 * k as f64;
                Sample::new(v, 0.02 * v, 0.0, 0.01)
            })
            .collect();
        match fit(&samples, ModelKind::Shockley, &[1.0, 100.0], FitDomain::unbounded(), &FitOptions::default()) {
            Err(FitError::NonConvergence { ndf, .. }) => assert_eq!(ndf, 10),
            Ok(result) => assert!(!result.converged, "eta = {}", result.params[1]),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn shockley_rejects_bad_guess_shape() {
        let samples = shockley_samples(1e-6, 40.0);
        let err = fit(&samples, ModelKind::Shockley, &[1e-6], FitDomain::unbounded(), &FitOptions::default());
        assert!(matches!(err, Err(FitError::InvalidInitialGuess(_))));
        let err = fit(&samples, ModelKind::Shockley, &[1e-6, 0.0], FitDomain::unbounded(), &FitOptions::default());
        assert!(matches!(err, Err(FitError::InvalidInitialGuess(_))));
    }

    #[test]
    fn fitting_is_deterministic() {
        let samples = shockley_samples(2e-6, 50.0);
        let a = fit(&samples, ModelKind::Shockley, &[1e-6, 45.0], FitDomain::unbounded(), &FitOptions::default()).unwrap();
        let b = fit(&samples, ModelKind::Shockley, &[1e-6, 45.0], FitDomain::unbounded(), &FitOptions::default()).unwrap();
        assert_eq!(a.params, b.params);
        assert_eq!(a.chi2, b.chi2);
        assert_eq!(a.covariance, b.covariance);
    }

    #[test]
    fn effective_variance_inflates_weights_with_x_errors() {
        // Same line, one point has a huge x-error and is pulled off the line.
        let mut samples = line(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0), (3.0, 6.0)], 0.1);
        samples.push(Sample::new(4.0, 20.0, 0.0, 0.1));
        samples[4].sigma_x = 50.0;

        let plain = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &FitOptions::default()).unwrap();
        let opts = FitOptions {
            x_errors: XErrorMode::EffectiveVariance,
            ..FitOptions::default()
        };
        let eff = fit(&samples, ModelKind::Linear, &[], FitDomain::unbounded(), &opts).unwrap();

        assert!((eff.params[1] - 2.0).abs() < (plain.params[1] - 2.0).abs());
        assert!(eff.chi2 < plain.chi2);
    }
}
