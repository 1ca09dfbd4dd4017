//! Model evaluation for the linear and Shockley models.
//!
//! The fitter relies on three primitive operations:
//! - predict `f(x; θ)` (residuals, plots, exports)
//! - fill a Jacobian row `∂f/∂θ_j` at `x` (normal equations, covariance)
//! - the x-slope `∂f/∂x` (effective-variance weighting of x-errors)
//!
//! `is_identifiable` flags parameter points where the data cannot tell the
//! parameters apart any more.
//!
//! Parameter order follows `ModelKind::param_names`.

use crate::domain::ModelKind;

/// Smallest `max|x| / |η|` at which the Shockley curvature is still visible.
const SHOCKLEY_MIN_CURVATURE: f64 = 1e-3;

/// Predict `f(x; θ)`.
pub fn predict(model: ModelKind, x: f64, params: &[f64]) -> f64 {
    match model {
        ModelKind::Linear => params[0] + params[1] * x,
        // `exp(u) - 1` via `exp_m1` keeps precision for small forward bias.
        ModelKind::Shockley => params[0] * (x / params[1]).exp_m1(),
    }
}

/// Fill `out` with `∂f/∂θ_j` at `x`.
///
/// # Panics
/// Panics if `out` or `params` are shorter than `model.param_count()`.
pub fn fill_jacobian_row(model: ModelKind, x: f64, params: &[f64], out: &mut [f64]) {
    match model {
        ModelKind::Linear => {
            out[0] = 1.0;
            out[1] = x;
        }
        ModelKind::Shockley => {
            let (i0, eta) = (params[0], params[1]);
            let u = x / eta;
            out[0] = u.exp_m1();
            out[1] = -i0 * u.exp() * u / eta;
        }
    }
}

/// `∂f/∂x` at `x`.
pub fn slope(model: ModelKind, x: f64, params: &[f64]) -> f64 {
    match model {
        ModelKind::Linear => params[1],
        ModelKind::Shockley => params[0] / params[1] * (x / params[1]).exp(),
    }
}

/// Whether `params` still pin down every parameter over `|x| <= x_max`.
///
/// As η grows the Shockley curve flattens into the line `(I0/η)·x` and only
/// the ratio `I0/η` stays constrained.
pub fn is_identifiable(model: ModelKind, x_max: f64, params: &[f64]) -> bool {
    match model {
        ModelKind::Linear => params.iter().all(|p| p.is_finite()),
        ModelKind::Shockley => {
            params[0].is_finite() && (x_max / params[1]).abs() >= SHOCKLEY_MIN_CURVATURE
        }
    }
}
