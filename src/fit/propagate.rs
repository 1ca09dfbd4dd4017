//! First-order (delta-method) propagation of parameter uncertainty.
//!
//! For a scalar `g(θ)` and parameter covariance `Σ`:
//!
//! ```text
//! σ_g² = Σ_i Σ_j (∂g/∂θ_i)(∂g/∂θ_j) Σ_ij
//! ```

use nalgebra::{DMatrix, DVector};

use crate::domain::DerivedQuantity;

/// Propagate through `g` using central-difference partials.
pub fn propagate<G>(name: &str, g: G, params: &[f64], covariance: &DMatrix<f64>) -> DerivedQuantity
where
    G: Fn(&[f64]) -> f64,
{
    let value = g(params);
    let gradient = numeric_gradient(&g, params);
    propagate_with_gradient(name, value, &gradient, covariance)
}

/// Propagate with analytic partials `∂g/∂θ_i`.
pub fn propagate_with_gradient(name: &str, value: f64, gradient: &[f64], covariance: &DMatrix<f64>) -> DerivedQuantity {
    let grad = DVector::from_row_slice(gradient);
    let variance = (grad.transpose() * covariance * &grad)[(0, 0)];
    // Round-off can push a zero variance slightly negative.
    let sigma = if variance.is_finite() && variance > 0.0 { variance.sqrt() } else { 0.0 };
    DerivedQuantity {
        name: name.to_string(),
        value,
        sigma,
    }
}

fn numeric_gradient<G>(g: &G, params: &[f64]) -> Vec<f64>
where
    G: Fn(&[f64]) -> f64,
{
    // Optimal central-difference step for smooth g: ~cbrt(eps) relative.
    let rel = f64::EPSILON.cbrt();
    let mut work = params.to_vec();
    (0..params.len())
        .map(|i| {
            let h = if params[i] != 0.0 { rel * params[i].abs() } else { rel };
            work[i] = params[i] + h;
            let up = g(&work);
            work[i] = params[i] - h;
            let down = g(&work);
            work[i] = params[i];
            (up - down) / (2.0 * h)
        })
        .collect()
}
