//! Diode-specific steps around the generic fitter.
//!
//! Log-linearization turns `I = I0·exp(V/ηVt)` into a straight line:
//!
//! ```text
//! ln I = a + b·V,   σ_ln I = σ_I / I
//! ```
//!
//! Points with `I <= 0` (or non-finite I) have no logarithm and are dropped.
//! The `σ/I` weighting is a first-order approximation and is biased near `I ≈ 0`;
//! that bias is accepted.
//!
//! From the line we report the lab quantities as the bench macro always did:
//! `eta*Vt = b` and `I0 = exp(-a/b)`. The slope is *not* split into η and Vt.

use crate::domain::{DerivedQuantity, FitResult, ModelKind, Sample};
use crate::error::FitError;
use crate::fit::propagate::propagate_with_gradient;

/// Map each sample with finite `y > 0` to `(x, ln y, σx, σy / y)`.
pub fn log_linearize(samples: &[Sample]) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| s.y.is_finite() && s.y > 0.0)
        .map(|s| Sample::new(s.x, s.y.ln(), s.sigma_x, s.sigma_y / s.y))
        .collect()
}

/// Quantities derived from the straight-line fit on `ln I`.
///
/// Returns, in order: intercept `a`, slope `b`, `eta*Vt = b`, `I0 = exp(-a/b)`.
pub fn log_linear_quantities(fit: &FitResult) -> Result<Vec<DerivedQuantity>, FitError> {
    if fit.model != ModelKind::Linear {
        return Err(FitError::DegenerateDerivation(format!(
            "I0 from a {} fit (expected a straight line on ln I)",
            fit.model.display_name()
        )));
    }
    let (a, b) = (fit.params[0], fit.params[1]);
    let errors = fit.errors();
    if b == 0.0 {
        return Err(FitError::DegenerateDerivation("I0 = exp(-a/b): slope b is zero".to_string()));
    }

    let i0 = (-a / b).exp();
    let gradient = [-i0 / b, a * i0 / (b * b)];
    let saturation = propagate_with_gradient("I0 = exp(-a/etaVt)", i0, &gradient, &fit.covariance);

    Ok(vec![
        DerivedQuantity {
            name: "a (intercetta lnI)".to_string(),
            value: a,
            sigma: errors[0],
        },
        DerivedQuantity {
            name: "b (pendenza)".to_string(),
            value: b,
            sigma: errors[1],
        },
        DerivedQuantity {
            name: "eta*Vt = b".to_string(),
            value: b,
            sigma: errors[1],
        },
        saturation,
    ])
}

/// Quantities reported for a direct Shockley fit: `I0` and `eta*Vt` straight from θ̂.
pub fn shockley_quantities(fit: &FitResult) -> Result<Vec<DerivedQuantity>, FitError> {
    if fit.model != ModelKind::Shockley {
        return Err(FitError::DegenerateDerivation(format!(
            "Shockley parameters from a {} fit",
            fit.model.display_name()
        )));
    }
    let errors = fit.errors();
    Ok(vec![
        DerivedQuantity {
            name: "I0".to_string(),
            value: fit.params[0],
            sigma: errors[0],
        },
        DerivedQuantity {
            name: "eta*Vt".to_string(),
            value: fit.params[1],
            sigma: errors[1],
        },
    ])
}

/// Starting point for a direct Shockley fit taken from a line on `ln I`.
///
/// For `I ≫ I0`, `ln I ≈ ln I0 + V/η`, so `I0 ≈ exp(a)` and `η ≈ 1/b`.
pub fn shockley_guess_from_line(fit: &FitResult) -> Option<[f64; 2]> {
    let (a, b) = (fit.params[0], fit.params[1]);
    let guess = [a.exp(), 1.0 / b];
    if guess.iter().all(|v| v.is_finite()) && b != 0.0 {
        Some(guess)
    } else {
        None
    }
}
