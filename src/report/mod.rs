//! Reporting utilities: residuals, pulls, and formatted terminal output.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{FitResult, Sample};

/// One sample compared against the fitted curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleResidual {
    pub x: f64,
    pub y: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub y_fit: f64,
    pub residual: f64,
    /// `residual / σy`; NaN when σy is not positive.
    ///
    /// Always the measured σy, also when the fit was weighted with the
    /// effective variance from x-errors.
    pub pull: f64,
    pub in_domain: bool,
}

/// Fitted value, residual and pull for every sample, in input order.
///
/// Samples outside the fit domain are included and flagged.
pub fn compute_residuals(samples: &[Sample], fit: &FitResult) -> Vec<SampleResidual> {
    samples
        .iter()
        .map(|s| {
            let y_fit = fit.predict(s.x);
            let residual = s.y - y_fit;
            let pull = if s.sigma_y > 0.0 { residual / s.sigma_y } else { f64::NAN };
            SampleResidual {
                x: s.x,
                y: s.y,
                sigma_x: s.sigma_x,
                sigma_y: s.sigma_y,
                y_fit,
                residual,
                pull,
                in_domain: fit.domain.contains(s.x),
            }
        })
        .collect()
}
