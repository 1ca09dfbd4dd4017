//! Export per-sample residuals to CSV.
//!
//! One row per sample, all scenarios in one file, so the export drops straight
//! into a spreadsheet or a pandas/ROOT script.

use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::report::SampleResidual;

#[derive(Debug, Serialize)]
struct ResidualRow<'a> {
    scenario: &'a str,
    x: f64,
    y: f64,
    sigma_x: f64,
    sigma_y: f64,
    y_fit: f64,
    residual: f64,
    pull: f64,
    in_domain: bool,
}

/// Write `(scenario id, residuals)` sections to a single CSV file.
pub fn write_residuals_csv(path: &Path, sections: &[(&str, &[SampleResidual])]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(4, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for &(scenario, residuals) in sections {
        for r in residuals {
            writer
                .serialize(ResidualRow {
                    scenario,
                    x: r.x,
                    y: r.y,
                    sigma_x: r.sigma_x,
                    sigma_y: r.sigma_y,
                    y_fit: r.y_fit,
                    residual: r.residual,
                    pull: r.pull,
                    in_domain: r.in_domain,
                })
                .map_err(|e| AppError::new(4, format!("Failed to write export CSV row: {e}")))?;
        }
    }

    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to write export CSV '{}': {e}", path.display())))?;
    Ok(())
}
