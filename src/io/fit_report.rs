//! Read/write fit report JSON files.
//!
//! The fit report is the portable record of a run:
//! - tool name/version and generation timestamp
//! - per scenario: model, domain, parameters with errors, covariance,
//!   goodness of fit, derived quantities
//! - a precomputed 101-point fitted grid for quick re-plotting (`plot --report`)
//!
//! Infinite domain bounds are stored as `null`.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DerivedQuantity, FitPath, FitResult, ModelKind, Sample, Scenario};
use crate::error::AppError;

pub const GRID_POINTS: usize = 101;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReportFile {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl FitReportFile {
    pub fn new(scenarios: Vec<ScenarioReport>) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            scenarios,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub title: String,
    pub data_file: String,
    pub path: FitPath,
    pub model: ModelKind,
    pub formula: String,
    pub domain_min: Option<f64>,
    pub domain_max: Option<f64>,
    pub x_label: String,
    pub y_label: String,
    pub params: Vec<ParamEstimate>,
    pub covariance: Vec<Vec<f64>>,
    pub chi2: f64,
    pub ndf: usize,
    pub chi2_per_ndf: Option<f64>,
    pub p_value: Option<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub n_used: usize,
    pub derived: Vec<DerivedQuantity>,
    pub grid: CurveGrid,
}

impl ScenarioReport {
    /// `samples` are the points the fit saw; they bound the grid when the
    /// domain is wider than the data.
    pub fn new(scenario: &Scenario, fit: &FitResult, derived: &[DerivedQuantity], samples: &[Sample]) -> Self {
        let errors = fit.errors();
        let params = fit
            .model
            .param_names()
            .iter()
            .zip(fit.params.iter().zip(errors))
            .map(|(name, (&value, error))| ParamEstimate {
                name: name.to_string(),
                value,
                error,
            })
            .collect();
        let covariance = fit.covariance.row_iter().map(|row| row.iter().copied().collect()).collect();
        let finite = |v: f64| v.is_finite().then_some(v);

        Self {
            scenario: scenario.id.clone(),
            title: scenario.title.clone(),
            data_file: scenario.file.display().to_string(),
            path: scenario.path,
            model: fit.model,
            formula: fit.model.formula().to_string(),
            domain_min: finite(fit.domain.min),
            domain_max: finite(fit.domain.max),
            x_label: scenario.x_label.clone(),
            y_label: scenario.y_label.clone(),
            params,
            covariance,
            chi2: fit.chi2,
            ndf: fit.ndf,
            chi2_per_ndf: fit.chi2_per_ndf(),
            p_value: fit.probability(),
            converged: fit.converged,
            iterations: fit.iterations,
            n_used: fit.n_used,
            derived: derived.to_vec(),
            grid: build_grid(fit, samples, GRID_POINTS),
        }
    }

    pub fn curve_points(&self) -> Vec<(f64, f64)> {
        self.grid.x.iter().copied().zip(self.grid.y.iter().copied()).collect()
    }
}

/// Write a fit report JSON file.
pub fn write_fit_report(path: &Path, report: &FitReportFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create fit report '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::new(4, format!("Failed to write fit report JSON: {e}")))?;

    Ok(())
}

/// Read a fit report JSON file.
pub fn read_fit_report(path: &Path) -> Result<FitReportFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit report '{}': {e}", path.display())))?;
    let report: FitReportFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit report JSON: {e}")))?;
    Ok(report)
}

fn build_grid(fit: &FitResult, samples: &[Sample], n: usize) -> CurveGrid {
    let n = n.max(2);
    let (x0, x1) = fit.domain.clip_to(samples).unwrap_or_else(|| {
        if fit.domain.min.is_finite() && fit.domain.max.is_finite() && fit.domain.max > fit.domain.min {
            (fit.domain.min, fit.domain.max)
        } else {
            (0.0, 1.0)
        }
    });

    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let xi = x0 + u * (x1 - x0);
        let yi = fit.predict(xi);
        // JSON has no representation for inf/NaN.
        if yi.is_finite() {
            x.push(xi);
            y.push(yi);
        }
    }

    CurveGrid { x, y }
}
