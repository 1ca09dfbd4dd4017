//! Shared domain types.
//!
//! These types are kept small and plain so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - passed to the renderers without dragging fit internals along

use std::path::PathBuf;

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::models::predict;

/// One measured point: `(x, y)` with its uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64, sigma_x: f64, sigma_y: f64) -> Self {
        Self {
            x,
            y,
            sigma_x,
            sigma_y,
        }
    }
}

/// Parametric model `y = f(x; θ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `f(x; a, b) = a + b·x`
    Linear,
    /// `f(x; I0, η) = I0·(exp(x/η) − 1)`
    Shockley,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Shockley => "Shockley",
        }
    }

    pub fn formula(self) -> &'static str {
        match self {
            ModelKind::Linear => "a + b*x",
            ModelKind::Shockley => "I0*(exp(x/eta) - 1)",
        }
    }

    pub fn param_count(self) -> usize {
        match self {
            ModelKind::Linear | ModelKind::Shockley => 2,
        }
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Linear => &["a", "b"],
            ModelKind::Shockley => &["I0", "eta"],
        }
    }
}

/// Closed interval of x-values that take part in the fit.
///
/// Samples outside `[min, max]` stay in the dataset (they are still plotted and
/// reported) but do not enter the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitDomain {
    pub min: f64,
    pub max: f64,
}

impl FitDomain {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }

    /// Finite drawing range: the domain clipped to the data's own x-range.
    pub fn clip_to(&self, samples: &[Sample]) -> Option<(f64, f64)> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for s in samples.iter().filter(|s| s.x.is_finite()) {
            lo = lo.min(s.x);
            hi = hi.max(s.x);
        }
        let lo = if self.min.is_finite() { self.min.max(lo) } else { lo };
        let hi = if self.max.is_finite() { self.max.min(hi) } else { hi };
        if lo.is_finite() && hi.is_finite() && hi > lo {
            Some((lo, hi))
        } else {
            None
        }
    }
}

/// How x-uncertainties enter the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum XErrorMode {
    /// Only σy weights the residuals.
    Ignore,
    /// `σ_eff² = σy² + (f'(x)·σx)²`, refined over a few refit passes.
    EffectiveVariance,
}

/// Output of a successful fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub model: ModelKind,
    pub params: Vec<f64>,
    /// Parameter covariance, `|θ| × |θ|`, symmetric.
    pub covariance: DMatrix<f64>,
    /// Weighted residual sum of squares.
    pub chi2: f64,
    /// Samples used minus parameter count.
    pub ndf: usize,
    pub n_used: usize,
    pub iterations: usize,
    /// `false` when the solver stalled close to, but not provably at, a minimum.
    pub converged: bool,
    pub domain: FitDomain,
}

impl FitResult {
    /// Standard errors `sqrt(Σ_ii)`.
    pub fn errors(&self) -> Vec<f64> {
        (0..self.params.len())
            .map(|i| self.covariance[(i, i)].max(0.0).sqrt())
            .collect()
    }

    pub fn chi2_per_ndf(&self) -> Option<f64> {
        if self.ndf >= 1 {
            Some(self.chi2 / self.ndf as f64)
        } else {
            None
        }
    }

    /// Upper-tail chi-square probability of the observed χ² given ndf.
    pub fn probability(&self) -> Option<f64> {
        if self.ndf < 1 || !self.chi2.is_finite() {
            return None;
        }
        if self.chi2 <= 0.0 {
            return Some(1.0);
        }
        let p = statrs::function::gamma::gamma_ur(self.ndf as f64 / 2.0, self.chi2 / 2.0);
        Some(p.clamp(0.0, 1.0))
    }

    pub fn predict(&self, x: f64) -> f64 {
        predict(self.model, x, &self.params)
    }
}

/// A scalar computed from fitted parameters, with delta-method uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedQuantity {
    pub name: String,
    pub value: f64,
    pub sigma: f64,
}

/// Column layout of an input text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColumnLayout {
    /// `x y ex sigma_y`
    Calibration,
    /// `x y` (errors come from a `SigmaConvention`)
    Raw,
}

impl ColumnLayout {
    pub fn min_columns(self) -> usize {
        match self {
            ColumnLayout::Calibration => 4,
            ColumnLayout::Raw => 2,
        }
    }
}

/// y-error model for layouts that carry no error columns.
///
/// `σy = sqrt(absolute² + (relative·|y|)²)`: a fixed floor plus a fraction of
/// the reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmaConvention {
    pub absolute: f64,
    pub relative: f64,
}

impl SigmaConvention {
    pub fn sigma_for(&self, y: f64) -> f64 {
        self.absolute.hypot(self.relative * y.abs())
    }
}

impl Default for SigmaConvention {
    fn default() -> Self {
        Self {
            absolute: 0.001,
            relative: 0.01,
        }
    }
}

/// Which fitting path a dataset goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitPath {
    /// Straight line on the raw data.
    Linear,
    /// Straight line on `ln y`, then `I0 = exp(-a/b)` and `eta*Vt = b`.
    LogLinear,
    /// Shockley model fitted directly.
    Exponential,
}

impl FitPath {
    /// Model fitted along this path; the log-linear path fits a line to `ln y`.
    pub fn model(self) -> ModelKind {
        match self {
            FitPath::Linear | FitPath::LogLinear => ModelKind::Linear,
            FitPath::Exponential => ModelKind::Shockley,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FitPath::Linear => "linear",
            FitPath::LogLinear => "fit su ln(I)",
            FitPath::Exponential => "Shockley",
        }
    }
}

/// Colour names understood by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotColor {
    Blue,
    Green,
    Red,
}

/// One dataset plus everything needed to fit and draw it.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Short identifier (`calibration`, `silicon`, ...).
    pub id: String,
    pub title: String,
    pub file: PathBuf,
    pub layout: ColumnLayout,
    pub path: FitPath,
    pub domain: FitDomain,
    /// Starting point for iterative fits. `None` lets the pipeline pick one.
    pub initial_guess: Option<Vec<f64>>,
    pub marker: PlotColor,
    pub line: PlotColor,
    pub x_label: String,
    pub y_label: String,
}
