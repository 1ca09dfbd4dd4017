//! Command-line parsing for the diode/calibration fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! command dispatch (`app`) and from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{ColumnLayout, FitPath, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "diode-fit", version, about = "Diode and calibration curve fitter")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the calibration data (multimeter vs oscilloscope) with a straight line.
    Calibration(ScenarioArgs),
    /// Fit the silicon diode I-V curve.
    Silicon(ScenarioArgs),
    /// Fit the germanium diode I-V curve.
    Germanium(ScenarioArgs),
    /// Run calibration, silicon and germanium together (the default).
    All(ScenarioArgs),
    /// Fit an arbitrary data file.
    Fit(GenericFitArgs),
    /// Write a seeded synthetic dataset.
    Synth(SynthArgs),
    /// Plot the fitted grids stored in a fit report JSON.
    Plot(PlotArgs),
}

/// How the diode scenarios are fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiodeModel {
    /// Straight line on ln(I).
    LogLinear,
    /// Shockley equation fitted directly.
    Exponential,
}

impl DiodeModel {
    pub fn path(self) -> FitPath {
        match self {
            DiodeModel::LogLinear => FitPath::LogLinear,
            DiodeModel::Exponential => FitPath::Exponential,
        }
    }
}

/// Options for the preset scenarios.
#[derive(Debug, Args, Clone)]
pub struct ScenarioArgs {
    /// Directory holding dati_*.txt (default: $DIODE_FIT_DATA_DIR, then `.`).
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Fitting path for the diode scenarios.
    #[arg(long, value_enum, default_value_t = DiodeModel::LogLinear)]
    pub model: DiodeModel,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for `fit` on an arbitrary file.
#[derive(Debug, Args, Clone)]
pub struct GenericFitArgs {
    /// Whitespace-separated data file.
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Column layout of the file.
    #[arg(long, value_enum, default_value_t = ColumnLayout::Raw)]
    pub layout: ColumnLayout,

    /// Model / fitting path.
    #[arg(long, value_enum, default_value_t = FitPath::Linear)]
    pub model: FitPath,

    /// Lower edge of the fit domain (inclusive).
    #[arg(long, allow_hyphen_values = true)]
    pub min: Option<f64>,

    /// Upper edge of the fit domain (inclusive).
    #[arg(long, allow_hyphen_values = true)]
    pub max: Option<f64>,

    /// Initial guess for the exponential model, e.g. `--p0 1e-6,45`.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_name = "I0,ETA")]
    pub p0: Option<Vec<f64>>,

    /// Title used in the report and chart.
    #[arg(long)]
    pub title: Option<String>,

    /// x-axis label.
    #[arg(long, default_value = "x")]
    pub x_label: String,

    /// y-axis label.
    #[arg(long, default_value = "y")]
    pub y_label: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Fit tuning, terminal plot and export options shared by every fitting command.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Absolute y-error floor for files without error columns.
    #[arg(long, default_value_t = 0.001)]
    pub sigma_y_abs: f64,

    /// Relative y-error (fraction of the reading) for files without error columns.
    #[arg(long, default_value_t = 0.01)]
    pub sigma_y_rel: f64,

    /// Fold x-errors into the weights (effective variance).
    #[arg(long)]
    pub x_errors: bool,

    /// Iteration budget for the exponential fit.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Write an SVG chart with one panel per scenario.
    #[arg(long, value_name = "SVG")]
    pub svg: Option<PathBuf>,

    /// Export per-sample residuals and pulls to CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,

    /// Export the fit report (parameters, covariance, fitted grid) to JSON.
    #[arg(long = "export-report", value_name = "JSON")]
    pub export_report: Option<PathBuf>,
}

/// Options for `synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Generating model.
    #[arg(long, value_enum, default_value_t = ModelKind::Shockley)]
    pub model: ModelKind,

    /// True parameters, e.g. `--params 2e-6,45` (I0, eta) or `--params 0.5,1.02` (a, b).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub params: Vec<f64>,

    /// Number of points.
    #[arg(long, default_value_t = 20)]
    pub points: usize,

    #[arg(long, default_value_t = 400.0, allow_hyphen_values = true)]
    pub x_min: f64,

    #[arg(long, default_value_t = 700.0, allow_hyphen_values = true)]
    pub x_max: f64,

    /// Absolute y-noise floor.
    #[arg(long, default_value_t = 0.001)]
    pub noise_abs: f64,

    /// Relative y-noise (fraction of the reading).
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// x jitter (written as the x-error column in the calibration layout).
    #[arg(long, default_value_t = 0.0)]
    pub sigma_x: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Column layout of the output file.
    #[arg(long, value_enum, default_value_t = ColumnLayout::Raw)]
    pub layout: ColumnLayout,

    /// Output file.
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,
}

/// Options for plotting a saved fit report.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Fit report JSON produced by `--export-report`.
    #[arg(long, value_name = "JSON")]
    pub report: PathBuf,

    /// Only plot this scenario id.
    #[arg(long)]
    pub scenario: Option<String>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Also write the curves to an SVG chart.
    #[arg(long, value_name = "SVG")]
    pub svg: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generic_fit() {
        let cli = Cli::parse_from([
            "diode-fit",
            "--log-level",
            "info",
            "fit",
            "--file",
            "d.txt",
            "--model",
            "exponential",
            "--min",
            "-5",
            "--p0",
            "1e-6,45",
            "--x-errors",
        ]);
        assert_eq!(cli.log_level, tracing::Level::INFO);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model, FitPath::Exponential);
        assert_eq!(args.min, Some(-5.0));
        assert_eq!(args.p0, Some(vec![1e-6, 45.0]));
        assert!(args.output.x_errors);
        assert_eq!(args.layout, ColumnLayout::Raw);
    }

    #[test]
    fn diode_model_defaults_to_log_linear() {
        let cli = Cli::parse_from(["diode-fit", "silicon", "--no-plot"]);
        let Command::Silicon(args) = cli.command else {
            panic!("expected silicon");
        };
        assert_eq!(args.model.path(), FitPath::LogLinear);
        assert!(args.output.no_plot);
        assert_eq!(cli.log_level, tracing::Level::WARN);
    }
}
