//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - runs the scenario pipeline
//! - prints reports/plots
//! - writes optional exports

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, GenericFitArgs, OutputArgs, PlotArgs, ScenarioArgs, SynthArgs};
use crate::data::{SynthConfig, generate_dataset};
use crate::domain::{FitDomain, FitPath, PlotColor, Scenario, SigmaConvention, XErrorMode};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::io::{FitReportFile, ScenarioReport, read_fit_report, write_dataset, write_fit_report, write_residuals_csv};
use crate::plot::{ChartPanel, ChartStyle, render_ascii_curve, render_ascii_plot, render_svg};
use crate::report::{format_failure, format_fit_report, format_ingest_summary};

pub mod pipeline;
pub mod scenario;

use pipeline::{RunConfig, ScenarioRun};
use scenario::Preset;

/// Environment variable naming the default data directory.
pub const DATA_DIR_ENV: &str = "DIODE_FIT_DATA_DIR";

const SUBCOMMANDS: [&str; 8] = ["calibration", "silicon", "germanium", "all", "fit", "synth", "plot", "help"];

/// Entry point for the `diode-fit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is the normal case.
    dotenvy::dotenv().ok();

    // `diode-fit` with no subcommand runs the whole analysis, like `diode-fit all`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);

    let _ = tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Command::Calibration(args) => handle_presets(&[Preset::Calibration], args),
        Command::Silicon(args) => handle_presets(&[Preset::Silicon], args),
        Command::Germanium(args) => handle_presets(&[Preset::Germanium], args),
        Command::All(args) => handle_presets(&Preset::ALL, args),
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_presets(presets: &[Preset], args: ScenarioArgs) -> Result<(), AppError> {
    let data_dir = resolve_data_dir(args.data_dir);
    info!(data_dir = %data_dir.display(), "resolved data directory");
    let scenarios: Vec<Scenario> = presets.iter().map(|p| p.scenario(&data_dir, args.model.path())).collect();
    run_and_report(&scenarios, &args.output)
}

fn handle_fit(args: GenericFitArgs) -> Result<(), AppError> {
    let scenario = generic_scenario(&args)?;
    run_and_report(&[scenario], &args.output)
}

fn run_and_report(scenarios: &[Scenario], output: &OutputArgs) -> Result<(), AppError> {
    let config = run_config(output)?;
    let runs = pipeline::run_scenarios(scenarios, &config);

    for run in &runs {
        if !run.ingest.row_errors.is_empty() {
            eprint!("{}: {}", run.scenario.id, format_ingest_summary(&run.ingest, 5));
        }
        match &run.outcome {
            Ok(done) => {
                println!("{}", format_fit_report(&run.scenario, &done.fit, &done.derived));
                if !output.no_plot {
                    println!("{}", render_ascii_plot(&run.fit_samples, &done.fit, output.width, output.height));
                }
            }
            Err(err) => eprintln!("{}", format_failure(&run.scenario, err)),
        }
    }

    let succeeded: Vec<&ScenarioRun> = runs.iter().filter(|r| r.outcome.is_ok()).collect();
    if succeeded.is_empty() {
        return Err(AppError::new(3, "No scenario produced a fit."));
    }

    write_exports(&succeeded, output)
}

fn write_exports(runs: &[&ScenarioRun], output: &OutputArgs) -> Result<(), AppError> {
    let fitted: Vec<(&ScenarioRun, &pipeline::FittedScenario)> =
        runs.iter().filter_map(|r| r.outcome.as_ref().ok().map(|done| (*r, done))).collect();

    if let Some(path) = &output.svg {
        let panels: Vec<ChartPanel> = fitted
            .iter()
            .map(|(run, done)| ChartPanel {
                title: run.scenario.title.clone(),
                x_label: run.scenario.x_label.clone(),
                y_label: run.scenario.y_label.clone(),
                samples: run.fit_samples.clone(),
                marker: run.scenario.marker,
                curve: ChartPanel::curve_from_fit(&done.fit, &run.fit_samples, 200),
                fit_label: done.fit.model.formula().to_string(),
            })
            .collect();
        let style = ChartStyle {
            line_color: fitted.first().map(|(run, _)| run.scenario.line).unwrap_or(PlotColor::Red),
            ..ChartStyle::default()
        };
        render_svg(path, &panels, &style)?;
        info!(path = %path.display(), panels = panels.len(), "wrote SVG chart");
    }

    if let Some(path) = &output.export_residuals {
        let sections: Vec<(&str, &[_])> = fitted
            .iter()
            .map(|(run, done)| (run.scenario.id.as_str(), done.residuals.as_slice()))
            .collect();
        write_residuals_csv(path, &sections)?;
        info!(path = %path.display(), "wrote residual CSV");
    }

    if let Some(path) = &output.export_report {
        let reports = fitted
            .iter()
            .map(|(run, done)| ScenarioReport::new(&run.scenario, &done.fit, &done.derived, &run.fit_samples))
            .collect();
        write_fit_report(path, &FitReportFile::new(reports))?;
        info!(path = %path.display(), "wrote fit report");
    }

    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SynthConfig {
        model: args.model,
        params: args.params,
        points: args.points,
        x_min: args.x_min,
        x_max: args.x_max,
        noise: SigmaConvention {
            absolute: args.noise_abs,
            relative: args.noise,
        },
        sigma_x: args.sigma_x,
        seed: args.seed,
    };
    let samples = generate_dataset(&config)?;
    write_dataset(&args.out, &samples, args.layout)?;
    info!(path = %args.out.display(), seed = args.seed, "wrote synthetic dataset");
    println!("Wrote {} samples to {}", samples.len(), args.out.display());
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let report = read_fit_report(&args.report)?;
    let selected: Vec<&ScenarioReport> = report
        .scenarios
        .iter()
        .filter(|s| args.scenario.as_deref().is_none_or(|id| s.scenario == id))
        .collect();
    if selected.is_empty() {
        return Err(AppError::new(2, "No matching scenario in the fit report."));
    }

    for s in &selected {
        println!("\n>>> {} ({})", s.title, s.data_file);
        println!("{}", render_ascii_curve(&s.curve_points(), &[], args.width, args.height));
    }

    if let Some(path) = &args.svg {
        let panels: Vec<ChartPanel> = selected
            .iter()
            .map(|s| ChartPanel {
                title: s.title.clone(),
                x_label: s.x_label.clone(),
                y_label: s.y_label.clone(),
                samples: Vec::new(),
                marker: PlotColor::Blue,
                curve: s.curve_points(),
                fit_label: s.formula.clone(),
            })
            .collect();
        render_svg(path, &panels, &ChartStyle::default())?;
    }
    Ok(())
}

fn run_config(output: &OutputArgs) -> Result<RunConfig, AppError> {
    let sigma = SigmaConvention {
        absolute: output.sigma_y_abs,
        relative: output.sigma_y_rel,
    };
    let ok = |v: f64| v.is_finite() && v >= 0.0;
    if !(ok(sigma.absolute) && ok(sigma.relative)) || sigma.absolute + sigma.relative == 0.0 {
        return Err(AppError::new(
            2,
            "`--sigma-y-abs` and `--sigma-y-rel` must be non-negative and not both zero.",
        ));
    }
    if output.max_iterations == 0 {
        return Err(AppError::new(2, "`--max-iterations` must be > 0."));
    }

    Ok(RunConfig {
        sigma,
        fit_options: FitOptions {
            max_iterations: output.max_iterations,
            x_errors: if output.x_errors {
                XErrorMode::EffectiveVariance
            } else {
                XErrorMode::Ignore
            },
            ..FitOptions::default()
        },
    })
}

fn generic_scenario(args: &GenericFitArgs) -> Result<Scenario, AppError> {
    let min = args.min.unwrap_or(f64::NEG_INFINITY);
    let max = args.max.unwrap_or(f64::INFINITY);
    if min.is_nan() || max.is_nan() || min > max {
        return Err(AppError::new(2, format!("Invalid fit domain [{min}, {max}].")));
    }

    let title = args.title.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fit".to_string())
    });
    let y_label = if args.model == FitPath::LogLinear {
        format!("ln {}", args.y_label)
    } else {
        args.y_label.clone()
    };

    Ok(Scenario {
        id: "fit".to_string(),
        title,
        file: args.file.clone(),
        layout: args.layout,
        path: args.model,
        domain: FitDomain::new(min, max),
        initial_guess: args.p0.clone(),
        marker: PlotColor::Blue,
        line: PlotColor::Red,
        x_label: args.x_label.clone(),
        y_label,
    })
}

/// `--data-dir`, then `$DIODE_FIT_DATA_DIR`, then the working directory.
fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}

/// Rewrite argv so `diode-fit` defaults to `diode-fit all`.
///
/// Rules:
/// - `diode-fit`                    -> `diode-fit all`
/// - `diode-fit --no-plot ...`      -> `diode-fit all --no-plot ...`
/// - `diode-fit --help/--version`   -> unchanged
/// - any argv naming a subcommand   -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let rest = argv.get(1..).unwrap_or_default();
    let top_level_info = rest
        .iter()
        .any(|a| matches!(a.as_str(), "-h" | "--help" | "-V" | "--version"));
    let has_subcommand = rest.iter().any(|a| SUBCOMMANDS.contains(&a.as_str()));
    if top_level_info || has_subcommand {
        return argv;
    }

    let at = 1.min(argv.len());
    argv.insert(at, "all".to_string());
    argv
}
