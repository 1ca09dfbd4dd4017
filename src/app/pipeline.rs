//! Shared "scenario pipeline": load -> transform -> fit -> derive -> residuals.
//!
//! Keeping this in one place lets every command (presets, `all`, generic `fit`)
//! run the same workflow, while `app` focuses on presentation.
//!
//! A failed fit is a value here (`ScenarioRun::outcome`), not an early return:
//! one bad dataset must not stop the others.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{DerivedQuantity, FitPath, FitResult, ModelKind, Sample, Scenario, SigmaConvention};
use crate::error::FitError;
use crate::fit::{FitOptions, fit, log_linear_quantities, log_linearize, shockley_guess_from_line, shockley_quantities};
use crate::io::ingest::{IngestedData, load_dataset};
use crate::report::{SampleResidual, compute_residuals};

/// Settings shared by every scenario of a run.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub sigma: SigmaConvention,
    pub fit_options: FitOptions,
}

/// A successful fit with everything needed to report it.
#[derive(Debug, Clone)]
pub struct FittedScenario {
    pub fit: FitResult,
    pub derived: Vec<DerivedQuantity>,
    pub residuals: Vec<SampleResidual>,
}

/// All computed outputs for one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub scenario: Scenario,
    pub ingest: IngestedData,
    /// Points the fit saw: `ln y` on the log-linear path, raw samples otherwise.
    pub fit_samples: Vec<Sample>,
    pub outcome: Result<FittedScenario, FitError>,
}

/// Run independent scenarios in parallel; results keep the input order.
pub fn run_scenarios(scenarios: &[Scenario], config: &RunConfig) -> Vec<ScenarioRun> {
    scenarios.par_iter().map(|s| run_scenario(s, config)).collect()
}

/// Load the scenario's file and fit it.
pub fn run_scenario(scenario: &Scenario, config: &RunConfig) -> ScenarioRun {
    let ingest = load_dataset(&scenario.file, scenario.layout, config.sigma);
    info!(
        scenario = %scenario.id,
        file = %scenario.file.display(),
        rows_read = ingest.rows_read,
        rows_used = ingest.rows_used(),
        "loaded dataset"
    );
    for e in &ingest.row_errors {
        warn!(scenario = %scenario.id, line = e.line, "skipped row: {}", e.message);
    }

    let (fit_samples, outcome) = fit_scenario(scenario, &ingest.samples, &config.fit_options);
    match &outcome {
        Ok(done) => info!(
            scenario = %scenario.id,
            model = done.fit.model.display_name(),
            chi2 = done.fit.chi2,
            ndf = done.fit.ndf,
            iterations = done.fit.iterations,
            converged = done.fit.converged,
            "fit finished"
        ),
        Err(err) => warn!(scenario = %scenario.id, "fit failed: {err}"),
    }

    ScenarioRun {
        scenario: scenario.clone(),
        ingest,
        fit_samples,
        outcome,
    }
}

/// Fit already-loaded samples along the scenario's path.
pub fn fit_scenario(
    scenario: &Scenario,
    samples: &[Sample],
    options: &FitOptions,
) -> (Vec<Sample>, Result<FittedScenario, FitError>) {
    match scenario.path {
        FitPath::Linear => {
            let outcome =
                fit(samples, scenario.path.model(), &[], scenario.domain, options).map(|fit| finish(fit, Vec::new(), samples));
            (samples.to_vec(), outcome)
        }
        FitPath::LogLinear => {
            let logs = log_linearize(samples);
            if logs.len() < samples.len() {
                debug!(
                    scenario = %scenario.id,
                    dropped = samples.len() - logs.len(),
                    "dropped samples with y <= 0 before ln"
                );
            }
            let outcome = fit(&logs, scenario.path.model(), &[], scenario.domain, options)
                .and_then(|fit| log_linear_quantities(&fit).map(|derived| finish(fit, derived, &logs)));
            (logs, outcome)
        }
        FitPath::Exponential => {
            let outcome = shockley_start(scenario, samples, options)
                .and_then(|guess| fit(samples, scenario.path.model(), &guess, scenario.domain, options))
                .and_then(|fit| shockley_quantities(&fit).map(|derived| finish(fit, derived, samples)));
            (samples.to_vec(), outcome)
        }
    }
}

/// Explicit guess if the scenario has one, else the log-linear estimate.
fn shockley_start(scenario: &Scenario, samples: &[Sample], options: &FitOptions) -> Result<Vec<f64>, FitError> {
    if let Some(guess) = &scenario.initial_guess {
        return Ok(guess.clone());
    }
    let line = fit(&log_linearize(samples), ModelKind::Linear, &[], scenario.domain, options)?;
    let guess = shockley_guess_from_line(&line).ok_or_else(|| {
        FitError::InvalidInitialGuess("log-linear pre-fit gave no usable starting point".to_string())
    })?;
    debug!(scenario = %scenario.id, i0 = guess[0], eta = guess[1], "initial guess from ln(I) fit");
    Ok(guess.to_vec())
}

fn finish(fit: FitResult, derived: Vec<DerivedQuantity>, samples: &[Sample]) -> FittedScenario {
    let residuals = compute_residuals(samples, &fit);
    FittedScenario { fit, derived, residuals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnLayout, FitDomain, PlotColor};
    use crate::models::predict;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn scenario(path: FitPath, file: PathBuf) -> Scenario {
        Scenario {
            id: "test".to_string(),
            title: "Test".to_string(),
            file,
            layout: ColumnLayout::Raw,
            path,
            domain: FitDomain::new(0.0, 1000.0),
            initial_guess: None,
            marker: PlotColor::Blue,
            line: PlotColor::Red,
            x_label: "V".to_string(),
            y_label: "I".to_string(),
        }
    }

    fn diode_samples() -> Vec<Sample> {
        (0..16)
            .map(|k| {
                let v = 400.0 + 20.0 * k as f64;
                let i = predict(ModelKind::Shockley, v, &[2e-6, 45.0]);
                Sample::new(v, i, 0.0, 0.01 * i)
            })
            .collect()
    }

    #[test]
    fn log_linear_path_reports_lab_quantities() {
        let mut samples = diode_samples();
        samples.push(Sample::new(0.0, 0.0, 0.0, 0.001));
        let s = scenario(FitPath::LogLinear, PathBuf::new());
        let (seen, outcome) = fit_scenario(&s, &samples, &FitOptions::default());
        let done = outcome.unwrap();

        assert_eq!(seen.len(), 16);
        assert_eq!(done.derived.len(), 4);
        assert_eq!(done.derived[2].name, "eta*Vt = b");
        // ln I ≈ ln I0 + V/η far above I0
        assert_relative_eq!(done.fit.params[1], 1.0 / 45.0, max_relative = 1e-3);
        assert_eq!(done.residuals.len(), 16);
    }

    #[test]
    fn exponential_path_starts_from_log_fit() {
        let s = scenario(FitPath::Exponential, PathBuf::new());
        let (_, outcome) = fit_scenario(&s, &diode_samples(), &FitOptions::default());
        let done = outcome.unwrap();

        assert_eq!(done.fit.model, ModelKind::Shockley);
        assert_relative_eq!(done.fit.params[0], 2e-6, max_relative = 1e-6);
        assert_relative_eq!(done.fit.params[1], 45.0, max_relative = 1e-6);
        assert_eq!(done.derived[0].name, "I0");
    }

    #[test]
    fn bad_explicit_guess_is_reported() {
        let mut s = scenario(FitPath::Exponential, PathBuf::new());
        s.initial_guess = Some(vec![1e-6]);
        let (_, outcome) = fit_scenario(&s, &diode_samples(), &FitOptions::default());
        assert!(matches!(outcome, Err(FitError::InvalidInitialGuess(_))));
    }

    #[test]
    fn missing_file_fails_without_stopping_others() {
        let missing = std::env::temp_dir().join("diode-fit-pipeline-missing.txt");
        let good = std::env::temp_dir().join(format!("diode-fit-pipeline-{}.txt", std::process::id()));
        std::fs::write(&good, "0 1\n1 3\n2 5\n3 7\n").unwrap();

        let runs = run_scenarios(
            &[scenario(FitPath::Linear, missing), scenario(FitPath::Linear, good.clone())],
            &RunConfig::default(),
        );
        let _ = std::fs::remove_file(&good);

        assert_eq!(runs.len(), 2);
        assert!(matches!(runs[0].outcome, Err(FitError::InsufficientData { needed: 3, got: 0 })));
        let fit = &runs[1].outcome.as_ref().unwrap().fit;
        assert_relative_eq!(fit.params[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.params[1], 2.0, epsilon = 1e-9);
    }
}
