//! Formatted terminal output.
//!
//! Formatting lives in one place so the fitting code stays clean and output
//! changes stay localized (the tests below pin the layout).

use crate::domain::{DerivedQuantity, FitResult, Scenario};
use crate::error::FitError;
use crate::io::ingest::IngestedData;

/// Full text report for one fitted scenario.
pub fn format_fit_report(scenario: &Scenario, fit: &FitResult, derived: &[DerivedQuantity]) -> String {
    let mut out = String::new();

    out.push_str(&header(scenario));
    out.push_str(&format!(
        "Model: {} ({})  f(x) = {}\n",
        scenario.path.display_name(),
        fit.model.display_name(),
        fit.model.formula()
    ));
    out.push_str(&format!(
        "Domain: [{}, {}] | points used: {}\n",
        fmt_num(fit.domain.min),
        fmt_num(fit.domain.max),
        fit.n_used
    ));

    out.push_str("\nParameters:\n");
    let errors = fit.errors();
    for (i, name) in fit.model.param_names().iter().enumerate() {
        out.push_str(&format!("  {:<6} = {:>14} +/- {}\n", name, fmt_num(fit.params[i]), fmt_num(errors[i])));
    }

    out.push('\n');
    match fit.chi2_per_ndf() {
        Some(r) => out.push_str(&format!("chi2/ndf = {:.4} / {} = {:.4}\n", fit.chi2, fit.ndf, r)),
        None => out.push_str(&format!("chi2/ndf = {:.4} / {} = n/a\n", fit.chi2, fit.ndf)),
    }
    match fit.probability() {
        Some(p) => out.push_str(&format!("Prob     = {p:.4}\n")),
        None => out.push_str("Prob     = n/a\n"),
    }
    out.push_str(&format!(
        "Converged: {} (iterations: {})\n",
        if fit.converged { "yes" } else { "no (marginal)" },
        fit.iterations
    ));

    if !derived.is_empty() {
        out.push_str("\nDerived quantities:\n");
        let width = derived.iter().map(|q| q.name.chars().count()).max().unwrap_or(0);
        for q in derived {
            out.push_str(&format!(
                "  {:<width$} = {} +/- {}\n",
                q.name,
                fmt_num(q.value),
                fmt_num(q.sigma)
            ));
        }
    }

    out
}

/// Diagnostic for a scenario whose fit failed.
pub fn format_failure(scenario: &Scenario, err: &FitError) -> String {
    let mut out = header(scenario);
    out.push_str(&format!("Fit failed: {err}\n"));
    out
}

/// One-line ingest summary (rows read/used/skipped), plus the first few row errors.
pub fn format_ingest_summary(ingest: &IngestedData, max_errors: usize) -> String {
    let mut out = format!(
        "Rows: read={} used={} skipped={}\n",
        ingest.rows_read,
        ingest.rows_used(),
        ingest.row_errors.len()
    );
    for e in ingest.row_errors.iter().take(max_errors) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if ingest.row_errors.len() > max_errors {
        out.push_str(&format!("  ... {} more\n", ingest.row_errors.len() - max_errors));
    }
    out
}

fn header(scenario: &Scenario) -> String {
    format!("\n>>> {} ({})\n", scenario.title, scenario.file.display())
}

/// Fixed precision; scientific notation outside `[1e-3, 1e6)`.
pub fn fmt_num(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let a = v.abs();
    if a == 0.0 || (1e-3..1e6).contains(&a) {
        format!("{v:.6}")
    } else {
        format!("{v:.6e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnLayout, FitDomain, FitPath, ModelKind, PlotColor};
    use crate::io::ingest::RowError;
    use nalgebra::DMatrix;
    use std::path::PathBuf;

    fn scenario() -> Scenario {
        Scenario {
            id: "calibration".to_string(),
            title: "Calibrazione".to_string(),
            file: PathBuf::from("dati_calibrazione.txt"),
            layout: ColumnLayout::Calibration,
            path: FitPath::Linear,
            domain: FitDomain::new(0.0, 1000.0),
            initial_guess: None,
            marker: PlotColor::Blue,
            line: PlotColor::Red,
            x_label: "Multimetro (mV)".to_string(),
            y_label: "Oscilloscopio (mV)".to_string(),
        }
    }

    fn fit() -> FitResult {
        FitResult {
            model: ModelKind::Linear,
            params: vec![0.5, 1.02],
            covariance: DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 1e-8]),
            chi2: 2.0,
            ndf: 2,
            n_used: 4,
            iterations: 0,
            converged: true,
            domain: FitDomain::new(0.0, 1000.0),
        }
    }

    #[test]
    fn report_layout_is_stable() {
        let derived = vec![DerivedQuantity {
            name: "I0".to_string(),
            value: 2.5e-9,
            sigma: 1e-10,
        }];
        let text = format_fit_report(&scenario(), &fit(), &derived);
        let expected = "\n>>> Calibrazione (dati_calibrazione.txt)\n\
Model: linear (linear)  f(x) = a + b*x\n\
Domain: [0.000000, 1000.000000] | points used: 4\n\
\n\
Parameters:\n  \
a      =       0.500000 +/- 0.200000\n  \
b      =       1.020000 +/- 1.000000e-4\n\
\n\
chi2/ndf = 2.0000 / 2 = 1.0000\n\
Prob     = 0.3679\n\
Converged: yes (iterations: 0)\n\
\n\
Derived quantities:\n  \
I0 = 2.500000e-9 +/- 1.000000e-10\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn failure_names_the_error() {
        let err = FitError::InsufficientData { needed: 3, got: 0 };
        let text = format_failure(&scenario(), &err);
        assert!(text.contains(">>> Calibrazione (dati_calibrazione.txt)"));
        assert!(text.contains("Fit failed: insufficient data"));
    }

    #[test]
    fn ingest_summary_truncates_errors() {
        let ingest = IngestedData {
            samples: Vec::new(),
            row_errors: (1..=4)
                .map(|line| RowError {
                    line,
                    message: "bad".to_string(),
                })
                .collect(),
            rows_read: 4,
        };
        let text = format_ingest_summary(&ingest, 2);
        assert!(text.starts_with("Rows: read=4 used=0 skipped=4\n"));
        assert!(text.contains("line 2: bad"));
        assert!(!text.contains("line 3"));
        assert!(text.ends_with("... 2 more\n"));
    }

    #[test]
    fn numbers_switch_to_scientific() {
        assert_eq!(fmt_num(0.0), "0.000000");
        assert_eq!(fmt_num(12.5), "12.500000");
        assert_eq!(fmt_num(-4.2e-9), "-4.200000e-9");
        assert_eq!(fmt_num(f64::INFINITY), "inf");
    }
}
