//! Whitespace-column ingest.
//!
//! This module turns a plain text file of measurements into `Sample`s that are
//! safe to hand to the fitter.
//!
//! Rules:
//! - one sample per line, columns separated by any whitespace
//! - blank lines and lines starting with `#` are skipped silently
//! - lines with too few columns or non-numeric tokens are skipped and recorded
//!   as `RowError`s (line numbers are 1-based)
//! - extra trailing columns are ignored
//! - an unreadable file yields an empty dataset plus one row error at line 0;
//!   rejecting it is the fitter's job (`InsufficientData`)
//!
//! No fitting logic lives here.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::domain::{ColumnLayout, Sample, SigmaConvention};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: parsed samples plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct IngestedData {
    pub samples: Vec<Sample>,
    pub row_errors: Vec<RowError>,
    /// Non-blank, non-comment lines seen.
    pub rows_read: usize,
}

impl IngestedData {
    pub fn rows_used(&self) -> usize {
        self.samples.len()
    }
}

/// Read `path` with the given layout. Never fails; see the module docs.
pub fn load_dataset(path: &Path, layout: ColumnLayout, sigma: SigmaConvention) -> IngestedData {
    match fs::read_to_string(path) {
        Ok(text) => parse_dataset(&text, layout, sigma),
        Err(e) => IngestedData {
            samples: Vec::new(),
            row_errors: vec![RowError {
                line: 0,
                message: format!("cannot read '{}': {e}", path.display()),
            }],
            rows_read: 0,
        },
    }
}

/// Parse already-loaded text.
pub fn parse_dataset(text: &str, layout: ColumnLayout, sigma: SigmaConvention) -> IngestedData {
    let mut data = IngestedData::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim().trim_start_matches('\u{feff}');
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        data.rows_read += 1;

        match parse_row(trimmed, layout, sigma) {
            Ok(sample) => data.samples.push(sample),
            Err(message) => data.row_errors.push(RowError { line, message }),
        }
    }

    data
}

fn parse_row(line: &str, layout: ColumnLayout, sigma: SigmaConvention) -> Result<Sample, String> {
    let needed = layout.min_columns();
    let tokens: Vec<&str> = line.split_whitespace().take(needed).collect();
    if tokens.len() < needed {
        return Err(format!("expected {needed} columns, found {}", tokens.len()));
    }

    let mut values = [0.0f64; 4];
    for (k, token) in tokens.iter().enumerate() {
        values[k] = token
            .parse::<f64>()
            .map_err(|_| format!("column {}: '{token}' is not a number", k + 1))?;
    }

    Ok(match layout {
        ColumnLayout::Calibration => Sample::new(values[0], values[1], values[2], values[3]),
        ColumnLayout::Raw => Sample::new(values[0], values[1], 0.0, sigma.sigma_for(values[1])),
    })
}

/// Render samples in the given layout, one per line.
///
/// `Raw` writes only `x y`; errors are re-derived from the convention when the
/// file is read back.
pub fn format_dataset(samples: &[Sample], layout: ColumnLayout) -> String {
    let mut out = String::new();
    for s in samples {
        let _ = match layout {
            ColumnLayout::Calibration => writeln!(out, "{} {} {} {}", s.x, s.y, s.sigma_x, s.sigma_y),
            ColumnLayout::Raw => writeln!(out, "{} {}", s.x, s.y),
        };
    }
    out
}

/// Write samples to `path` (see [`format_dataset`]).
pub fn write_dataset(path: &Path, samples: &[Sample], layout: ColumnLayout) -> Result<(), AppError> {
    fs::write(path, format_dataset(samples, layout))
        .map_err(|e| AppError::new(4, format!("Failed to write dataset '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_layout_reads_four_columns() {
        let text = "# multimetro oscilloscopio ex ey\n100 101.5 0.5 2\n\n200\t203 0.5 2 extra\n";
        let data = parse_dataset(text, ColumnLayout::Calibration, SigmaConvention::default());
        assert_eq!(data.rows_read, 2);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.samples[0], Sample::new(100.0, 101.5, 0.5, 2.0));
        assert_eq!(data.samples[1], Sample::new(200.0, 203.0, 0.5, 2.0));
    }

    #[test]
    fn raw_layout_applies_sigma_convention() {
        let conv = SigmaConvention {
            absolute: 0.3,
            relative: 0.04,
        };
        let data = parse_dataset("500 10\n", ColumnLayout::Raw, conv);
        let s = data.samples[0];
        assert_eq!(s.sigma_x, 0.0);
        assert!((s.sigma_y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn malformed_rows_are_skipped_and_reported() {
        let text = "1 2\n3\nfoo 4\n5 6\n";
        let data = parse_dataset(text, ColumnLayout::Raw, SigmaConvention::default());
        assert_eq!(data.rows_read, 4);
        assert_eq!(data.rows_used(), 2);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 2);
        assert!(data.row_errors[0].message.contains("expected 2 columns"));
        assert_eq!(data.row_errors[1].line, 3);
        assert!(data.row_errors[1].message.contains("'foo'"));
    }

    #[test]
    fn missing_file_is_empty_dataset() {
        let path = std::env::temp_dir().join("diode-fit-ingest-does-not-exist.txt");
        let data = load_dataset(&path, ColumnLayout::Raw, SigmaConvention::default());
        assert!(data.samples.is_empty());
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].line, 0);
    }

    #[test]
    fn formatted_calibration_rows_parse_back() {
        let samples = vec![Sample::new(1.0, 2.5, 0.1, 0.2), Sample::new(-3.0, 4e-9, 0.0, 1e-10)];
        let text = format_dataset(&samples, ColumnLayout::Calibration);
        let data = parse_dataset(&text, ColumnLayout::Calibration, SigmaConvention::default());
        assert_eq!(data.samples, samples);
    }
}
