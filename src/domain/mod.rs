//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measured samples and fit domains (`Sample`, `FitDomain`)
//! - model and fit-path selectors (`ModelKind`, `FitPath`, `XErrorMode`)
//! - fit outputs (`FitResult`, `DerivedQuantity`)
//! - per-dataset configuration (`Scenario`, `ColumnLayout`, `SigmaConvention`)

pub mod types;

pub use types::*;
