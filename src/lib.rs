//! `diode-fit` library crate.
//!
//! The binary (`diode-fit`) is a thin wrapper around this library so that:
//!
//! - the fitting core is testable without spawning processes
//! - the fitter, propagation and ingest are reusable from other lab tools
//!
//! Layout:
//!
//! - `fit`: weighted least squares, delta-method propagation, diode log-linearization
//! - `math` / `models`: linear algebra, Levenberg–Marquardt, model functions
//! - `io` / `report` / `plot`: file formats, text output, charts
//! - `app` / `cli`: command-line front-end

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
