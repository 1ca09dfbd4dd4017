//! Input/output helpers.
//!
//! - whitespace-column ingest + validation (`ingest`)
//! - residual CSV export (`export`)
//! - fit report JSON read/write (`fit_report`)

pub mod export;
pub mod fit_report;
pub mod ingest;

pub use export::*;
pub use fit_report::*;
pub use ingest::*;
