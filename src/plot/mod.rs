//! Rendering: deterministic terminal plots (`ascii`) and SVG charts (`chart`).

pub mod ascii;
pub mod chart;

pub use ascii::*;
pub use chart::*;
