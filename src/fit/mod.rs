//! Curve fitting.
//!
//! Responsibilities:
//!
//! - weighted least squares for the linear and Shockley models (`fitter`)
//! - delta-method propagation to derived quantities (`propagate`)
//! - diode log-linearization and lab quantities (`loglin`)
//!
//! Nothing here prints or logs; callers decide how to report failures.

pub mod fitter;
pub mod loglin;
pub mod propagate;

pub use fitter::*;
pub use loglin::*;
pub use propagate::*;
