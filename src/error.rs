//! Error types.
//!
//! - `FitError`: recoverable failures of the fitting core (one dataset fails,
//!   the others keep going)
//! - `AppError`: process-level failure with an exit code, used by the CLI

/// Failure modes of a single fit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    /// Fewer usable samples than the fit needs (`|θ| + 1`).
    #[error("insufficient data: need at least {needed} valid points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A sample inside the fit domain carries a non-positive or non-finite σy.
    #[error("invalid uncertainty at sample {index}: sigma_y = {sigma}")]
    InvalidUncertainty { index: usize, sigma: f64 },

    /// The iterative solver gave up. χ² and ndf are those of the last accepted iterate.
    #[error("fit did not converge after {iterations} iterations (chi2 = {chi2:.6e}, ndf = {ndf})")]
    NonConvergence { iterations: usize, chi2: f64, ndf: usize },

    /// Normal equations are rank deficient (e.g. every x is identical).
    #[error("normal equations are singular; the data cannot constrain all parameters")]
    SingularMatrix,

    #[error("invalid initial guess: {0}")]
    InvalidInitialGuess(String),

    /// A derived quantity is undefined at the fitted parameters.
    #[error("cannot derive {0}")]
    DegenerateDerivation(String),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(3, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_error_maps_to_exit_code_3() {
        let err: AppError = FitError::InsufficientData { needed: 3, got: 0 }.into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("need at least 3"));
    }
}
