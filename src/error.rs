//! Error types.
//!
//! - `TrainError` is the library error: every failure the training core can
//!   report, with enough context for the caller to decide abort vs. skip.
//! - `AppError` is the binary's error: a message plus a process exit code.

use thiserror::Error;

/// Failures raised by the training core.
#[derive(Debug, Clone, Error)]
pub enum TrainError {
    /// The weighted normal-equations matrix could not be factorized.
    #[error("singular normal equations at scatter {scatter:e}")]
    SingularSystem { scatter: f64 },

    /// The linear solve succeeded but produced NaN/Inf coefficients.
    #[error("invalid coefficients at scatter {scatter:e}: solution is not finite")]
    NonFiniteCoefficients { scatter: f64 },

    /// A per-pixel failure, tagged with the pixel it happened at.
    #[error("pixel {index} (wavelength {wavelength}): {source}")]
    Pixel {
        index: usize,
        wavelength: f64,
        #[source]
        source: Box<TrainError>,
    },

    /// A caller contract violation on array shapes.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid training input: {0}")]
    InvalidInput(String),
}

impl TrainError {
    pub fn pixel(index: usize, wavelength: f64, source: TrainError) -> Self {
        Self::Pixel {
            index,
            wavelength,
            source: Box::new(source),
        }
    }
}

/// Error surfaced by the `cannon` binary.
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

impl From<TrainError> for AppError {
    fn from(err: TrainError) -> Self {
        let exit_code = match err {
            TrainError::InvalidInput(_) => 2,
            _ => 4,
        };
        AppError::new(exit_code, format!("Training failed: {err}"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_error_keeps_source_message() {
        let err = TrainError::pixel(7, 15000.5, TrainError::SingularSystem { scatter: 1e-4 });
        let msg = err.to_string();
        assert!(msg.contains("pixel 7"));
        assert!(msg.contains("singular"));
    }

    #[test]
    fn app_error_exit_codes() {
        let input: AppError = TrainError::InvalidInput("no stars".into()).into();
        assert_eq!(input.exit_code(), 2);
        let fit: AppError = TrainError::NonFiniteCoefficients { scatter: 0.1 }.into();
        assert_eq!(fit.exit_code(), 4);
    }
}
