use thiserror::Error;

/// Failures a solve call can surface to its caller.
///
/// Running out of iterations is not an error: the driver reports it through
/// [`crate::equilibrium::SolveStatus`] instead.
#[derive(Debug, Clone, Error)]
pub enum SolveError {
    /// The requested geometry or settings cannot be realised.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The Newton step could not be computed or produced non-finite values.
    #[error("Numerical failure after {iterations} iterations: {message}")]
    NumericalFailure {
        message: String,
        iterations: usize,
        /// Last state vector reached before the failure.
        state: Vec<f64>,
    },
}

impl SolveError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SolveError::Configuration(message.into())
    }

    /// State the solver held when it gave up, if any.
    pub fn last_state(&self) -> Option<&[f64]> {
        match self {
            SolveError::Configuration(_) => None,
            SolveError::NumericalFailure { state, .. } => Some(state),
        }
    }
}

pub type SolveResult<T> = Result<T, SolveError>;
