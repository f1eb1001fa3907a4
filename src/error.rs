//! Error types for mecsim.
//!
//! All fallible operations return `Result<T, SimError>` instead of panicking.
//! Control-level errors (illegal state transitions) surface synchronously to
//! the caller; numeric errors during a tick propagate out of the tick
//! invocation and end the periodic driver.

use thiserror::Error;

use crate::simulation::SimulationState;

/// Result type alias for mecsim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Unified error type for all mecsim operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// A control operation was invoked from an incompatible state.
    ///
    /// No partial state change occurs when this is returned.
    #[error("cannot {operation} while the simulation is {from}")]
    IllegalTransition {
        /// The control operation that was attempted.
        operation: &'static str,
        /// The state the simulation was in.
        from: SimulationState,
    },

    /// The position-level Newton loop exceeded its iteration budget.
    #[error(
        "assembly solver failed to converge after {iterations} iterations \
         (residual {residual:.6e}, tolerance {tolerance:.6e})"
    )]
    NonConvergence {
        /// Euclidean norm of the position residual at the last iteration.
        residual: f64,
        /// Convergence tolerance that was not reached.
        tolerance: f64,
        /// Number of correction iterations performed.
        iterations: usize,
    },

    /// A failure inside the linear-algebra layer (e.g. the singular value
    /// decomposition behind the pseudo-inverse did not converge).
    #[error("numeric error: {message}")]
    Numeric {
        /// Description from the linear-algebra layer.
        message: String,
    },

    /// No integration method is registered under the requested name.
    #[error("no integration method called \"{0}\"")]
    UnknownIntegrationMethod(String),

    /// Invalid configuration or solver parameter.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a numeric error with a message.
    #[must_use]
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::Numeric {
            message: message.into(),
        }
    }

    /// Create an illegal-transition error.
    #[must_use]
    pub const fn illegal_transition(operation: &'static str, from: SimulationState) -> Self {
        Self::IllegalTransition { operation, from }
    }

    /// Check whether this error reports solver non-convergence.
    #[must_use]
    pub const fn is_non_convergence(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }
}
