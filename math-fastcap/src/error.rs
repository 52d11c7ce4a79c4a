//! Error types for capacitance extraction.
//!
//! One `thiserror` enum covers the whole pipeline. Configuration and input
//! errors are raised where the offending value is set or loaded; solver errors
//! are raised per solve call and leave the [`Problem`](crate::Problem) usable.

use thiserror::Error;

/// Errors that can occur while building or solving a capacitance problem.
#[derive(Debug, Error)]
pub enum FastcapError {
    /// An option value is out of range or a conductor-name token is malformed.
    #[error("configuration error: {message}")]
    Config {
        /// Human readable description
        message: String,
    },

    /// A panel is degenerate, badly wound or otherwise unusable.
    #[error("input geometry error: {message}")]
    InputGeometry {
        /// Human readable description
        message: String,
    },

    /// A geometry file record could not be parsed.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Human readable description
        message: String,
    },

    /// GMRES did not reach the requested tolerance within the iteration cap.
    #[error(
        "solver did not converge for conductor '{conductor}' after {iterations} iterations \
         (relative residual {residual:.3e})"
    )]
    SolverNonConvergence {
        /// Composite key of the excited conductor
        conductor: String,
        /// Iterations performed
        iterations: usize,
        /// Final relative residual
        residual: f64,
    },

    /// Extreme panel aspect ratio or a singular near-field block.
    #[error("numerical degeneracy: {message}")]
    NumericalDegeneracy {
        /// Human readable description
        message: String,
    },

    /// File could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for capacitance extraction.
pub type Result<T> = std::result::Result<T, FastcapError>;

impl FastcapError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        FastcapError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        FastcapError::InputGeometry {
            message: message.into(),
        }
    }

    pub(crate) fn degenerate(message: impl Into<String>) -> Self {
        FastcapError::NumericalDegeneracy {
            message: message.into(),
        }
    }

    /// Returns `true` for configuration errors (including malformed config files).
    pub fn is_config_error(&self) -> bool {
        matches!(self, FastcapError::Config { .. } | FastcapError::Json(_))
    }

    /// Returns `true` for errors in the input geometry or its file representation.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FastcapError::InputGeometry { .. } | FastcapError::Parse { .. } | FastcapError::Io(_)
        )
    }

    /// Returns `true` when GMRES stopped at its iteration cap.
    pub fn is_non_convergence(&self) -> bool {
        matches!(self, FastcapError::SolverNonConvergence { .. })
    }

    /// Returns `true` for numerical degeneracies detected during setup or solve.
    pub fn is_numerical_error(&self) -> bool {
        matches!(self, FastcapError::NumericalDegeneracy { .. })
    }
}
