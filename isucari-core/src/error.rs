//! Error types for the isucari benchmarker.
//!
//! Every failure a scenario can observe is one of these variants. The first
//! three are *domain* failures: their message is contestant-facing and goes
//! straight into the final report. The remaining variants are local failures
//! of the benchmarker itself; the aggregator hides their detail behind a
//! generic message.

use thiserror::Error;

/// How a domain failure counts toward the final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Fails the run on the first occurrence.
    Critical,
    /// Costs points; ten of them fail the run.
    Application,
    /// Only costs points once they pile up (timeouts).
    Trivial,
}

/// Main error type for benchmarker operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Broken invariant that invalidates the run (double payment, two campaign winners)
    #[error("{message}")]
    Critical { message: String },

    /// Response deviates from the documented contract
    #[error("{message}")]
    Application {
        message: String,
        /// Raw detail kept for logs only
        detail: Option<String>,
    },

    /// Request timed out
    #[error("{message}")]
    Trivial { message: String },

    /// No unused user is left in a role's shuffled sequence
    #[error("User pool exhausted: {role}")]
    PoolExhausted { role: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Local file access errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for benchmarker operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a critical failure.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::Critical { message: message.into() }
    }

    /// Build an application failure without extra detail.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application { message: message.into(), detail: None }
    }

    /// Build an application failure carrying a log-only detail.
    pub fn application_with(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Application { message: message.into(), detail: Some(detail.into()) }
    }

    /// Build a trivial failure.
    pub fn trivial(message: impl Into<String>) -> Self {
        Self::Trivial { message: message.into() }
    }

    /// Build an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The scoring kind of a domain failure, `None` for local failures.
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Critical { .. } => Some(FailureKind::Critical),
            Self::Application { .. } => Some(FailureKind::Application),
            Self::Trivial { .. } => Some(FailureKind::Trivial),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { message: err.to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io { message: err.to_string() }
    }
}
