//! Unified error types for stopgate with fail-open philosophy.
//!
//! Every failure inside the gate degrades to a conservative default: the
//! gate protects against blocking forever, not against occasionally missing
//! a problem. Errors are logged as warnings and replaced with safe values
//! rather than propagated to the host runtime.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stopgate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// I/O errors from turn state or transcript file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Advisory lock could not be acquired.
    #[error("lock error at {path}: {message}")]
    Lock { path: PathBuf, message: String },

    /// A consideration checker failed to produce a result.
    #[error("checker '{checker}' failed: {message}")]
    Checker { checker: String, message: String },

    /// A referenced path resolved outside its permitted directory.
    #[error("security violation: {message}")]
    Security { message: String },

    /// A consideration entry failed schema validation.
    #[error("invalid consideration {index}: {message}")]
    InvalidConsideration { index: usize, message: String },
}

/// A specialized Result type for stopgate operations.
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a lock error.
    pub fn lock(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Lock {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a checker error.
    pub fn checker(checker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checker {
            checker: checker.into(),
            message: message.into(),
        }
    }

    /// Create a security violation error.
    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
        }
    }

    /// Create an invalid consideration error for the entry at `index`.
    pub fn invalid_consideration(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidConsideration {
            index,
            message: message.into(),
        }
    }

    /// Whether this error is a security violation that must be surfaced
    /// separately from ordinary data loss.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::Security { .. })
    }
}

impl From<io::Error> for GateError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Log the error and return a safe default.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the stopgate CLI.
///
/// The host runtime reads these from the stop hook.
pub mod exit_codes {
    /// Allow the agent to stop.
    pub const APPROVE: i32 = 0;

    /// Generic command failure for non-hook subcommands.
    pub const ERROR: i32 = 1;

    /// Prevent the agent from stopping.
    pub const BLOCK: i32 = 2;

    /// Crash (fail-open, treated as approve by the host).
    pub const CRASH: i32 = 3;
}
