//! Error types for linkcache
//!
//! All modules use `LinkcacheResult<T>` as their return type. Most cache
//! conditions never surface as errors: a missing or corrupt sidecar is a
//! cache miss, not a failure.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for linkcache operations
pub type LinkcacheResult<T> = Result<T, LinkcacheError>;

/// All errors that can occur in linkcache
#[derive(Error, Debug)]
pub enum LinkcacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Invocation errors
    #[error("No command given to wrap")]
    EmptyCommand,

    #[error("Failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    // Oracle errors
    #[error("API digest oracle {program} failed on {artifact}: {reason}")]
    OracleFailed {
        program: String,
        artifact: PathBuf,
        reason: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an oracle failure
    pub fn oracle_failed(
        program: impl Into<String>,
        artifact: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::OracleFailed {
            program: program.into(),
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => {
                Some("Fix the file or point --config / LINKCACHE_CONFIG elsewhere")
            }
            Self::EmptyCommand => Some("Usage: linkcache [OPTIONS] -- <COMMAND> [ARGS]..."),
            Self::CommandFailed { .. } => Some("Check that the wrapped command is on PATH"),
            _ => None,
        }
    }
}
