//! Error types for the job agent.
//!
//! Library crates use [`JobAgentError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all job agent operations.
#[derive(Debug, thiserror::Error)]
pub enum JobAgentError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a source or service.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, feed, markdown or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Text-generation service error (transport, status, or body).
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Email rendering or delivery error.
    #[error("email error: {0}")]
    Email(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobAgentError>;

impl JobAgentError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = JobAgentError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = JobAgentError::Llm("HTTP 502".into());
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[test]
    fn io_error_keeps_path() {
        let err = JobAgentError::io(
            "/tmp/report.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("report.json"));
        assert!(text.contains("denied"));
    }
}
