//! Error types for besengine.
//!
//! Library crates use [`BesEngineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all besengine operations.
#[derive(Debug, thiserror::Error)]
pub enum BesEngineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error (connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The console answered with a non-success status.
    #[error("console returned HTTP {status}: {body}")]
    Console { status: u16, body: String },

    /// Malformed recipe or console response.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A file the build depends on does not exist.
    #[error("file not found: {path:?}")]
    FileNotFound { path: PathBuf },

    /// Filesystem I/O error while reading.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failure while writing the output document.
    #[error("write error at {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An action descriptor lacks a required field or breaks a collection invariant.
    #[error("malformed action descriptor: {message}")]
    MalformedAction { message: String },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BesEngineError>;

impl BesEngineError {
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

    /// Create a malformed-action error.
    pub fn malformed_action(msg: impl Into<String>) -> Self {
        Self::MalformedAction {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` raised while reading `path`.
    ///
    /// `NotFound` is promoted to [`BesEngineError::FileNotFound`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::FileNotFound { path };
        }
        Self::Io { path, source }
    }

    /// Wrap a `std::io::Error` raised while writing `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
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
        let err = BesEngineError::config("missing root_server");
        assert_eq!(err.to_string(), "config error: missing root_server");

        let err = BesEngineError::malformed_action("ActionName is empty");
        assert!(err.to_string().contains("ActionName is empty"));
    }

    #[test]
    fn io_not_found_becomes_file_not_found() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = BesEngineError::io("/tmp/missing.dmg", source);
        assert!(matches!(err, BesEngineError::FileNotFound { .. }));

        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = BesEngineError::io("/tmp/locked.dmg", source);
        assert!(matches!(err, BesEngineError::Io { .. }));
    }

    #[test]
    fn console_error_carries_status() {
        let err = BesEngineError::Console {
            status: 403,
            body: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "console returned HTTP 403: forbidden");
    }
}
