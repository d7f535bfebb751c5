//! Error handling for the amidev toolkit.
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All fallible library operations return [`Result`] with these types.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for the amidev toolkit
#[derive(Error, Debug)]
pub enum AmidevError {
    /// IO errors (file operations, pipes, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Task runner: the requested target does not exist
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// Task runner: an operation in a target's sequence failed
    #[error("operation `{operation}` failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    /// Binary format parse errors (hunk, a.out, ar)
    #[error("{}: {reason} (at offset {offset:#x})", .path.display())]
    Parse {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Debugger protocol errors (malformed or refused responses)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The target does not implement the requested debugger command
    #[error("command not supported by this target")]
    NotSupported,

    /// Emulator child process lifecycle errors
    #[error("emulator error: {0}")]
    Emulator(String),

    /// Settings file errors (loading, validation)
    #[error("settings error: {0}")]
    Settings(String),
}

/// Result type alias for amidev operations
pub type Result<T> = std::result::Result<T, AmidevError>;

impl AmidevError {
    /// Create a parse error with file and offset context
    pub fn parse(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Create an operation failure from a non-zero exit status
    pub fn command_failed(operation: impl Into<String>, status: ExitStatus) -> Self {
        let reason = match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        Self::OperationFailed {
            operation: operation.into(),
            reason,
        }
    }

    /// Create an operation failure with a free-form reason
    pub fn operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an emulator error
    pub fn emulator(msg: impl Into<String>) -> Self {
        Self::Emulator(msg.into())
    }

    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Whether this error is the `NotSupported` marker used by optional
    /// debugger commands
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AmidevError::UnknownTarget("deploy".to_string());
        assert_eq!(err.to_string(), "unknown target: deploy");

        let err = AmidevError::operation("rm -r build", "permission denied");
        assert_eq!(
            err.to_string(),
            "operation `rm -r build` failed: permission denied"
        );
    }

    #[test]
    fn test_parse_error_context() {
        let err = AmidevError::parse("a.out", 0x20, "bad magic");
        assert_eq!(err.to_string(), "a.out: bad magic (at offset 0x20)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AmidevError = io_err.into();
        assert!(matches!(err, AmidevError::Io(_)));
    }
}
