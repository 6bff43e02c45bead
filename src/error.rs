//! Error types for fatbin.
//!
//! # Error Message Style Guide
//!
//! All error messages follow a consistent format:
//!
//! - **Format**: `"<operation> failed: <reason>"` or `"<entity> not found: <identifier>"`
//! - **Case**: All lowercase (Rust convention for error messages)
//! - **Context**: Include the path or command involved when available
//!
//! ```text
//! "permission change failed: /tmp/fatbin1234/app: operation not permitted"
//! "command '/tmp/fatbin1234/app' failed: no such file or directory"
//! "config operation failed: resolve host: ..."
//! ```
//!
//! Archive errors come from [`fatbin_pack::PackError`] and are wrapped
//! unchanged.

use fatbin_pack::PackError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using fatbin's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fatbin operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Building, locating or extracting an archive failed.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// The entry point could not be made executable.
    #[error("permission change failed: {}: {source}", path.display())]
    PermissionFailure {
        /// File whose mode could not be changed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The entry point could not be started or waited on.
    ///
    /// A non-zero exit of the program itself is not reported here.
    #[error("command '{command}' failed: {reason}")]
    ChildProcessFailure {
        /// The command that failed.
        command: String,
        /// Error message or reason for failure.
        reason: String,
    },

    /// Configuration could not be resolved.
    #[error("config operation failed: {operation}: {reason}")]
    Config {
        /// The operation that failed (e.g., "resolve host", "parse level").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    /// IO error wrapper.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a permission failure error.
    pub fn permission_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PermissionFailure {
            path: path.into(),
            source,
        }
    }

    /// Create a child process failure error.
    pub fn child_process(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChildProcessFailure {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a config operation error.
    pub fn config(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_failure_includes_path() {
        let err = Error::permission_failure(
            "/tmp/fatbin/app",
            io::Error::new(io::ErrorKind::PermissionDenied, "operation not permitted"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/fatbin/app"), "Error should include the path");
        assert!(msg.contains("not permitted"), "Error should include reason");
    }

    #[test]
    fn test_child_process_includes_command_and_reason() {
        let err = Error::child_process("/tmp/fatbin/app", "exec format error");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/fatbin/app"), "Error should include command");
        assert!(msg.contains("exec format error"), "Error should include reason");
    }

    #[test]
    fn test_config_error_includes_operation_and_reason() {
        let err = Error::config("resolve host", "no current executable");
        let msg = err.to_string();
        assert!(msg.contains("resolve host"), "Error should include operation");
        assert!(msg.contains("no current executable"));
    }

    #[test]
    fn test_pack_errors_pass_through() {
        let err: Error = PackError::MissingEntryPoint("run.sh".to_string()).into();
        assert_eq!(
            err.to_string(),
            PackError::MissingEntryPoint("run.sh".to_string()).to_string()
        );
    }

    #[test]
    fn test_all_errors_are_lowercase() {
        let errors: Vec<Error> = vec![
            Error::permission_failure("/x", io::Error::other("reason")),
            Error::child_process("cmd", "reason"),
            Error::config("op", "reason"),
            Error::Io(io::Error::other("reason")),
            PackError::NoEmbeddedArchive(PathBuf::from("/x")).into(),
        ];

        for err in errors {
            let msg = err.to_string();
            let first_char = msg.chars().next().unwrap();
            assert!(
                first_char.is_lowercase(),
                "Error message should start lowercase: {}",
                msg
            );
        }
    }
}
