//! Custom error types for Patchwright.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Patchwright operations
#[derive(Error, Debug)]
pub enum PatchwrightError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Workspace Errors
    // =========================================================================
    /// Clone, reset or diff failed
    #[error("Repository operation failed: {operation} - {message}")]
    Repository { operation: String, message: String },

    /// A file operation resolved outside the workspace root
    #[error("Unsafe file operation blocked: {path}")]
    UnsafeAccess { path: String },

    // =========================================================================
    // Generation Errors
    // =========================================================================
    /// Language model transport or protocol failure
    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// File selection produced nothing and policy says that is fatal
    #[error("No relevant files were selected for the request")]
    NoRelevantFiles,

    /// A single edit operation could not be applied
    #[error("Failed to apply {operation}: {message}")]
    Apply { operation: String, message: String },

    // =========================================================================
    // Task Errors
    // =========================================================================
    /// Unknown task identifier
    #[error("Task {id} not found")]
    TaskNotFound { id: String },

    /// Illegal task state change
    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PatchwrightError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a repository error
    pub fn repository(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a sandbox violation error
    pub fn unsafe_access(path: impl Into<String>) -> Self {
        Self::UnsafeAccess { path: path.into() }
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create an apply error
    pub fn apply(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a task-not-found error
    pub fn task_not_found(id: impl ToString) -> Self {
        Self::TaskNotFound { id: id.to_string() }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error ends the whole orchestrator run.
    ///
    /// Only per-operation apply failures are absorbed by the attempt.
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(self, Self::Apply { .. })
    }

    /// Check if this error is a sandbox violation
    pub fn is_sandbox_violation(&self) -> bool {
        matches!(self, Self::UnsafeAccess { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnsafeAccess { .. } => 2,
            Self::Repository { .. } => 3,
            Self::Generation { .. } => 4,
            Self::NoRelevantFiles => 5,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Patchwright results
pub type Result<T> = std::result::Result<T, PatchwrightError>;

/// Extension trait for converting foreign errors to PatchwrightError
pub trait IntoPatchwrightError<T> {
    fn into_config_error(self) -> Result<T>;
    fn into_repository_error(self, operation: &str) -> Result<T>;
    fn into_generation_error(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoPatchwrightError<T> for std::result::Result<T, E> {
    fn into_config_error(self) -> Result<T> {
        self.map_err(|e| PatchwrightError::config(e.into().to_string()))
    }

    fn into_repository_error(self, operation: &str) -> Result<T> {
        self.map_err(|e| PatchwrightError::repository(operation, e.into().to_string()))
    }

    fn into_generation_error(self) -> Result<T> {
        self.map_err(|e| PatchwrightError::generation(e.into().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PatchwrightError::repository("clone", "repository not found");
        assert!(err.to_string().contains("clone"));
        assert!(err.to_string().contains("repository not found"));
    }

    #[test]
    fn test_unsafe_access_display_names_path() {
        let err = PatchwrightError::unsafe_access("../../etc/passwd");
        assert_eq!(
            err.to_string(),
            "Unsafe file operation blocked: ../../etc/passwd"
        );
    }

    #[test]
    fn test_is_fatal_to_run() {
        assert!(PatchwrightError::repository("reset", "boom").is_fatal_to_run());
        assert!(PatchwrightError::generation("timeout").is_fatal_to_run());
        assert!(PatchwrightError::unsafe_access("/etc").is_fatal_to_run());
        assert!(PatchwrightError::NoRelevantFiles.is_fatal_to_run());
        assert!(!PatchwrightError::apply("delete_file", "denied").is_fatal_to_run());
    }

    #[test]
    fn test_is_sandbox_violation() {
        assert!(PatchwrightError::unsafe_access("..").is_sandbox_violation());
        assert!(!PatchwrightError::generation("x").is_sandbox_violation());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PatchwrightError::unsafe_access("x").exit_code(), 2);
        assert_eq!(PatchwrightError::repository("clone", "x").exit_code(), 3);
        assert_eq!(PatchwrightError::generation("x").exit_code(), 4);
        assert_eq!(PatchwrightError::NoRelevantFiles.exit_code(), 5);
        assert_eq!(PatchwrightError::config("x").exit_code(), 7);
        assert_eq!(PatchwrightError::task_not_found("abc").exit_code(), 1);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/test/settings.json");
        let err = PatchwrightError::config_with_path("failed to parse", path.clone());
        if let PatchwrightError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_into_repository_error_trait() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "git not found",
        ));

        match result.into_repository_error("clone") {
            Err(PatchwrightError::Repository { operation, message }) => {
                assert_eq!(operation, "clone");
                assert!(message.contains("git not found"));
            }
            other => panic!("Wrong error variant after conversion: {:?}", other),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: PatchwrightError = io_err.into();
        assert!(matches!(err, PatchwrightError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
