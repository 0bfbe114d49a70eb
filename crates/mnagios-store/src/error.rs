//! Error types for the configuration object store.

use std::path::PathBuf;

use thiserror::Error;

use crate::command::CommandError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("template {0} not found")]
    TemplateMissing(String),

    #[error("template {template} has no value for placeholder {placeholder}")]
    Template {
        template: String,
        placeholder: String,
    },

    #[error("failed to {operation} {path}: {source}")]
    Command {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Validation failed; the change was rolled back before this was raised.
    #[error("configuration validation failed (change rolled back): {output}")]
    Validation { output: String },

    /// Validation failed and the rollback failed too. The tree may not load.
    #[error("configuration validation failed ({output}) and rollback failed: {rollback}")]
    RollbackFailed { output: String, rollback: String },

    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("invalid path segment {segment:?}: {reason}")]
    InvalidPath { segment: String, reason: &'static str },

    #[error("reload failed: {0}")]
    Reload(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// The request itself was unacceptable, as opposed to the environment
    /// failing to apply it.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, StoreError::InvalidPath { .. })
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
