//! Error types for group management.

use std::path::PathBuf;

use mnagios_core::WorkflowValidationError;
use mnagios_store::StoreError;
use mnagios_targets::{ErrorKind, TargetError};
use thiserror::Error;

pub type GroupResult<T> = Result<T, GroupError>;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Workflow(#[from] WorkflowValidationError),

    #[error("group name {name:?} is not valid: group names must not contain : or /")]
    InvalidName { name: String },

    #[error("group type {0} must be associated with at least one check")]
    NoChecks(String),

    #[error(
        "group type {group_type} was not valid; available group types are: {}",
        available.join(", ")
    )]
    UnknownGroupType {
        group_type: String,
        available: Vec<String>,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl GroupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GroupError::InvalidName { .. }
            | GroupError::NoChecks(_)
            | GroupError::UnknownGroupType { .. }
            | GroupError::Workflow(_) => ErrorKind::InvalidRequest,
            GroupError::Store(e) if e.is_invalid_request() => ErrorKind::InvalidRequest,
            GroupError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            GroupError::Target(e) => e.kind(),
            _ => ErrorKind::Internal,
        }
    }
}
