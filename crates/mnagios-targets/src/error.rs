//! Error types for target and target type management.

use mnagios_core::WorkflowValidationError;
use mnagios_status::StatusError;
use mnagios_store::StoreError;
use thiserror::Error;

pub type TargetResult<T> = Result<T, TargetError>;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Workflow(#[from] WorkflowValidationError),

    #[error(
        "target type {target_type} was not valid; available target types are: {}",
        available.join(", ")
    )]
    InvalidTargetType {
        target_type: String,
        available: Vec<String>,
    },

    #[error(
        "instance health check {command:?} is not valid; valid options are: {}",
        mnagios_core::INSTANCE_HEALTH_CHECKS.join(", ")
    )]
    InvalidHealthCheck { command: String },

    #[error("target type name {0:?} must be non-empty and contain no '/' or ','")]
    InvalidTargetTypeName(String),

    #[error("checks require an SNMP v3 or v2c configuration")]
    NoSnmpConfiguration,

    #[error("target {0} does not exist")]
    TargetNotFound(String),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// How an error should be reported to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was invalid.
    InvalidRequest,
    NotFound,
    /// A valid request the environment could not satisfy.
    Internal,
}

impl TargetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TargetError::InvalidTargetType { .. }
            | TargetError::InvalidHealthCheck { .. }
            | TargetError::InvalidTargetTypeName(_)
            | TargetError::NoSnmpConfiguration
            | TargetError::Workflow(_) => ErrorKind::InvalidRequest,
            TargetError::Store(e) if e.is_invalid_request() => ErrorKind::InvalidRequest,
            TargetError::TargetNotFound(_) => ErrorKind::NotFound,
            TargetError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            TargetError::Status(e) if e.is_not_found() => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
