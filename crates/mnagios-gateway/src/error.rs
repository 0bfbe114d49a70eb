//! Error types for the workflow gateway.

use std::path::PathBuf;
use std::time::Duration;

use mnagios_core::ConfigError;
use mnagios_status::StatusError;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("paths for the manager must start with a /; requested path was {0}")]
    BadPath(String),

    #[error("no healthy managers were reachable")]
    NoHealthyManagers,

    #[error("request failed with status code {status}, and reason: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read manager certificate {path}: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("starting workflow {workflow} on {deployment} failed: {source}")]
    StartWorkflowFailed {
        workflow: String,
        deployment: String,
        #[source]
        source: Box<GatewayError>,
    },

    #[error("execution {execution_id} did not succeed: {message}")]
    ExecutionDidNotSucceed { execution_id: String, message: String },

    #[error("execution {workflow} on {deployment} did not start within {waited:?}")]
    ExecutionNotStarted {
        workflow: String,
        deployment: String,
        waited: Duration,
    },

    #[error(transparent)]
    Status(#[from] StatusError),
}

impl GatewayError {
    /// True when every endpoint was tried and none could serve the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            GatewayError::NoHealthyManagers => true,
            GatewayError::StartWorkflowFailed { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }
}
