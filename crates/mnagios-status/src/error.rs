use std::path::PathBuf;

use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write command to {path}: {source}")]
    CommandFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("instance {0} not found in the object cache")]
    InstanceNotFound(String),

    #[error("deployment hostgroup {0} not found in the object cache")]
    DeploymentGroupNotFound(String),
}

impl StatusError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StatusError::InstanceNotFound(_) | StatusError::DeploymentGroupNotFound(_)
        )
    }
}
