//! Nagios external commands.
//!
//! Commands are single `[<epoch>] NAME;arg;arg` lines written to the
//! daemon's command pipe.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::error::{StatusError, StatusResult};
use crate::objects::ObjectConfiguration;
use crate::status::{HostStatus, StatusSnapshot};

/// Author recorded on comments and notifications.
pub const COMMENT_AUTHOR: &str = "Cloudify";

/// Delay before an "immediate" check, in seconds.
const CHECK_DELAY_SECS: u64 = 3;

/// Force, broadcast and increment the notification number.
const FORCED_NOTIFICATION_OPTIONS: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalCommand {
    ProcessServiceCheckResult {
        host: String,
        service: String,
        state: ServiceState,
        output: String,
    },
    AddHostComment {
        host: String,
        comment: String,
    },
    DeleteHostComment {
        comment_id: String,
    },
    SendCustomHostNotification {
        host: String,
        comment: String,
    },
    ScheduleServiceCheck {
        host: String,
        service: String,
        at: u64,
    },
    ScheduleHostCheck {
        host: String,
        at: u64,
    },
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalCommand::ProcessServiceCheckResult {
                host,
                service,
                state,
                output,
            } => write!(
                f,
                "PROCESS_SERVICE_CHECK_RESULT;{host};{service};{};{output}",
                *state as u8
            ),
            ExternalCommand::AddHostComment { host, comment } => {
                // Persist across restarts.
                write!(f, "ADD_HOST_COMMENT;{host};1;{COMMENT_AUTHOR};{comment}")
            }
            ExternalCommand::DeleteHostComment { comment_id } => {
                write!(f, "DEL_HOST_COMMENT;{comment_id}")
            }
            ExternalCommand::SendCustomHostNotification { host, comment } => write!(
                f,
                "SEND_CUSTOM_HOST_NOTIFICATION;{host};{FORCED_NOTIFICATION_OPTIONS};{COMMENT_AUTHOR};{comment}"
            ),
            ExternalCommand::ScheduleServiceCheck { host, service, at } => {
                write!(f, "SCHEDULE_SVC_CHECK;{host};{service};{at}")
            }
            ExternalCommand::ScheduleHostCheck { host, at } => {
                write!(f, "SCHEDULE_HOST_CHECK;{host};{at}")
            }
        }
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub struct ExternalCommandWriter {
    path: PathBuf,
}

impl ExternalCommandWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn send(&self, command: &ExternalCommand) -> StatusResult<()> {
        debug!(%command, "sending external command");
        let line = format!("[{}] {command}\n", epoch_now());
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| StatusError::CommandFile {
                path: self.path.clone(),
                source,
            })
    }

    pub fn submit_passive_check_result(
        &self,
        host: &str,
        service: &str,
        state: ServiceState,
        output: &str,
    ) -> StatusResult<()> {
        self.send(&ExternalCommand::ProcessServiceCheckResult {
            host: host.to_string(),
            service: service.to_string(),
            state,
            output: output.to_string(),
        })
    }

    pub fn add_comment(&self, host: &str, comment: &str) -> StatusResult<()> {
        self.send(&ExternalCommand::AddHostComment {
            host: host.to_string(),
            comment: comment.to_string(),
        })
    }

    pub fn delete_comment(&self, comment_id: &str) -> StatusResult<()> {
        self.send(&ExternalCommand::DeleteHostComment {
            comment_id: comment_id.to_string(),
        })
    }

    pub fn send_host_notification(&self, host: &str, comment: &str) -> StatusResult<()> {
        self.send(&ExternalCommand::SendCustomHostNotification {
            host: host.to_string(),
            comment: comment.to_string(),
        })
    }

    pub fn schedule_service_check(&self, host: &str, service: &str) -> StatusResult<()> {
        self.send(&ExternalCommand::ScheduleServiceCheck {
            host: host.to_string(),
            service: service.to_string(),
            at: epoch_now() + CHECK_DELAY_SECS,
        })
    }

    pub fn schedule_host_check(&self, host: &str) -> StatusResult<()> {
        self.send(&ExternalCommand::ScheduleHostCheck {
            host: host.to_string(),
            at: epoch_now() + CHECK_DELAY_SECS,
        })
    }

    /// Recheck the host if it is down, and each failing service.
    pub fn recheck_failing_for_host(&self, host: &str, status: &HostStatus) -> StatusResult<()> {
        if !status.is_host_up() {
            self.schedule_host_check(host)?;
        }
        for service in &status.failing {
            self.schedule_service_check(host, service)?;
        }
        Ok(())
    }

    pub fn recheck_failing_for_hostgroup(
        &self,
        objects: &ObjectConfiguration,
        snapshot: &StatusSnapshot,
        hostgroup: &str,
    ) -> StatusResult<()> {
        for (host, status) in snapshot.hostgroup_status(objects, hostgroup) {
            self.recheck_failing_for_host(&host, &status)?;
        }
        Ok(())
    }

    /// Delete our own host comments older than `max_age_secs`.
    /// Returns how many were deleted.
    pub fn delete_old_host_comments(&self, snapshot: &StatusSnapshot, max_age_secs: u64) -> StatusResult<usize> {
        let now = epoch_now();
        let mut deleted = 0;
        for (comment_id, entry_time) in snapshot.host_comments_by(COMMENT_AUTHOR) {
            if now.saturating_sub(entry_time) > max_age_secs {
                self.delete_comment(&comment_id)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(deleted, "expired host comments removed");
        }
        Ok(deleted)
    }
}
