//! Reload arbitration.
//!
//! Reloading Nagios too often destabilises it, and many writers change
//! the objects tree at once. Writers coordinate through one trigger file
//! holding the epoch time (decimal seconds) by which the pending reload
//! will have happened:
//!
//! ```text
//!            claim (atomic link)            reload + remove
//!   IDLE ─────────────────────────▶ PENDING ────────────────▶ IDLE
//!     ▲                               │
//!     └── stale (deadline passed) ────┘  adopt: remove, then claim
//! ```
//!
//! A writer that finds a pending reload waits until just past its deadline.
//! If the file is gone by then the holder reloaded for everyone and the
//! writer returns. If it is still there the holder is presumed dead and the
//! file is adopted. This is advisory exclusion on one host, not a lock.
//! A holder whose reload overruns the deadline can still remove a trigger
//! a waiter has since adopted; the adopter then reloads once more.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::command::{CommandRunner, Privilege, SystemCommand};
use crate::error::{StoreError, StoreResult};

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        epoch_secs(SystemTime::now())
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct ReloadPolicy {
    pub trigger_file: PathBuf,
    /// How long a claimed reload waits to coalesce further changes.
    pub delay: Duration,
    /// Extra wait past a peer's deadline before presuming it dead.
    pub grace: Duration,
    pub service: String,
    /// Group given write access when the file must be removable by a
    /// less privileged writer.
    pub group: String,
    pub shared_mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// This writer issued the reload.
    Reloaded,
    /// Another writer's reload covered this change.
    HandledByPeer,
}

/// Mode of a freshly claimed trigger, readable by every writer.
const TRIGGER_MODE: u32 = 0o644;

struct Trigger {
    deadline: f64,
    raw: String,
}

pub struct ReloadArbiter {
    policy: ReloadPolicy,
    clock: Arc<dyn Clock>,
}

impl ReloadArbiter {
    pub fn new(policy: ReloadPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &ReloadPolicy {
        &self.policy
    }

    /// Make sure a reload happens after the caller's changes.
    ///
    /// `share` is the privilege of the caller: an elevated caller opens
    /// the trigger file to the service group so unprivileged writers can
    /// adopt it, and removes it with elevated rights.
    pub fn trigger(&self, runner: &dyn CommandRunner, share: Privilege) -> StoreResult<ReloadOutcome> {
        loop {
            let Some(current) = self.read_trigger()? else {
                if self.claim()? {
                    break;
                }
                continue;
            };

            let now = self.clock.now();
            if current.deadline >= now {
                let wait = current.deadline - now + self.policy.grace.as_secs_f64();
                debug!(wait_secs = wait, "reload already pending, waiting for it");
                self.clock.sleep(Duration::from_secs_f64(wait));
                match self.read_trigger()? {
                    None => {
                        debug!("pending reload completed by peer");
                        return Ok(ReloadOutcome::HandledByPeer);
                    }
                    Some(after) if after.raw != current.raw => continue,
                    Some(_) => {}
                }
            }

            warn!(
                trigger = %self.policy.trigger_file.display(),
                "reload trigger outlived its deadline, adopting it"
            );
            self.discard_stale(runner, &current, share)?;
        }

        self.reload_as_holder(runner, share)
    }

    fn reload_as_holder(&self, runner: &dyn CommandRunner, share: Privilege) -> StoreResult<ReloadOutcome> {
        let trigger = self.policy.trigger_file.clone();

        if share.is_elevated() {
            run(
                runner,
                SystemCommand::SetGroup {
                    path: trigger.clone(),
                    group: self.policy.group.clone(),
                },
                Privilege::Elevated,
            )?;
            run(
                runner,
                SystemCommand::SetMode {
                    path: trigger.clone(),
                    mode: self.policy.shared_mode.clone(),
                },
                Privilege::Unprivileged,
            )?;
        }

        self.clock.sleep(self.policy.delay);

        info!(service = %self.policy.service, "reloading monitoring daemon");
        let reloaded = runner.run(
            &SystemCommand::ReloadDaemon {
                service: self.policy.service.clone(),
            },
            Privilege::Elevated,
        );

        run(runner, SystemCommand::RemoveTree { path: trigger }, share)?;

        match reloaded {
            Ok(_) => Ok(ReloadOutcome::Reloaded),
            Err(e) => Err(StoreError::Reload(e.to_string())),
        }
    }

    fn read_trigger(&self) -> StoreResult<Option<Trigger>> {
        let path = &self.policy.trigger_file;
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // Claimed by a more privileged writer: pending, counted from its mtime.
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                let deadline = self.deadline_from_mtime(path);
                return Ok(Some(Trigger {
                    deadline,
                    raw: format!("unreadable@{deadline}"),
                }));
            }
            Err(e) => return Err(StoreError::io("read reload trigger", path, e)),
        };
        let deadline = match raw.trim().parse::<f64>() {
            Ok(deadline) => deadline,
            // Written but not parseable: count from the file's mtime.
            Err(_) => self.deadline_from_mtime(path),
        };
        Ok(Some(Trigger { deadline, raw }))
    }

    fn deadline_from_mtime(&self, path: &Path) -> f64 {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|t| epoch_secs(t) + self.policy.delay.as_secs_f64())
            .unwrap_or_default()
    }

    /// Create the trigger file atomically. Returns false if another writer
    /// got there first.
    fn claim(&self) -> StoreResult<bool> {
        let path = &self.policy.trigger_file;
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let deadline = self.clock.now() + self.policy.delay.as_secs_f64();

        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| StoreError::io("stage reload trigger in", &dir, e))?;
        staged
            .write_all(deadline.to_string().as_bytes())
            .and_then(|_| staged.flush())
            .and_then(|_| {
                staged
                    .as_file()
                    .set_permissions(fs::Permissions::from_mode(TRIGGER_MODE))
            })
            .map_err(|e| StoreError::io("write reload trigger", staged.path(), e))?;

        match fs::hard_link(staged.path(), path) {
            Ok(()) => {
                debug!(deadline, "reload trigger claimed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::io("claim reload trigger", path, e)),
        }
    }

    fn discard_stale(&self, runner: &dyn CommandRunner, stale: &Trigger, share: Privilege) -> StoreResult<()> {
        match self.read_trigger()? {
            Some(current) if current.raw == stale.raw => run(
                runner,
                SystemCommand::RemoveTree {
                    path: self.policy.trigger_file.clone(),
                },
                share,
            ),
            _ => Ok(()),
        }
    }
}

fn run(runner: &dyn CommandRunner, command: SystemCommand, privilege: Privilege) -> StoreResult<()> {
    runner
        .run(&command, privilege)
        .map(|_| ())
        .map_err(|source| StoreError::Command {
            operation: command.operation(),
            path: command.path(),
            source,
        })
}
