//! In-process command runner (for testing).
//!
//! Filesystem commands act directly on the local filesystem; ownership and
//! security labels are accepted and ignored. Validation runs a scriptable
//! hook and reloads are only counted, so store behaviour can be exercised
//! against a temporary objects root without Nagios installed.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::command::{CommandError, CommandRunner, Privilege, SystemCommand};

type Validator = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

pub struct LocalRunner {
    validator: RwLock<Validator>,
    commands: Mutex<Vec<(SystemCommand, Privilege)>>,
    validations: AtomicUsize,
    reloads: AtomicUsize,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRunner {
    /// A runner whose validation always succeeds.
    pub fn new() -> Self {
        Self {
            validator: RwLock::new(Arc::new(|| Ok(()))),
            commands: Mutex::new(Vec::new()),
            validations: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    /// A runner whose validation always fails with `output`.
    pub fn failing_validation(output: &str) -> Self {
        let runner = Self::new();
        let output = output.to_string();
        runner.set_validator(move || Err(output.clone()));
        runner
    }

    pub fn set_validator(&self, validator: impl Fn() -> Result<(), String> + Send + Sync + 'static) {
        if let Ok(mut slot) = self.validator.write() {
            *slot = Arc::new(validator);
        }
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<(SystemCommand, Privilege)> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn execute(&self, command: &SystemCommand) -> Result<String, CommandError> {
        match command {
            SystemCommand::Move { from, to } => {
                require(from)?;
                if fs::rename(from, to).is_err() {
                    // Crossing filesystems.
                    fs::copy(from, to).map_err(|e| failed(command, e))?;
                    fs::remove_file(from).map_err(|e| failed(command, e))?;
                }
            }
            SystemCommand::Copy { from, to } => {
                require(from)?;
                fs::copy(from, to).map_err(|e| failed(command, e))?;
            }
            SystemCommand::SetMode { path, mode } => {
                require(path)?;
                let bits = u32::from_str_radix(mode, 8).map_err(|e| CommandError::Failed {
                    command: command.argv().join(" "),
                    status: "1".to_string(),
                    output: e.to_string(),
                })?;
                fs::set_permissions(path, fs::Permissions::from_mode(bits))
                    .map_err(|e| failed(command, e))?;
            }
            SystemCommand::SetOwner { path, .. }
            | SystemCommand::SetGroup { path, .. }
            | SystemCommand::RestoreLabel { path } => require(path)?,
            SystemCommand::MakeDir { path } => {
                fs::create_dir_all(path).map_err(|e| failed(command, e))?;
            }
            SystemCommand::RemoveTree { path } => {
                let result = if path.is_dir() {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_file(path)
                };
                match result {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(failed(command, e)),
                }
            }
            SystemCommand::RemoveEmptyDir { path } => match fs::remove_dir(path) {
                Ok(()) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
                    ) => {}
                Err(e) => return Err(failed(command, e)),
            },
            SystemCommand::Touch { path } => {
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| failed(command, e))?;
            }
            SystemCommand::ValidateConfig { .. } => {
                self.validations.fetch_add(1, Ordering::SeqCst);
                let validator = self
                    .validator
                    .read()
                    .map(|v| Arc::clone(&v))
                    .map_err(|e| failed(command, std::io::Error::other(e.to_string())))?;
                validator().map_err(|output| CommandError::Failed {
                    command: command.argv().join(" "),
                    status: "exit status: 1".to_string(),
                    output,
                })?;
            }
            SystemCommand::ReloadDaemon { .. } => {
                self.reloads.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(String::new())
    }
}

impl CommandRunner for LocalRunner {
    fn run(&self, command: &SystemCommand, privilege: Privilege) -> Result<String, CommandError> {
        if let Ok(mut log) = self.commands.lock() {
            log.push((command.clone(), privilege));
        }
        self.execute(command)
    }
}

fn require(path: &Path) -> Result<(), CommandError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CommandError::Missing {
            path: path.to_path_buf(),
        })
    }
}

fn failed(command: &SystemCommand, err: std::io::Error) -> CommandError {
    CommandError::Failed {
        command: command.argv().join(" "),
        status: "exit status: 1".to_string(),
        output: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_validations_and_reloads() {
        let runner = LocalRunner::failing_validation("Error: bad object");
        let validate = SystemCommand::ValidateConfig {
            main_config: "/etc/nagios/nagios.cfg".into(),
        };
        let err = runner.run(&validate, Privilege::Elevated).unwrap_err();
        assert_eq!(err.output(), "Error: bad object");
        runner
            .run(
                &SystemCommand::ReloadDaemon {
                    service: "nagios".to_string(),
                },
                Privilege::Elevated,
            )
            .unwrap();
        assert_eq!(runner.validations(), 1);
        assert_eq!(runner.reloads(), 1);
        assert_eq!(runner.commands().len(), 2);
    }

    #[test]
    fn remove_tree_tolerates_absent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new();
        runner
            .run(
                &SystemCommand::RemoveTree {
                    path: dir.path().join("nothing-here"),
                },
                Privilege::Unprivileged,
            )
            .unwrap();
    }

    #[test]
    fn set_mode_applies_octal_bits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.cfg");
        fs::write(&path, "x").unwrap();
        LocalRunner::new()
            .run(
                &SystemCommand::SetMode {
                    path: path.clone(),
                    mode: "640".to_string(),
                },
                Privilege::Unprivileged,
            )
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
