//! System commands the store needs, and who runs them.
//!
//! Object files belong to the Nagios user and live under SELinux labels,
//! so some steps need `sudo`. Callers state the [`Privilege`] an operation
//! runs with; the [`CommandRunner`] decides how that is realised.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Privilege an operation runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// As the service user (the REST service runs as `nagios`).
    Unprivileged,
    /// Through `sudo` (orchestration operations run as a deploy user).
    Elevated,
}

impl Privilege {
    pub fn is_elevated(&self) -> bool {
        matches!(self, Privilege::Elevated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    Move { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    SetMode { path: PathBuf, mode: String },
    SetOwner { path: PathBuf, owner: String },
    SetGroup { path: PathBuf, group: String },
    /// Re-apply the default security label.
    RestoreLabel { path: PathBuf },
    MakeDir { path: PathBuf },
    /// `rm -rf`; absent paths are not an error.
    RemoveTree { path: PathBuf },
    /// `rmdir`, leaving directories that are not empty.
    RemoveEmptyDir { path: PathBuf },
    Touch { path: PathBuf },
    /// Check the full configuration without touching the running daemon.
    ValidateConfig { main_config: PathBuf },
    ReloadDaemon { service: String },
}

impl SystemCommand {
    pub fn argv(&self) -> Vec<String> {
        fn s(path: &Path) -> String {
            path.display().to_string()
        }
        match self {
            SystemCommand::Move { from, to } => vec!["mv".into(), s(from), s(to)],
            SystemCommand::Copy { from, to } => vec!["cp".into(), "-p".into(), s(from), s(to)],
            SystemCommand::SetMode { path, mode } => vec!["chmod".into(), mode.clone(), s(path)],
            SystemCommand::SetOwner { path, owner } => vec!["chown".into(), owner.clone(), s(path)],
            SystemCommand::SetGroup { path, group } => vec!["chgrp".into(), group.clone(), s(path)],
            SystemCommand::RestoreLabel { path } => vec!["restorecon".into(), s(path)],
            SystemCommand::MakeDir { path } => vec!["mkdir".into(), "-p".into(), s(path)],
            SystemCommand::RemoveTree { path } => vec!["rm".into(), "-rf".into(), s(path)],
            SystemCommand::RemoveEmptyDir { path } => {
                vec!["rmdir".into(), "--ignore-fail-on-non-empty".into(), s(path)]
            }
            SystemCommand::Touch { path } => vec!["touch".into(), s(path)],
            SystemCommand::ValidateConfig { main_config } => {
                vec!["nagios".into(), "-v".into(), s(main_config)]
            }
            SystemCommand::ReloadDaemon { service } => {
                vec!["systemctl".into(), "reload".into(), service.clone()]
            }
        }
    }

    /// Verb used in error context ("failed to <operation> <path>").
    pub fn operation(&self) -> &'static str {
        match self {
            SystemCommand::Move { .. } => "move",
            SystemCommand::Copy { .. } => "copy",
            SystemCommand::SetMode { .. } => "set mode on",
            SystemCommand::SetOwner { .. } => "set owner on",
            SystemCommand::SetGroup { .. } => "set group on",
            SystemCommand::RestoreLabel { .. } => "restore security label on",
            SystemCommand::MakeDir { .. } => "create directory",
            SystemCommand::RemoveTree { .. } => "remove",
            SystemCommand::RemoveEmptyDir { .. } => "remove directory",
            SystemCommand::Touch { .. } => "touch",
            SystemCommand::ValidateConfig { .. } => "validate",
            SystemCommand::ReloadDaemon { .. } => "reload",
        }
    }

    /// Whether a "No such file or directory" failure means the path the
    /// command acts on is absent. Other commands keep their full output.
    fn fails_on_missing_path(&self) -> bool {
        matches!(
            self,
            SystemCommand::Move { .. } | SystemCommand::Copy { .. } | SystemCommand::RemoveTree { .. }
        )
    }

    /// The path the command acts on.
    pub fn path(&self) -> PathBuf {
        match self {
            SystemCommand::Move { from, .. } | SystemCommand::Copy { from, .. } => from.clone(),
            SystemCommand::SetMode { path, .. }
            | SystemCommand::SetOwner { path, .. }
            | SystemCommand::SetGroup { path, .. }
            | SystemCommand::RestoreLabel { path }
            | SystemCommand::MakeDir { path }
            | SystemCommand::RemoveTree { path }
            | SystemCommand::RemoveEmptyDir { path }
            | SystemCommand::Touch { path } => path.clone(),
            SystemCommand::ValidateConfig { main_config } => main_config.clone(),
            SystemCommand::ReloadDaemon { service } => PathBuf::from(service),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    #[error("no such file or directory: {}", path.display())]
    Missing { path: PathBuf },
}

impl CommandError {
    /// Combined output of a failed command, for validation reports.
    pub fn output(&self) -> String {
        match self {
            CommandError::Failed { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}

/// Executes [`SystemCommand`]s. Returns combined stdout/stderr.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &SystemCommand, privilege: Privilege) -> Result<String, CommandError>;
}

/// Runs commands as child processes, through `sudo` when elevated.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &SystemCommand, privilege: Privilege) -> Result<String, CommandError> {
        let mut argv = command.argv();
        if privilege.is_elevated() {
            argv.insert(0, "sudo".to_string());
        }
        debug!(command = %argv.join(" "), "running");

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .env("LC_ALL", "C")
            .output()
            .map_err(|source| CommandError::Spawn {
                program: argv[0].clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            return Ok(text);
        }
        Err(failure(command, &argv, output.status.to_string(), &text))
    }
}

fn failure(command: &SystemCommand, argv: &[String], status: String, output: &str) -> CommandError {
    if command.fails_on_missing_path() && output.contains("No such file or directory") {
        return CommandError::Missing {
            path: command.path(),
        };
    }
    CommandError::Failed {
        command: argv.join(" "),
        status,
        output: output.trim().to_string(),
    }
}
