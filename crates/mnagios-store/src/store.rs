//! ConfigStore — validated, rollback-safe changes to the objects tree.
//!
//! Every change follows the same shape: stage in a scratch directory,
//! back up whatever is being replaced, move into place, then validate the
//! whole configuration. A failed validation restores the prior state before
//! the error is returned, so the tree on disk always loads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mnagios_core::DaemonConfig;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::command::{CommandError, CommandRunner, Privilege, SystemCommand};
use crate::error::{StoreError, StoreResult};
use crate::layout::ObjectLayout;
use crate::local::LocalRunner;
use crate::reload::{Clock, ReloadArbiter, ReloadOutcome, ReloadPolicy, SystemClock};
use crate::template::{TemplateParams, TemplateSource, Templates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    pub privilege: Privilege,
    pub reload: bool,
    pub validate: bool,
}

impl DeployOptions {
    /// Validate and reload.
    pub fn new(privilege: Privilege) -> Self {
        Self {
            privilege,
            reload: true,
            validate: true,
        }
    }

    pub fn without_reload(mut self) -> Self {
        self.reload = false;
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    pub privilege: Privilege,
    pub reload: bool,
    /// Treat an absent file as already removed.
    pub ignore_missing: bool,
}

impl RemoveOptions {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            privilege,
            reload: true,
            ignore_missing: false,
        }
    }

    pub fn without_reload(mut self) -> Self {
        self.reload = false;
        self
    }

    pub fn ignoring_missing(mut self) -> Self {
        self.ignore_missing = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Absent and `ignore_missing` was set; nothing was done.
    Skipped,
}

/// How to undo a change when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    Nothing,
    /// The change created `path`, and the directories in `created_dirs`
    /// (deepest first) to hold it.
    Remove { path: PathBuf, created_dirs: Vec<PathBuf> },
    /// The change replaced `dest`; the prior content is at `backup`.
    Restore { backup: PathBuf, dest: PathBuf },
    /// The change moved `to` away to `from`.
    MoveBack { from: PathBuf, to: PathBuf },
}

#[derive(Debug, Clone)]
struct StoreSettings {
    owner: String,
    file_mode: String,
    dir_mode: String,
    main_config: PathBuf,
    scratch_dir: PathBuf,
}

/// A file moved into the tree; `_staging` holds the backup until dropped.
struct Placed {
    _staging: TempDir,
    rollback: Rollback,
}

pub struct ConfigStore {
    layout: ObjectLayout,
    templates: Templates,
    runner: Arc<dyn CommandRunner>,
    settings: StoreSettings,
    reload: ReloadArbiter,
}

impl ConfigStore {
    pub fn new(config: &DaemonConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_clock(config, runner, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DaemonConfig, runner: Arc<dyn CommandRunner>, clock: Arc<dyn Clock>) -> Self {
        let policy = ReloadPolicy {
            trigger_file: config.reload.trigger_file.clone(),
            delay: Duration::from_secs(config.reload.delay_secs),
            grace: Duration::from_secs(config.reload.grace_secs),
            service: config.nagios.service.clone(),
            group: config.objects.group.clone(),
            shared_mode: config.objects.file_mode.clone(),
        };
        Self {
            layout: ObjectLayout::new(&config.nagios.objects_dir),
            templates: Templates::new(config.nagios.template_dir.clone()),
            runner,
            settings: StoreSettings {
                owner: config.objects.owner.clone(),
                file_mode: config.objects.file_mode.clone(),
                dir_mode: config.objects.dir_mode.clone(),
                main_config: config.nagios.main_config.clone(),
                scratch_dir: config.storage.scratch_dir.clone(),
            },
            reload: ReloadArbiter::new(policy, clock),
        }
    }

    /// A store rooted at `dir/objects` with no reload delay (for testing).
    pub fn local(dir: &Path, runner: Arc<LocalRunner>) -> Self {
        let mut config = DaemonConfig::default();
        config.nagios.objects_dir = dir.join("objects");
        config.storage.scratch_dir = dir.join("scratch");
        config.storage.rate_data_dir = dir.join("rate");
        config.reload.trigger_file = dir.join("nagios_reload_triggered");
        config.reload.delay_secs = 0;
        config.reload.grace_secs = 0;
        Self::new(&config, runner)
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    // ── Deploy ─────────────────────────────────────────────────────

    /// Render `source` and install it at `dest` (relative to the root).
    ///
    /// Rendering happens before anything is touched, so a template error
    /// leaves the tree unchanged.
    pub fn deploy(
        &self,
        dest: &Path,
        source: &TemplateSource,
        params: &TemplateParams,
        options: DeployOptions,
    ) -> StoreResult<()> {
        let text = self.templates.render(source, params)?;
        debug!(dest = %dest.display(), template = %source, "deploying");
        self.install(dest, &text, options)
    }

    /// Deploy only if `dest` is absent or differs from the rendered text.
    /// Returns whether anything changed.
    pub fn ensure(
        &self,
        dest: &Path,
        source: &TemplateSource,
        params: &TemplateParams,
        options: DeployOptions,
    ) -> StoreResult<bool> {
        let text = self.templates.render(source, params)?;
        if self.read(dest)?.as_deref() == Some(text.as_str()) {
            debug!(dest = %dest.display(), "already up to date");
            return Ok(false);
        }
        self.install(dest, &text, options)?;
        Ok(true)
    }

    /// Install a data file Nagios does not parse. No validation or reload.
    pub fn deploy_data(&self, dest: &Path, contents: &str, privilege: Privilege) -> StoreResult<()> {
        debug!(dest = %dest.display(), "deploying data file");
        self.place(dest, contents, privilege).map(|_| ())
    }

    fn install(&self, dest: &Path, text: &str, options: DeployOptions) -> StoreResult<()> {
        let placed = self.place(dest, text, options.privilege)?;
        if options.validate {
            self.validate(&placed.rollback, options.privilege)?;
        }
        drop(placed);
        if options.reload {
            self.trigger_reload(options.privilege)?;
        }
        Ok(())
    }

    fn place(&self, dest: &Path, contents: &str, privilege: Privilege) -> StoreResult<Placed> {
        let absolute = self.layout.absolute(dest);
        let name = absolute
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath {
                segment: dest.display().to_string(),
                reason: "no file name",
            })?
            .to_owned();

        let mut created_dirs = Vec::new();
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() && !self.layout.absolute(parent).is_dir() {
                created_dirs = self
                    .layout
                    .absolute(parent)
                    .ancestors()
                    .take_while(|dir| !dir.exists())
                    .map(Path::to_path_buf)
                    .collect();
                self.make_subdirectory(parent, privilege)?;
            }
        }

        let staging = self.staging_dir()?;
        let staged = staging.path().join(&name);
        fs::write(&staged, contents).map_err(|e| StoreError::io("stage", &staged, e))?;

        let rollback = if absolute.exists() {
            let backup = staging.path().join(format!("{}.previous", name.to_string_lossy()));
            self.run(
                SystemCommand::Copy {
                    from: absolute.clone(),
                    to: backup.clone(),
                },
                privilege,
            )?;
            Rollback::Restore {
                backup,
                dest: absolute.clone(),
            }
        } else {
            Rollback::Remove {
                path: absolute.clone(),
                created_dirs,
            }
        };

        self.run(
            SystemCommand::Move {
                from: staged,
                to: absolute.clone(),
            },
            privilege,
        )?;
        self.apply_attributes(&absolute, &self.settings.file_mode, privilege)?;

        Ok(Placed {
            _staging: staging,
            rollback,
        })
    }

    // ── Remove ─────────────────────────────────────────────────────

    pub fn remove(&self, dest: &Path, options: RemoveOptions) -> StoreResult<Removal> {
        let absolute = self.layout.absolute(dest);
        let staging = self.staging_dir()?;
        let parked = staging.path().join(
            absolute
                .file_name()
                .map(|n| n.to_owned())
                .unwrap_or_else(|| "removed".into()),
        );

        match self.runner.run(
            &SystemCommand::Move {
                from: absolute.clone(),
                to: parked.clone(),
            },
            options.privilege,
        ) {
            Ok(_) => {}
            Err(CommandError::Missing { .. }) if options.ignore_missing => {
                debug!(path = %absolute.display(), "already absent");
                return Ok(Removal::Skipped);
            }
            Err(CommandError::Missing { .. }) => return Err(StoreError::NotFound(absolute)),
            Err(source) => {
                return Err(StoreError::Command {
                    operation: "move",
                    path: absolute,
                    source,
                });
            }
        }

        self.validate(
            &Rollback::MoveBack {
                from: parked,
                to: absolute.clone(),
            },
            options.privilege,
        )?;
        self.run(
            SystemCommand::RemoveTree {
                path: staging.path().to_path_buf(),
            },
            options.privilege,
        )?;
        info!(path = %absolute.display(), "removed configuration object");

        if options.reload {
            self.trigger_reload(options.privilege)?;
        }
        Ok(Removal::Removed)
    }

    /// Recursively delete `dir`. Absent directories are fine.
    pub fn remove_tree(&self, dir: &Path, privilege: Privilege) -> StoreResult<()> {
        self.run(
            SystemCommand::RemoveTree {
                path: self.layout.absolute(dir),
            },
            privilege,
        )
    }

    // ── Directories and markers ────────────────────────────────────

    /// Create `dir` and any parents. Idempotent.
    pub fn make_subdirectory(&self, dir: &Path, privilege: Privilege) -> StoreResult<()> {
        let absolute = self.layout.absolute(dir);
        self.run(
            SystemCommand::MakeDir {
                path: absolute.clone(),
            },
            privilege,
        )?;
        self.apply_attributes(&absolute, &self.settings.dir_mode, privilege)
    }

    /// Create an empty marker file, with its parent directories.
    pub fn touch(&self, path: &Path, privilege: Privilege) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.make_subdirectory(parent, privilege)?;
            }
        }
        self.run(
            SystemCommand::Touch {
                path: self.layout.absolute(path),
            },
            privilege,
        )
    }

    fn apply_attributes(&self, path: &Path, mode: &str, privilege: Privilege) -> StoreResult<()> {
        self.run(
            SystemCommand::SetMode {
                path: path.to_path_buf(),
                mode: mode.to_string(),
            },
            privilege,
        )?;
        if privilege.is_elevated() {
            self.run(
                SystemCommand::SetOwner {
                    path: path.to_path_buf(),
                    owner: self.settings.owner.clone(),
                },
                privilege,
            )?;
        }
        self.run(
            SystemCommand::RestoreLabel {
                path: path.to_path_buf(),
            },
            privilege,
        )
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn exists(&self, path: &Path) -> bool {
        self.layout.absolute(path).exists()
    }

    /// Content of `path`, or `None` if it does not exist.
    pub fn read(&self, path: &Path) -> StoreResult<Option<String>> {
        let absolute = self.layout.absolute(path);
        match fs::read_to_string(&absolute) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("read", absolute, e)),
        }
    }

    /// Names of the regular files directly in `dir`, optionally only those
    /// with `extension`. Sorted; empty if `dir` does not exist.
    pub fn list_files(&self, dir: &Path, extension: Option<&str>) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .entries(dir)?
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .map(|(name, _)| name)
            .filter(|name| match extension {
                Some(ext) => Path::new(name).extension().is_some_and(|e| e == ext),
                None => true,
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Names of the subdirectories of `dir`. Sorted; empty if absent.
    pub fn list_dirs(&self, dir: &Path) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .entries(dir)?
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every file named `file_name` anywhere below `dir`, as paths relative
    /// to the root.
    pub fn find_files(&self, dir: &Path, file_name: &str) -> Vec<PathBuf> {
        let root = self.layout.root();
        let mut found: Vec<PathBuf> = WalkDir::new(self.layout.absolute(dir))
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
            .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();
        found.sort();
        found
    }

    fn entries(&self, dir: &Path) -> StoreResult<Vec<(String, bool)>> {
        let absolute = self.layout.absolute(dir);
        let read = match fs::read_dir(&absolute) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("list", absolute, e)),
        };
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| StoreError::io("list", &absolute, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| StoreError::io("stat", entry.path(), e))?
                .is_dir();
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        Ok(entries)
    }

    // ── Validation and reload ──────────────────────────────────────

    /// Validate the full configuration, undoing `rollback` on failure.
    pub fn validate(&self, rollback: &Rollback, privilege: Privilege) -> StoreResult<()> {
        let command = SystemCommand::ValidateConfig {
            main_config: self.settings.main_config.clone(),
        };
        let output = match self.runner.run(&command, privilege) {
            Ok(_) => return Ok(()),
            Err(e) => e.output(),
        };
        warn!(%output, ?rollback, "configuration validation failed, rolling back");

        let undone = match rollback {
            Rollback::Nothing => Ok(()),
            Rollback::Remove { path, created_dirs } => self
                .run(SystemCommand::RemoveTree { path: path.clone() }, privilege)
                .and_then(|()| {
                    // A concurrent writer may have filled them since; those stay.
                    created_dirs.iter().try_for_each(|dir| {
                        self.run(SystemCommand::RemoveEmptyDir { path: dir.clone() }, privilege)
                    })
                }),
            Rollback::Restore { backup, dest } => self.run(
                SystemCommand::Move {
                    from: backup.clone(),
                    to: dest.clone(),
                },
                privilege,
            ),
            Rollback::MoveBack { from, to } => self.run(
                SystemCommand::Move {
                    from: from.clone(),
                    to: to.clone(),
                },
                privilege,
            ),
        };
        match undone {
            Ok(()) => Err(StoreError::Validation { output }),
            Err(e) => Err(StoreError::RollbackFailed {
                output,
                rollback: e.to_string(),
            }),
        }
    }

    /// Coordinate a daemon reload with any concurrent writers.
    pub fn trigger_reload(&self, privilege: Privilege) -> StoreResult<ReloadOutcome> {
        self.reload.trigger(self.runner.as_ref(), privilege)
    }

    fn staging_dir(&self) -> StoreResult<TempDir> {
        let scratch = &self.settings.scratch_dir;
        fs::create_dir_all(scratch).map_err(|e| StoreError::io("create scratch directory", scratch, e))?;
        tempfile::Builder::new()
            .prefix("managed_nagios")
            .tempdir_in(scratch)
            .map_err(|e| StoreError::io("create staging directory in", scratch, e))
    }

    fn run(&self, command: SystemCommand, privilege: Privilege) -> StoreResult<()> {
        self.runner
            .run(&command, privilege)
            .map(|_| ())
            .map_err(|source| StoreError::Command {
                operation: command.operation(),
                path: command.path(),
                source,
            })
    }
}
