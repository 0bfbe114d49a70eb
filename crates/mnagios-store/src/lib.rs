//! mnagios-store — the Nagios configuration object store.
//!
//! Owns the objects tree on disk. Everything that writes Nagios object
//! definitions goes through [`ConfigStore`], which renders templates,
//! validates the whole configuration after each change, rolls back on
//! failure and coordinates daemon reloads between concurrent writers.
//!
//! - [`layout`]: where each kind of object lives.
//! - [`template`]: built-in object templates and rendering.
//! - [`command`]: privileged system commands and their runner.
//! - [`reload`]: the reload trigger-file protocol.

pub mod command;
pub mod error;
pub mod layout;
pub mod local;
pub mod reload;
pub mod store;
pub mod template;

pub use command::{CommandError, CommandRunner, Privilege, ProcessRunner, SystemCommand};
pub use error::{StoreError, StoreResult};
pub use layout::{ObjectLayout, check_segment, md5_hex};
pub use local::LocalRunner;
pub use reload::{Clock, ReloadArbiter, ReloadOutcome, ReloadPolicy, SystemClock};
pub use store::{ConfigStore, DeployOptions, Removal, RemoveOptions, Rollback};
pub use template::{BuiltinTemplate, TemplateParams, TemplateSource, Templates};
