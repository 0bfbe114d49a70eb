//! mnagios-status — reading the state Nagios publishes.
//!
//! Nagios writes two block-structured files: the compiled object cache
//! (what is configured, stable between reloads) and the status file (what
//! is happening, rewritten continuously). Both go through one parser.
//!
//! ```text
//! NagiosStateReader
//!   ├── ObjectCache ── objects.cache ─▶ ObjectConfiguration (hostgroups, hosts, identity lookups)
//!   ├── status.dat ─────────────────────▶ StatusSnapshot (host and service state, comments)
//!   └── ExternalCommandWriter ─▶ nagios.cmd
//! ```

pub mod cache;
pub mod commands;
pub mod error;
pub mod objects;
pub mod parser;
pub mod reader;
pub mod status;

pub use cache::ObjectCache;
pub use commands::{COMMENT_AUTHOR, ExternalCommand, ExternalCommandWriter, ServiceState};
pub use error::{StatusError, StatusResult};
pub use objects::ObjectConfiguration;
pub use parser::{OBJECT_CACHE_SEPARATOR, Record, STATUS_SEPARATOR, Sections, parse_data, parse_data_file};
pub use reader::NagiosStateReader;
pub use status::{HostStatus, StatusSnapshot};
