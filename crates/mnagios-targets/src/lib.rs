//! mnagios-targets — monitored instances and the target types they belong to.
//!
//! - [`target`]: create and delete targets, with their node pseudo-hosts and
//!   tenant/deployment hostgroups.
//! - [`target_type`]: health checks, SNMP connection settings and reaction
//!   bundles shared by every target of a type.
//! - [`trap`]: per-OID SNMP trap configuration.
//! - [`tenant`]: the tenant hostgroup every tenant-scoped object joins.
//!
//! ```text
//!   target_type:vm ─┬─ templates/<md5 vm>.cfg      (host template)
//!                   └─ checks/<md5 vm>/*.cfg       (services)
//!
//!   tenant:t1 ── tenant:t1/deployment:d1 ─┬─ node:inst   (pseudo-host)
//!                                         ├─ inst_1      (target)
//!                                         └─ inst_2      (target)
//! ```

pub mod error;
pub mod object_file;
pub mod target;
pub mod target_type;
pub mod tenant;
pub mod trap;

pub use error::{ErrorKind, TargetError, TargetResult};
pub use target::{DeletedTarget, TargetManager};
pub use target_type::{TargetTypeManager, list_target_types};
pub use tenant::ensure_tenant_hostgroup;
pub use trap::{create_trap_configuration, delete_trap_configuration};
