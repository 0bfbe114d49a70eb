//! mnagios-core — shared types for the managed Nagios workspace.
//!
//! - [`identity`]: the `tenant:<T>/deployment:<D>/node:<N>` naming grammar
//!   shared between the orchestration inventory and Nagios host/hostgroup
//!   names, parsed into tagged forms.
//! - [`workflow`]: validated workflow reactions.
//! - [`types`]: target type, check and group specifications.
//! - [`config`]: daemon and manager connection configuration.

pub mod config;
pub mod identity;
pub mod types;
pub mod workflow;

pub use config::{ConfigError, DaemonConfig, ManagerConfig, ManagerConnection};
pub use identity::{
    HostName, HostgroupName, NodeIdentity, TenantDeployment, derive_node_id,
    parse_target_type_identity, parse_tenant_deployment_identity,
    parse_tenant_target_type_identity,
};
pub use types::*;
pub use workflow::{INSTANCE_SUBSTITUTION, WorkflowSpec, WorkflowValidationError};
