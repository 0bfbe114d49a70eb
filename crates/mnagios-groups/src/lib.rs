//! mnagios-groups — aggregate checks across sets of nodes.
//!
//! - [`group_type`]: which checks a group aggregates, the aggregation
//!   approach and thresholds, and the reactions to crossing them.
//! - [`group`]: group instances per tenant, meta-groups over instances
//!   sharing a name prefix, and node membership markers.
//!
//! The aggregate check plugins run outside this crate; they read the
//! descriptors, reaction targets and membership markers written here.

pub mod error;
pub mod group;
pub mod group_type;

pub use error::{GroupError, GroupResult};
pub use group::GroupManager;
pub use group_type::{GroupTypeManager, check_group_name, list_group_types, load_group_type};
