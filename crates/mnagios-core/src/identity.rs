//! Identity grammar shared by the orchestration inventory and Nagios.
//!
//! Nagios only knows flat host and hostgroup names, so orchestration
//! identities are encoded as slash/colon-delimited strings:
//!
//! ```text
//! tenant:<T>                              hostgroup: every host of tenant T
//! tenant:<T>/deployment:<D>               hostgroup: every host of deployment D
//! tenant:<T>/deployment:<D>/node:<N>      pseudo-host: node N (no address)
//! tenant:<T>/target_type:<X>              hostgroup: tenant-scoped target type
//! target_type:<X>                         hostgroup: every host of target type X
//! tenant:<T>/group_type:<G>               pseudo-host: group checks of G in T
//! group_type:<G>                          hostgroup: every group host of G
//! <instance id>                           real host with an address
//! ```
//!
//! The string form is kept for the files and the daemon's caches; inside
//! the workspace names are parsed into [`HostName`] / [`HostgroupName`]
//! as soon as they are read and only rendered back with `Display`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("identity pattern is valid")
}

static NODE_IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"^tenant:(?P<tenant>[^/]+)/deployment:(?P<deployment>[^/]+)/node:(?P<node>[^/]+)$")
});

static TENANT_DEPLOYMENT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^tenant:(?P<tenant>[^/]+)/deployment:(?P<deployment>[^/]+)$"));

static TENANT_TARGET_TYPE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^tenant:(?P<tenant>[^/]+)/target_type:(?P<target_type>[^/]+)$"));

static TENANT_GROUP_TYPE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^tenant:(?P<tenant>[^/]+)/group_type:(?P<group_type>[^/]+)$"));

static TARGET_TYPE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^target_type:(?P<target_type>[^/]+)$"));

static GROUP_TYPE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^group_type:(?P<group_type>[^/]+)$"));

static TENANT: LazyLock<Regex> = LazyLock::new(|| pattern(r"^tenant:(?P<tenant>[^/]+)$"));

const NODE_MARKER: &str = "node:";

/// A node-type aggregate: `tenant:<T>/deployment:<D>/node:<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub tenant: String,
    pub deployment: String,
    pub node: String,
}

impl NodeIdentity {
    pub fn new(tenant: &str, deployment: &str, node: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            deployment: deployment.to_string(),
            node: node.to_string(),
        }
    }

    /// Parse a pseudo-host name. Returns `None` for anything else
    /// (including real instance ids).
    pub fn parse(name: &str) -> Option<Self> {
        let caps = NODE_IDENTITY.captures(name)?;
        Some(Self::new(&caps["tenant"], &caps["deployment"], &caps["node"]))
    }

    /// The deployment this node belongs to.
    pub fn tenant_deployment(&self) -> TenantDeployment {
        TenantDeployment::new(&self.tenant, &self.deployment)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tenant:{}/deployment:{}/node:{}",
            self.tenant, self.deployment, self.node
        )
    }
}

/// A deployment scope: `tenant:<T>/deployment:<D>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantDeployment {
    pub tenant: String,
    pub deployment: String,
}

impl TenantDeployment {
    pub fn new(tenant: &str, deployment: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            deployment: deployment.to_string(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let caps = TENANT_DEPLOYMENT.captures(name)?;
        Some(Self::new(&caps["tenant"], &caps["deployment"]))
    }
}

impl fmt::Display for TenantDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant:{}/deployment:{}", self.tenant, self.deployment)
    }
}

/// A Nagios host name, classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostName {
    /// Pseudo-host standing for a node (no address).
    Node(NodeIdentity),
    /// Pseudo-host carrying the group checks of a group type in a tenant.
    Group { tenant: String, group_type: String },
    /// Real host, named by the orchestration-assigned instance id.
    Instance(String),
}

impl HostName {
    pub fn parse(name: &str) -> Self {
        if let Some(node) = NodeIdentity::parse(name) {
            return HostName::Node(node);
        }
        if let Some(caps) = TENANT_GROUP_TYPE.captures(name) {
            return HostName::Group {
                tenant: caps["tenant"].to_string(),
                group_type: caps["group_type"].to_string(),
            };
        }
        HostName::Instance(name.to_string())
    }

    /// Whether this names a real, addressable instance.
    pub fn is_instance(&self) -> bool {
        matches!(self, HostName::Instance(_))
    }

    /// Node id this host belongs to.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            HostName::Node(node) => Some(&node.node),
            HostName::Instance(id) => Some(derive_node_id(id)),
            HostName::Group { .. } => None,
        }
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostName::Node(node) => node.fmt(f),
            HostName::Group { tenant, group_type } => {
                write!(f, "tenant:{tenant}/group_type:{group_type}")
            }
            HostName::Instance(id) => f.write_str(id),
        }
    }
}

/// A Nagios hostgroup name, classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostgroupName {
    Tenant(String),
    TenantDeployment(TenantDeployment),
    TenantTargetType { tenant: String, target_type: String },
    TargetType(String),
    GroupType(String),
    /// Hostgroups this system does not own (base configuration etc.).
    Other(String),
}

impl HostgroupName {
    pub fn parse(name: &str) -> Self {
        if let Some(td) = TenantDeployment::parse(name) {
            HostgroupName::TenantDeployment(td)
        } else if let Some(caps) = TENANT_TARGET_TYPE.captures(name) {
            HostgroupName::TenantTargetType {
                tenant: caps["tenant"].to_string(),
                target_type: caps["target_type"].to_string(),
            }
        } else if let Some(caps) = TENANT.captures(name) {
            HostgroupName::Tenant(caps["tenant"].to_string())
        } else if let Some(caps) = TARGET_TYPE.captures(name) {
            HostgroupName::TargetType(caps["target_type"].to_string())
        } else if let Some(caps) = GROUP_TYPE.captures(name) {
            HostgroupName::GroupType(caps["group_type"].to_string())
        } else {
            HostgroupName::Other(name.to_string())
        }
    }

    pub fn tenant(tenant: &str) -> Self {
        HostgroupName::Tenant(tenant.to_string())
    }

    pub fn tenant_deployment(tenant: &str, deployment: &str) -> Self {
        HostgroupName::TenantDeployment(TenantDeployment::new(tenant, deployment))
    }

    pub fn tenant_target_type(tenant: &str, target_type: &str) -> Self {
        HostgroupName::TenantTargetType {
            tenant: tenant.to_string(),
            target_type: target_type.to_string(),
        }
    }

    pub fn target_type(target_type: &str) -> Self {
        HostgroupName::TargetType(target_type.to_string())
    }
}

impl fmt::Display for HostgroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostgroupName::Tenant(tenant) => write!(f, "tenant:{tenant}"),
            HostgroupName::TenantDeployment(td) => td.fmt(f),
            HostgroupName::TenantTargetType {
                tenant,
                target_type,
            } => write!(f, "tenant:{tenant}/target_type:{target_type}"),
            HostgroupName::TargetType(target_type) => write!(f, "target_type:{target_type}"),
            HostgroupName::GroupType(group_type) => write!(f, "group_type:{group_type}"),
            HostgroupName::Other(name) => f.write_str(name),
        }
    }
}

/// Derive the node id from an instance id.
///
/// Ids carrying a `node:` segment already denote a node and yield the
/// text after the marker. Otherwise the trailing `_<suffix>` is stripped;
/// an id with no `_` is its own node id.
pub fn derive_node_id(instance_id: &str) -> &str {
    if let Some((_, node)) = instance_id.split_once(NODE_MARKER) {
        return node;
    }
    match instance_id.rsplit_once('_') {
        Some((node, _)) => node,
        None => instance_id,
    }
}

/// `tenant:<T>/deployment:<D>` from a hostgroup name.
pub fn parse_tenant_deployment_identity(hostgroup: &str) -> Option<TenantDeployment> {
    TenantDeployment::parse(hostgroup)
}

/// `<X>` from a `target_type:<X>` hostgroup name.
pub fn parse_target_type_identity(hostgroup: &str) -> Option<String> {
    TARGET_TYPE
        .captures(hostgroup)
        .map(|caps| caps["target_type"].to_string())
}

/// `(<T>, <X>)` from a `tenant:<T>/target_type:<X>` hostgroup name.
pub fn parse_tenant_target_type_identity(hostgroup: &str) -> Option<(String, String)> {
    TENANT_TARGET_TYPE.captures(hostgroup).map(|caps| {
        (
            caps["tenant"].to_string(),
            caps["target_type"].to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn node_identity_parses_three_segments() {
        let node = NodeIdentity::parse("tenant:acme/deployment:web/node:app").unwrap();
        assert_eq!(node, NodeIdentity::new("acme", "web", "app"));
    }

    #[test]
    fn instance_id_is_not_a_node_identity() {
        assert_eq!(NodeIdentity::parse("inst-1_foo"), None);
        assert_eq!(NodeIdentity::parse("tenant:acme/deployment:web"), None);
        assert_eq!(NodeIdentity::parse("tenant:a/deployment:b/node:c/extra"), None);
    }

    #[test]
    fn derive_node_id_strips_last_suffix() {
        assert_eq!(derive_node_id("inst_1"), "inst");
        assert_eq!(derive_node_id("web_server_a1b2c3"), "web_server");
    }

    #[test]
    fn derive_node_id_without_underscore_is_identity() {
        assert_eq!(derive_node_id("inst-1"), "inst-1");
    }

    #[test]
    fn derive_node_id_from_node_identity() {
        assert_eq!(derive_node_id("tenant:acme/deployment:web/node:app_x"), "app_x");
    }

    #[test]
    fn host_name_classification() {
        assert!(matches!(
            HostName::parse("tenant:a/deployment:b/node:c"),
            HostName::Node(_)
        ));
        assert_eq!(
            HostName::parse("tenant:a/group_type:cpu"),
            HostName::Group {
                tenant: "a".to_string(),
                group_type: "cpu".to_string()
            }
        );
        let inst = HostName::parse("vm_abc123");
        assert!(inst.is_instance());
        assert_eq!(inst.node_id(), Some("vm"));
    }

    #[test]
    fn hostgroup_classification() {
        assert_eq!(HostgroupName::parse("tenant:a"), HostgroupName::tenant("a"));
        assert_eq!(
            HostgroupName::parse("tenant:a/deployment:d"),
            HostgroupName::tenant_deployment("a", "d")
        );
        assert_eq!(
            HostgroupName::parse("tenant:a/target_type:vm"),
            HostgroupName::tenant_target_type("a", "vm")
        );
        assert_eq!(
            HostgroupName::parse("target_type:vm"),
            HostgroupName::target_type("vm")
        );
        assert_eq!(
            HostgroupName::parse("group_type:cpu"),
            HostgroupName::GroupType("cpu".to_string())
        );
        assert_eq!(
            HostgroupName::parse("linux-servers"),
            HostgroupName::Other("linux-servers".to_string())
        );
    }

    #[test]
    fn anchored_hostgroup_parsers() {
        assert_eq!(
            parse_tenant_deployment_identity("tenant:t/deployment:d"),
            Some(TenantDeployment::new("t", "d"))
        );
        assert_eq!(parse_tenant_deployment_identity("tenant:t/deployment:d/node:n"), None);
        assert_eq!(parse_target_type_identity("target_type:vm"), Some("vm".to_string()));
        assert_eq!(parse_target_type_identity("tenant:t/target_type:vm"), None);
        assert_eq!(
            parse_tenant_target_type_identity("tenant:t/target_type:vm"),
            Some(("t".to_string(), "vm".to_string()))
        );
    }

    proptest! {
        #[test]
        fn node_identity_round_trips(
            tenant in "[A-Za-z0-9_.:-]{1,16}",
            deployment in "[A-Za-z0-9_.:-]{1,16}",
            node in "[A-Za-z0-9_.:-]{1,16}",
        ) {
            let identity = NodeIdentity::new(&tenant, &deployment, &node);
            let rendered = identity.to_string();
            prop_assert_eq!(NodeIdentity::parse(&rendered), Some(identity.clone()));
            prop_assert_eq!(HostName::parse(&rendered), HostName::Node(identity));
        }

        #[test]
        fn tenant_deployment_round_trips(
            tenant in "[A-Za-z0-9_.-]{1,16}",
            deployment in "[A-Za-z0-9_.-]{1,16}",
        ) {
            let hostgroup = HostgroupName::tenant_deployment(&tenant, &deployment);
            prop_assert_eq!(HostgroupName::parse(&hostgroup.to_string()), hostgroup);
        }
    }
}
