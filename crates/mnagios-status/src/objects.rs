//! Queries over the compiled object cache.
//!
//! Hostgroup membership is the reverse index from identity to hosts. It is
//! stored as a comma-joined `members` field; membership tests compare
//! whole tokens, never substrings.

use mnagios_core::{
    HostName, NodeIdentity, TenantDeployment, derive_node_id, parse_target_type_identity,
    parse_tenant_deployment_identity,
};
use tracing::debug;

use crate::error::{StatusError, StatusResult};
use crate::parser::{Record, Sections};

#[derive(Debug, Clone, Default)]
pub struct ObjectConfiguration {
    sections: Sections,
}

impl ObjectConfiguration {
    pub fn new(sections: Sections) -> Self {
        Self { sections }
    }

    pub fn section(&self, name: &str) -> &[Record] {
        self.sections.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn hostgroups(&self) -> &[Record] {
        self.section("hostgroup")
    }

    pub fn hosts(&self) -> &[Record] {
        self.section("host")
    }

    fn hostgroup(&self, name: &str) -> Option<&Record> {
        self.hostgroups()
            .iter()
            .find(|g| g.get("hostgroup_name").map(String::as_str) == Some(name))
    }

    /// Members of hostgroup `name`; empty if the group is unknown.
    pub fn hostgroup_members(&self, name: &str) -> Vec<String> {
        self.hostgroup(name).map(members).unwrap_or_default()
    }

    pub fn has_host(&self, host_name: &str) -> bool {
        self.hosts()
            .iter()
            .any(|h| h.get("host_name").map(String::as_str) == Some(host_name))
    }

    /// Address of a real host. Node pseudo-hosts have none.
    pub fn host_address(&self, host_name: &str) -> Option<&str> {
        if NodeIdentity::parse(host_name).is_some() {
            debug!(%host_name, "nodes have no address");
            return None;
        }
        self.hosts()
            .iter()
            .find(|h| h.get("host_name").map(String::as_str) == Some(host_name))
            .and_then(|h| h.get("address"))
            .map(String::as_str)
    }

    pub fn host_name_for_address(&self, address: &str) -> Option<&str> {
        self.hosts()
            .iter()
            .find(|h| h.get("address").map(String::as_str) == Some(address))
            .and_then(|h| h.get("host_name"))
            .map(String::as_str)
    }

    // ── Identity lookups ───────────────────────────────────────────

    fn find_for_instance<T>(&self, instance_id: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        self.hostgroups().iter().find_map(|group| {
            let parsed = parse(group.get("hostgroup_name")?)?;
            is_member(group, instance_id).then_some(parsed)
        })
    }

    pub fn tenant_and_deployment_for_instance(&self, instance_id: &str) -> StatusResult<TenantDeployment> {
        self.find_for_instance(instance_id, parse_tenant_deployment_identity)
            .ok_or_else(|| StatusError::InstanceNotFound(instance_id.to_string()))
    }

    pub fn target_type_for_instance(&self, instance_id: &str) -> StatusResult<String> {
        self.find_for_instance(instance_id, parse_target_type_identity)
            .ok_or_else(|| StatusError::InstanceNotFound(instance_id.to_string()))
    }

    /// Instances of `node` in the given deployment.
    pub fn node_instances(&self, tenant: &str, deployment: &str, node: &str) -> StatusResult<Vec<String>> {
        let group_name = TenantDeployment::new(tenant, deployment).to_string();
        let group = self
            .hostgroup(&group_name)
            .ok_or(StatusError::DeploymentGroupNotFound(group_name))?;
        // Composite identities (node pseudo-hosts) are not instances.
        Ok(members(group)
            .into_iter()
            .filter(|member| !member.contains('/') && derive_node_id(member) == node)
            .collect())
    }

    /// Instances sharing a node with `target`, which is either a node
    /// identity or an instance id.
    pub fn node_instances_for_target(&self, target: &str) -> StatusResult<Vec<String>> {
        let (node_id, location) = match HostName::parse(target) {
            HostName::Node(identity) => {
                let location = identity.tenant_deployment();
                (identity.node, location)
            }
            _ => (
                derive_node_id(target).to_string(),
                self.tenant_and_deployment_for_instance(target)?,
            ),
        };
        self.node_instances(&location.tenant, &location.deployment, &node_id)
    }
}

fn members(group: &Record) -> Vec<String> {
    group
        .get("members")
        .map(|m| {
            m.split(',')
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_member(group: &Record, host: &str) -> bool {
    group
        .get("members")
        .is_some_and(|m| m.split(',').any(|token| token == host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{OBJECT_CACHE_SEPARATOR, parse_data};

    const CACHE: &str = "\
define hostgroup {
\thostgroup_name\ttenant:t1
\tmembers\tinst-1,inst-2,tenant:t1/deployment:d1/node:inst
}
define hostgroup {
\thostgroup_name\ttenant:t1/deployment:d1
\tmembers\tinst-1,inst-2,other_a,tenant:t1/deployment:d1/node:inst
}
define hostgroup {
\thostgroup_name\ttarget_type:vm
\tmembers\tinst-1,inst-2
}
define hostgroup {
\thostgroup_name\ttenant:t1/deployment:d10
\tmembers\tinst-10
}
define hostgroup {
\thostgroup_name\tempty
}
define host {
\thost_name\tinst-1
\taddress\t10.0.0.5
}
define host {
\thost_name\tinst-2
\taddress\t10.0.0.6
}
define host {
\thost_name\ttenant:t1/deployment:d1/node:inst
\taddress\t
}
";

    fn objects() -> ObjectConfiguration {
        ObjectConfiguration::new(parse_data(CACHE, OBJECT_CACHE_SEPARATOR))
    }

    #[test]
    fn membership_and_addresses() {
        let objects = objects();
        assert_eq!(objects.hostgroup_members("target_type:vm"), vec!["inst-1", "inst-2"]);
        assert!(objects.hostgroup_members("empty").is_empty());
        assert!(objects.hostgroup_members("absent").is_empty());
        assert_eq!(objects.host_address("inst-2"), Some("10.0.0.6"));
        assert_eq!(objects.host_address("tenant:t1/deployment:d1/node:inst"), None);
        assert_eq!(objects.host_name_for_address("10.0.0.5"), Some("inst-1"));
        assert!(objects.has_host("tenant:t1/deployment:d1/node:inst"));
    }

    #[test]
    fn instance_lookup_matches_whole_tokens() {
        let objects = objects();
        // `inst-1` is a substring of `inst-10`; only d1 lists it as a member.
        assert_eq!(
            objects.tenant_and_deployment_for_instance("inst-1").unwrap(),
            TenantDeployment::new("t1", "d1")
        );
        assert_eq!(
            objects.tenant_and_deployment_for_instance("inst-10").unwrap(),
            TenantDeployment::new("t1", "d10")
        );
        assert_eq!(objects.target_type_for_instance("inst-2").unwrap(), "vm");
        assert!(matches!(
            objects.tenant_and_deployment_for_instance("inst"),
            Err(StatusError::InstanceNotFound(_))
        ));
    }

    #[test]
    fn node_instances_by_node_id() {
        let objects = objects();
        assert_eq!(
            objects.node_instances("t1", "d1", "other").unwrap(),
            vec!["other_a"]
        );
        // Only the node pseudo-host derives `inst`, and it is no instance.
        assert!(objects.node_instances("t1", "d1", "inst").unwrap().is_empty());
        assert!(matches!(
            objects.node_instances("t1", "missing", "x"),
            Err(StatusError::DeploymentGroupNotFound(_))
        ));
    }

    #[test]
    fn node_instances_for_node_or_instance() {
        let objects = objects();
        assert_eq!(
            objects
                .node_instances_for_target("tenant:t1/deployment:d1/node:other")
                .unwrap(),
            vec!["other_a"]
        );
        assert_eq!(
            objects.node_instances_for_target("other_a").unwrap(),
            vec!["other_a"]
        );
    }
}
