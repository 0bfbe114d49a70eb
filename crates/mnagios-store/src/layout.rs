//! ObjectLayout — where every configuration object lives.
//!
//! All paths are relative to the objects root. Tenant, deployment, node
//! and instance names are used verbatim and must be safe path segments;
//! names that may carry arbitrary characters in the places below are
//! replaced by their md5 hex digest.
//!
//! ```text
//! tenants/<tenant>.cfg
//! deployments/<tenant>/<deployment>.cfg
//! deployments/<tenant>/<deployment>/<node>.cfg
//! targets/<instance>.cfg
//! target_types/<tenant>/<target type>.cfg
//! target_types/<md5 target type>.{cfg,json,ini}
//! templates/<md5 target type>.cfg
//! checks/<md5 target type>/<md5 check>.cfg
//! snmp_traps/<oid>.json
//! groups/types/<md5 group type>.{cfg,json}
//! groups/checks/<group type>.json
//! groups/tenants/<md5 tenant>/<md5 group type>.cfg
//! groups/group_instances/<md5 tenant>/<md5 group type>/<md5 group>.cfg
//! groups/group_instances/<md5 tenant>/<md5 group type>/meta/<md5 prefix>.cfg
//! groups/members/<tenant>/<group type>/<group>/<deployment>/<node>
//! groups/members/<tenant>/<group type>/<group>_target
//! groups/members/<tenant>/<group type>/meta/<prefix>{_target,.json}
//! ```

use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

pub fn md5_hex(name: &str) -> String {
    format!("{:x}", md5::compute(name.as_bytes()))
}

/// Reject names that cannot be used verbatim as one path component.
pub fn check_segment(segment: &str) -> StoreResult<&str> {
    let reason = if segment.is_empty() {
        "empty"
    } else if segment == "." || segment == ".." {
        "relative path component"
    } else if segment.contains('/') {
        "contains '/'"
    } else if segment.contains('\0') {
        "contains NUL"
    } else {
        return Ok(segment);
    };
    Err(StoreError::InvalidPath {
        segment: segment.to_string(),
        reason,
    })
}

#[derive(Debug, Clone)]
pub struct ObjectLayout {
    root: PathBuf,
}

impl ObjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    // ── Targets ────────────────────────────────────────────────────

    pub fn tenant_hostgroup(&self, tenant: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("tenants").join(format!("{}.cfg", check_segment(tenant)?)))
    }

    pub fn deployment_hostgroup(&self, tenant: &str, deployment: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("deployments")
            .join(check_segment(tenant)?)
            .join(format!("{}.cfg", check_segment(deployment)?)))
    }

    pub fn node(&self, tenant: &str, deployment: &str, node: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("deployments")
            .join(check_segment(tenant)?)
            .join(check_segment(deployment)?)
            .join(format!("{}.cfg", check_segment(node)?)))
    }

    pub fn targets_dir(&self) -> PathBuf {
        PathBuf::from("targets")
    }

    pub fn target(&self, instance_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .targets_dir()
            .join(format!("{}.cfg", check_segment(instance_id)?)))
    }

    pub fn tenant_target_type(&self, tenant: &str, target_type: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("target_types")
            .join(check_segment(tenant)?)
            .join(format!("{}.cfg", check_segment(target_type)?)))
    }

    // ── Target types ───────────────────────────────────────────────

    pub fn target_types_dir(&self) -> PathBuf {
        PathBuf::from("target_types")
    }

    pub fn target_type(&self, target_type: &str) -> PathBuf {
        self.target_types_dir()
            .join(format!("{}.cfg", md5_hex(target_type)))
    }

    pub fn target_type_reactions(&self, target_type: &str) -> PathBuf {
        self.target_types_dir()
            .join(format!("{}.json", md5_hex(target_type)))
    }

    pub fn target_type_connection(&self, target_type: &str) -> PathBuf {
        self.target_types_dir()
            .join(format!("{}.ini", md5_hex(target_type)))
    }

    pub fn target_type_host_template(&self, target_type: &str) -> PathBuf {
        PathBuf::from("templates").join(format!("{}.cfg", md5_hex(target_type)))
    }

    pub fn checks_dir(&self, target_type: &str) -> PathBuf {
        PathBuf::from("checks").join(md5_hex(target_type))
    }

    pub fn check(&self, target_type: &str, check_name: &str) -> PathBuf {
        self.checks_dir(target_type)
            .join(format!("{}.cfg", md5_hex(check_name)))
    }

    pub fn trap_configuration(&self, oid: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("snmp_traps").join(format!("{}.json", check_segment(oid)?)))
    }

    // ── Groups ─────────────────────────────────────────────────────

    pub fn group_types_dir(&self) -> PathBuf {
        PathBuf::from("groups/types")
    }

    pub fn group_type_descriptor(&self, group_type: &str) -> PathBuf {
        self.group_types_dir()
            .join(format!("{}.json", md5_hex(group_type)))
    }

    pub fn group_type_hostgroup(&self, group_type: &str) -> PathBuf {
        self.group_types_dir()
            .join(format!("{}.cfg", md5_hex(group_type)))
    }

    pub fn group_check_list(&self, group_type: &str) -> StoreResult<PathBuf> {
        Ok(PathBuf::from("groups/checks").join(format!("{}.json", check_segment(group_type)?)))
    }

    pub fn group_tenants_dir(&self) -> PathBuf {
        PathBuf::from("groups/tenants")
    }

    pub fn group_host(&self, group_type: &str, tenant: &str) -> PathBuf {
        self.group_tenants_dir()
            .join(md5_hex(tenant))
            .join(format!("{}.cfg", md5_hex(group_type)))
    }

    pub fn group_instances_root(&self) -> PathBuf {
        PathBuf::from("groups/group_instances")
    }

    pub fn group_instances_dir(&self, group_type: &str, tenant: &str) -> PathBuf {
        self.group_instances_root()
            .join(md5_hex(tenant))
            .join(md5_hex(group_type))
    }

    pub fn group_instance(&self, group_type: &str, group_name: &str, tenant: &str) -> PathBuf {
        self.group_instances_dir(group_type, tenant)
            .join(format!("{}.cfg", md5_hex(group_name)))
    }

    pub fn meta_group(&self, group_type: &str, prefix: &str, tenant: &str) -> PathBuf {
        self.group_instances_dir(group_type, tenant)
            .join("meta")
            .join(format!("{}.cfg", md5_hex(prefix)))
    }

    pub fn group_members_root(&self) -> PathBuf {
        PathBuf::from("groups/members")
    }

    pub fn group_type_members(&self, tenant: &str, group_type: &str) -> StoreResult<PathBuf> {
        Ok(self
            .group_members_root()
            .join(check_segment(tenant)?)
            .join(check_segment(group_type)?))
    }

    pub fn group_members(&self, tenant: &str, group_type: &str, group_name: &str) -> StoreResult<PathBuf> {
        Ok(self
            .group_type_members(tenant, group_type)?
            .join(check_segment(group_name)?))
    }

    pub fn group_member_node(
        &self,
        tenant: &str,
        deployment: &str,
        group_type: &str,
        group_name: &str,
        node: &str,
    ) -> StoreResult<PathBuf> {
        Ok(self
            .group_members(tenant, group_type, group_name)?
            .join(check_segment(deployment)?)
            .join(check_segment(node)?))
    }

    pub fn group_reaction_target(&self, tenant: &str, group_type: &str, group_name: &str) -> StoreResult<PathBuf> {
        Ok(self
            .group_type_members(tenant, group_type)?
            .join(format!("{}_target", check_segment(group_name)?)))
    }

    pub fn meta_group_reaction_target(&self, tenant: &str, group_type: &str, prefix: &str) -> StoreResult<PathBuf> {
        Ok(self
            .group_type_members(tenant, group_type)?
            .join("meta")
            .join(format!("{}_target", check_segment(prefix)?)))
    }

    pub fn meta_group_reactions(&self, tenant: &str, group_type: &str, prefix: &str) -> StoreResult<PathBuf> {
        Ok(self
            .group_type_members(tenant, group_type)?
            .join("meta")
            .join(format!("{}.json", check_segment(prefix)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ObjectLayout {
        ObjectLayout::new("/etc/nagios/objects")
    }

    #[test]
    fn target_paths_use_plain_names() {
        let layout = layout();
        assert_eq!(layout.tenant_hostgroup("t1").unwrap(), PathBuf::from("tenants/t1.cfg"));
        assert_eq!(
            layout.node("t1", "d1", "inst").unwrap(),
            PathBuf::from("deployments/t1/d1/inst.cfg")
        );
        assert_eq!(layout.target("inst-1").unwrap(), PathBuf::from("targets/inst-1.cfg"));
        assert_eq!(
            layout.absolute(&layout.target("inst-1").unwrap()),
            PathBuf::from("/etc/nagios/objects/targets/inst-1.cfg")
        );
    }

    #[test]
    fn hashed_paths_use_md5_hex() {
        let layout = layout();
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            layout.target_type("abc"),
            PathBuf::from("target_types/900150983cd24fb0d6963f7d28e17f72.cfg")
        );
        assert_eq!(
            layout.check("abc", "abc"),
            PathBuf::from(
                "checks/900150983cd24fb0d6963f7d28e17f72/900150983cd24fb0d6963f7d28e17f72.cfg"
            )
        );
    }

    #[test]
    fn unsafe_segments_are_rejected() {
        let layout = layout();
        for bad in ["", ".", "..", "a/b", "nul\0"] {
            assert!(
                matches!(layout.target(bad), Err(StoreError::InvalidPath { .. })),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn distinct_entities_never_share_a_path() {
        let layout = layout();
        let paths = [
            layout.tenant_hostgroup("a").unwrap(),
            layout.deployment_hostgroup("a", "b").unwrap(),
            layout.node("a", "b", "c").unwrap(),
            layout.target("a").unwrap(),
            layout.tenant_target_type("a", "b").unwrap(),
            layout.target_type("a"),
            layout.target_type_host_template("a"),
            layout.group_type_hostgroup("a"),
            layout.group_host("a", "a"),
            layout.group_instance("a", "a", "a"),
            layout.meta_group("a", "a", "a"),
        ];
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }
}
