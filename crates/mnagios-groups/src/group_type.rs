//! Group types: which checks a group aggregates and how.
//!
//! A group type is a descriptor (`groups/types/<md5>.json`) read when
//! instances are created, the plain check list the aggregate plugin reads,
//! and the `group_type:<name>` hostgroup every group host joins.

use std::sync::Arc;

use mnagios_core::{
    GroupTypeDescriptor, GroupTypeSpec, HostgroupName, INSTANCE_SUBSTITUTION,
};
use mnagios_store::{
    BuiltinTemplate, ConfigStore, DeployOptions, Privilege, RemoveOptions, TemplateParams, md5_hex,
};
use tracing::{debug, info};

use crate::error::{GroupError, GroupResult};

/// Group types are managed by orchestration operations, which run elevated.
const PRIVILEGE: Privilege = Privilege::Elevated;

/// Group names end up inside `tenant:<T>/group_type:<G>` host names.
pub fn check_group_name(name: &str) -> GroupResult<()> {
    if name.is_empty() || name.contains(':') || name.contains('/') {
        return Err(GroupError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Names of every deployed group type, sorted.
pub fn list_group_types(store: &ConfigStore) -> GroupResult<Vec<String>> {
    let dir = store.layout().group_types_dir();
    let mut found = Vec::new();
    for file in store.list_files(&dir, Some("cfg"))? {
        let Some(text) = store.read(&dir.join(&file))? else {
            continue;
        };
        let name = text.lines().find_map(|line| {
            let value = line.trim().strip_prefix("hostgroup_name")?;
            match HostgroupName::parse(value.trim()) {
                HostgroupName::GroupType(group_type) => Some(group_type),
                _ => None,
            }
        });
        if let Some(name) = name {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}

/// The descriptor for `group_type`, or `UnknownGroupType`.
pub fn load_group_type(store: &ConfigStore, group_type: &str) -> GroupResult<GroupTypeDescriptor> {
    let path = store.layout().group_type_descriptor(group_type);
    let Some(text) = store.read(&path)? else {
        return Err(GroupError::UnknownGroupType {
            group_type: group_type.to_string(),
            available: list_group_types(store)?,
        });
    };
    serde_json::from_str(&text).map_err(|source| GroupError::Decode { path, source })
}

pub struct GroupTypeManager {
    store: Arc<ConfigStore>,
}

impl GroupTypeManager {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> GroupResult<Vec<String>> {
        list_group_types(&self.store)
    }

    pub fn create(&self, spec: &GroupTypeSpec) -> GroupResult<()> {
        check_group_name(&spec.name)?;
        if spec.checks.is_empty() {
            return Err(GroupError::NoChecks(spec.name.clone()));
        }
        // Group reactions target the whole group, never one instance.
        let reactions = spec.reactions.clone().validated(&[INSTANCE_SUBSTITUTION])?;
        let descriptor = GroupTypeDescriptor {
            services: spec.checks.clone(),
            reactions,
            check_configuration: spec.check_configuration.clone(),
        };
        let descriptor = serde_json::to_string(&descriptor).map_err(|source| GroupError::Encode {
            what: "group type descriptor",
            source,
        })?;
        let check_list = serde_json::to_string(&spec.checks).map_err(|source| GroupError::Encode {
            what: "group check list",
            source,
        })?;

        let layout = self.store.layout();
        let name = &spec.name;
        info!(group_type = %name, checks = spec.checks.len(), "creating group type");
        for dir in [
            layout.group_tenants_dir(),
            layout.group_types_dir(),
            layout.group_members_root(),
        ] {
            self.store.make_subdirectory(&dir, PRIVILEGE)?;
        }
        self.store
            .deploy_data(&layout.group_type_descriptor(name), &descriptor, PRIVILEGE)?;
        self.store
            .deploy_data(&layout.group_check_list(name)?, &check_list, PRIVILEGE)?;
        self.store.deploy(
            &layout.group_type_hostgroup(name),
            &BuiltinTemplate::GroupType.into(),
            &TemplateParams::new().with("group_type", name),
            DeployOptions::new(PRIVILEGE),
        )?;
        Ok(())
    }

    /// Remove a group type with every instance, meta-group and member
    /// listing of it, across all tenants.
    pub fn delete(&self, name: &str) -> GroupResult<()> {
        check_group_name(name)?;
        let layout = self.store.layout();
        let hashed = md5_hex(name);
        info!(group_type = %name, "deleting group type");

        for tenant in self.store.list_dirs(&layout.group_members_root())? {
            debug!(%tenant, "removing group members");
            self.store
                .remove_tree(&layout.group_type_members(&tenant, name)?, PRIVILEGE)?;
        }

        // Checks first; they live on the group hosts removed next.
        let instances = layout.group_instances_root();
        for tenant in self.store.list_dirs(&instances)? {
            self.store
                .remove_tree(&instances.join(&tenant).join(&hashed), PRIVILEGE)?;
        }
        let remove = RemoveOptions::new(PRIVILEGE).without_reload().ignoring_missing();
        let hosts = layout.group_tenants_dir();
        for tenant in self.store.list_dirs(&hosts)? {
            self.store
                .remove(&hosts.join(&tenant).join(format!("{hashed}.cfg")), remove)?;
        }

        self.store.remove(&layout.group_type_hostgroup(name), remove)?;
        self.store
            .remove_tree(&layout.group_type_descriptor(name), PRIVILEGE)?;
        self.store
            .remove_tree(&layout.group_check_list(name)?, PRIVILEGE)?;
        self.store.trigger_reload(PRIVILEGE)?;
        Ok(())
    }
}
