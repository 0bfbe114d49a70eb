//! Targets: monitored instances and the objects they hang off.
//!
//! ```text
//! tenants/<T>.cfg                    tenant:<T>
//! deployments/<T>/<D>.cfg            tenant:<T>/deployment:<D>
//! target_types/<T>/<X>.cfg           tenant:<T>/target_type:<X>
//! deployments/<T>/<D>/<node>.cfg     node pseudo-host, shared by siblings
//! targets/<instance>.cfg             the instance itself
//! ```
//!
//! Supporting objects are create-or-skip so sibling instances converge on
//! the same files. On delete, the supporting objects are removed once no
//! remaining host config references them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnagios_core::{HostgroupName, derive_node_id};
use mnagios_status::ObjectCache;
use mnagios_store::{
    BuiltinTemplate, ConfigStore, DeployOptions, Privilege, Removal, RemoveOptions, TemplateParams,
    check_segment, md5_hex,
};
use tracing::{debug, info, warn};

use crate::error::{TargetError, TargetResult};
use crate::object_file;
use crate::target_type::list_target_types;
use crate::tenant::ensure_tenant_hostgroup;

/// What a delete took with it besides the target itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedTarget {
    pub node_removed: bool,
    pub hostgroups_removed: Vec<String>,
}

pub struct TargetManager {
    store: Arc<ConfigStore>,
    objects: Arc<ObjectCache>,
    rate_data_dir: PathBuf,
    privilege: Privilege,
}

impl TargetManager {
    pub fn new(
        store: Arc<ConfigStore>,
        objects: Arc<ObjectCache>,
        rate_data_dir: impl Into<PathBuf>,
        privilege: Privilege,
    ) -> Self {
        Self {
            store,
            objects,
            rate_data_dir: rate_data_dir.into(),
            privilege,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn objects(&self) -> &Arc<ObjectCache> {
        &self.objects
    }

    // ── Create ─────────────────────────────────────────────────────

    pub fn create_target(
        &self,
        instance_id: &str,
        instance_ip: &str,
        tenant: &str,
        deployment: &str,
        target_type: &str,
    ) -> TargetResult<()> {
        let layout = self.store.layout();
        let node_id = derive_node_id(instance_id);
        let target_path = layout.target(instance_id)?;
        let deployment_path = layout.deployment_hostgroup(tenant, deployment)?;
        let tenant_type_path = layout.tenant_target_type(tenant, target_type)?;
        let node_path = layout.node(tenant, deployment, node_id)?;

        let available = list_target_types(&self.store)?;
        if !available.iter().any(|t| t == target_type) {
            return Err(TargetError::InvalidTargetType {
                target_type: target_type.to_string(),
                available,
            });
        }

        info!(%instance_id, %tenant, %deployment, %target_type, "creating target");
        let supporting = DeployOptions::new(self.privilege).without_reload();
        ensure_tenant_hostgroup(&self.store, tenant, self.privilege)?;
        self.store.ensure(
            &deployment_path,
            &BuiltinTemplate::Hostgroup.into(),
            &TemplateParams::new()
                .with("name", HostgroupName::tenant_deployment(tenant, deployment))
                .with(
                    "description",
                    format!("Monitored hosts in deployment {deployment} for tenant {tenant}"),
                ),
            supporting,
        )?;
        self.store.ensure(
            &tenant_type_path,
            &BuiltinTemplate::Hostgroup.into(),
            &TemplateParams::new()
                .with("name", HostgroupName::tenant_target_type(tenant, target_type))
                .with(
                    "description",
                    format!("Monitored hosts of type {target_type} for tenant {tenant}"),
                ),
            supporting,
        )?;
        let node_created = self.store.ensure(
            &node_path,
            &BuiltinTemplate::Node.into(),
            &TemplateParams::new()
                .with("node_id", node_id)
                .with("deployment", deployment)
                .with("tenant", tenant)
                .with("target_type", target_type),
            supporting,
        )?;
        debug!(%node_id, node_created, "node pseudo-host ensured");

        self.store.deploy(
            &target_path,
            &BuiltinTemplate::Target.into(),
            &TemplateParams::new()
                .with("instance_id", instance_id)
                .with("instance_ip", instance_ip)
                .with("deployment", deployment)
                .with("tenant", tenant)
                .with("target_type", target_type),
            DeployOptions::new(self.privilege),
        )?;
        self.objects.invalidate();
        info!(%instance_id, "target created");
        Ok(())
    }

    // ── Delete ─────────────────────────────────────────────────────

    pub fn delete_target(&self, instance_id: &str, tenant: &str, deployment: &str) -> TargetResult<DeletedTarget> {
        let layout = self.store.layout();
        let target_path = layout.target(instance_id)?;
        let node_id = derive_node_id(instance_id);
        let node_path = layout.node(tenant, deployment, node_id)?;
        let deployment_group = HostgroupName::tenant_deployment(tenant, deployment).to_string();

        // Read before removal; the config is the only place that still
        // knows the address and type once it is gone.
        let config = self.store.read(&target_path)?;
        let address = config
            .as_deref()
            .and_then(|text| object_file::field(text, "address"))
            .map(str::to_string)
            .or_else(|| self.cached_address(instance_id));
        let joined: Vec<String> = config
            .as_deref()
            .map(|text| object_file::hostgroups(text).into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        info!(%instance_id, %tenant, %deployment, "deleting target");
        let removed = self.store.remove(
            &target_path,
            RemoveOptions::new(self.privilege).without_reload(),
        );
        match removed {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(%instance_id, "could not remove target, as it did not exist");
                return Err(TargetError::TargetNotFound(instance_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(address) = address.as_deref().filter(|a| check_segment(a).is_ok()) {
            self.remove_rate_data(&Path::new("instances").join(address))?;
        }

        let mut deleted = DeletedTarget::default();
        if !self.node_has_instances(node_id, &deployment_group)? {
            info!(%node_id, %tenant, %deployment, "no instances remaining, removing node");
            let removal = self.store.remove(
                &node_path,
                RemoveOptions::new(self.privilege)
                    .without_reload()
                    .ignoring_missing(),
            )?;
            deleted.node_removed = removal == Removal::Removed;
            self.remove_rate_data(&Path::new("nodes").join(node_id.replace('/', "_")))?;
        }

        deleted.hostgroups_removed = self.remove_unreferenced_hostgroups(tenant, deployment, &joined)?;

        self.store.trigger_reload(self.privilege)?;
        self.objects.invalidate();
        info!(%instance_id, node_removed = deleted.node_removed, hostgroups = ?deleted.hostgroups_removed, "target deleted");
        Ok(deleted)
    }

    fn cached_address(&self, instance_id: &str) -> Option<String> {
        match self.objects.load(false) {
            Ok(objects) => objects.host_address(instance_id).map(str::to_string),
            Err(e) => {
                debug!(error = %e, "object cache unavailable for address lookup");
                None
            }
        }
    }

    fn remove_rate_data(&self, relative: &Path) -> TargetResult<()> {
        let path = self.rate_data_dir.join(relative);
        debug!(path = %path.display(), "removing any rate data");
        // Absolute paths pass through the store's root untouched.
        self.store.remove_tree(&path, self.privilege)?;
        Ok(())
    }

    /// Whether another target of `node_id` remains in the deployment.
    /// Configs that vanish mid-scan belong to concurrent deletes.
    fn node_has_instances(&self, node_id: &str, deployment_group: &str) -> TargetResult<bool> {
        let targets = self.store.layout().targets_dir();
        for file in self.store.list_files(&targets, Some("cfg"))? {
            let Some(instance) = file.strip_suffix(".cfg") else {
                continue;
            };
            if derive_node_id(instance) != node_id {
                continue;
            }
            match self.store.read(&targets.join(&file)) {
                Ok(Some(text)) if object_file::hostgroups(&text).contains(&deployment_group) => {
                    debug!(%instance, "instances still exist for node");
                    return Ok(true);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%file, error = %e, "treating unreadable target as deleted by a concurrent workflow");
                }
            }
        }
        Ok(false)
    }

    /// Every hostgroup some remaining host definition joins.
    fn referenced_hostgroups(&self, tenant: &str) -> TargetResult<BTreeSet<String>> {
        let layout = self.store.layout();
        let mut dirs = vec![layout.targets_dir()];
        let tenant_deployments = PathBuf::from("deployments").join(check_segment(tenant)?);
        for deployment in self.store.list_dirs(&tenant_deployments)? {
            dirs.push(tenant_deployments.join(deployment));
        }
        dirs.push(layout.group_tenants_dir().join(md5_hex(tenant)));

        let mut referenced = BTreeSet::new();
        for dir in dirs {
            for file in self.store.list_files(&dir, Some("cfg"))? {
                match self.store.read(&dir.join(&file)) {
                    Ok(Some(text)) => {
                        referenced.extend(object_file::hostgroups(&text).into_iter().map(str::to_string));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%file, error = %e, "skipping unreadable host definition"),
                }
            }
        }
        Ok(referenced)
    }

    fn remove_unreferenced_hostgroups(
        &self,
        tenant: &str,
        deployment: &str,
        joined: &[String],
    ) -> TargetResult<Vec<String>> {
        let layout = self.store.layout();
        let referenced = self.referenced_hostgroups(tenant)?;

        let mut candidates = vec![(
            HostgroupName::tenant_deployment(tenant, deployment),
            layout.deployment_hostgroup(tenant, deployment)?,
        )];
        for name in joined {
            if let HostgroupName::TenantTargetType {
                tenant: t,
                target_type,
            } = HostgroupName::parse(name)
            {
                if t == tenant {
                    let path = layout.tenant_target_type(tenant, &target_type)?;
                    candidates.push((HostgroupName::tenant_target_type(tenant, &target_type), path));
                }
            }
        }
        // The tenant group goes last; the others are nested inside it.
        candidates.push((HostgroupName::tenant(tenant), layout.tenant_hostgroup(tenant)?));

        let mut removed = Vec::new();
        for (name, path) in candidates {
            let name = name.to_string();
            if referenced.contains(&name) {
                debug!(hostgroup = %name, "hostgroup still has members");
                continue;
            }
            let removal = self.store.remove(
                &path,
                RemoveOptions::new(self.privilege)
                    .without_reload()
                    .ignoring_missing(),
            )?;
            if removal == Removal::Removed {
                info!(hostgroup = %name, "removed empty hostgroup");
                removed.push(name);
            }
        }
        Ok(removed)
    }
}
