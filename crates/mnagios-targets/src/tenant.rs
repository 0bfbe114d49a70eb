use mnagios_core::HostgroupName;
use mnagios_store::{BuiltinTemplate, ConfigStore, DeployOptions, Privilege, TemplateParams};
use tracing::debug;

use crate::error::TargetResult;

/// Create the `tenant:<T>` hostgroup unless it is already in place.
pub fn ensure_tenant_hostgroup(store: &ConfigStore, tenant: &str, privilege: Privilege) -> TargetResult<()> {
    let destination = store.layout().tenant_hostgroup(tenant)?;
    let params = TemplateParams::new()
        .with("name", HostgroupName::tenant(tenant))
        .with("description", format!("Monitored components for tenant {tenant}"));
    let changed = store.ensure(
        &destination,
        &BuiltinTemplate::Hostgroup.into(),
        &params,
        DeployOptions::new(privilege).without_reload(),
    )?;
    debug!(%tenant, changed, "tenant hostgroup ensured");
    Ok(())
}
