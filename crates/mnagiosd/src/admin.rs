//! One-shot administration commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use mnagios_core::{DaemonConfig, GroupTypeSpec, TargetTypeSpec};
use mnagios_gateway::ManagerClient;
use mnagios_groups::GroupTypeManager;
use mnagios_reconcile::{ReconcileFilter, Reconciler};
use mnagios_status::ObjectCache;
use mnagios_store::{ConfigStore, ProcessRunner};
use mnagios_targets::TargetTypeManager;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::TypeAction;

fn open_store(config: &DaemonConfig) -> Arc<ConfigStore> {
    Arc::new(ConfigStore::new(config, Arc::new(ProcessRunner)))
}

fn read_spec<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub async fn reconcile(config: &DaemonConfig, filter: &ReconcileFilter) -> anyhow::Result<()> {
    let client = ManagerClient::from_config(&config.manager).context("failed to set up manager client")?;
    let mut reconciler = Reconciler::new(client);
    if filter.skip_monitored {
        reconciler = reconciler.with_monitoring_state(Arc::new(ObjectCache::new(&config.nagios.object_cache)));
    }
    let report = reconciler.reconcile(filter).await;
    println!("{report}");
    Ok(())
}

pub fn target_type(config: &DaemonConfig, action: TypeAction) -> anyhow::Result<()> {
    let manager = TargetTypeManager::new(open_store(config));
    match action {
        TypeAction::Create { spec } => {
            let spec: TargetTypeSpec = read_spec(&spec)?;
            manager.create(&spec)?;
            info!(target_type = %spec.name, "target type created");
        }
        TypeAction::Delete { name } => {
            manager.delete(&name)?;
            info!(target_type = %name, "target type deleted");
        }
        TypeAction::List => {
            for name in manager.list()? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

pub fn group_type(config: &DaemonConfig, action: TypeAction) -> anyhow::Result<()> {
    let manager = GroupTypeManager::new(open_store(config));
    match action {
        TypeAction::Create { spec } => {
            let spec: GroupTypeSpec = read_spec(&spec)?;
            manager.create(&spec)?;
            info!(group_type = %spec.name, "group type created");
        }
        TypeAction::Delete { name } => {
            manager.delete(&name)?;
            info!(group_type = %name, "group type deleted");
        }
        TypeAction::List => {
            for name in manager.list()? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_spec_names_the_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm.json");
        std::fs::write(&path, "{").unwrap();
        let err = read_spec::<TargetTypeSpec>(&path).unwrap_err();
        assert!(err.to_string().contains("vm.json"));

        let missing = read_spec::<TargetTypeSpec>(&dir.path().join("nope.json")).unwrap_err();
        assert!(missing.to_string().contains("failed to read"));
    }
}
