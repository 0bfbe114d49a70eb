//! SNMP trap configuration read by the trap handler.

use mnagios_core::TrapConfiguration;
use mnagios_store::{ConfigStore, Privilege};
use tracing::info;

use crate::error::{TargetError, TargetResult};

/// Write `snmp_traps/<oid>.json`. The OID is used verbatim.
pub fn create_trap_configuration(
    store: &ConfigStore,
    oid: &str,
    configuration: &TrapConfiguration,
    privilege: Privilege,
) -> TargetResult<()> {
    let path = store.layout().trap_configuration(oid)?;
    let text = serde_json::to_string(configuration).map_err(|source| TargetError::Encode {
        what: "trap configuration",
        source,
    })?;
    store.deploy_data(&path, &text, privilege)?;
    info!(%oid, "trap configuration written");
    Ok(())
}

/// Remove the configuration for `oid`; absent configurations are fine.
pub fn delete_trap_configuration(store: &ConfigStore, oid: &str, privilege: Privilege) -> TargetResult<()> {
    let path = store.layout().trap_configuration(oid)?;
    store.remove_tree(&path, privilege)?;
    info!(%oid, "trap configuration removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnagios_core::TrapInstanceLookup;
    use mnagios_store::LocalRunner;
    use std::sync::Arc;

    #[test]
    fn writes_and_removes_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::local(dir.path(), Arc::new(LocalRunner::new()));
        let configuration = TrapConfiguration {
            instance: Some(TrapInstanceLookup {
                oid: "1.3.6.1.2.1.1.5.0".to_string(),
                finder: "hostname".to_string(),
            }),
            oid_for_message: None,
        };

        create_trap_configuration(&store, "1.3.6.1.6.3.1.1.5.3", &configuration, Privilege::Elevated).unwrap();
        let path = store.layout().trap_configuration("1.3.6.1.6.3.1.1.5.3").unwrap();
        let written: serde_json::Value = serde_json::from_str(&store.read(&path).unwrap().unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"instance": {"oid": "1.3.6.1.2.1.1.5.0", "finder": "hostname"}})
        );

        delete_trap_configuration(&store, "1.3.6.1.6.3.1.1.5.3", Privilege::Elevated).unwrap();
        assert!(!store.exists(&path));
        delete_trap_configuration(&store, "1.3.6.1.6.3.1.1.5.3", Privilege::Elevated).unwrap();
    }

    #[test]
    fn oid_must_be_a_path_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::local(dir.path(), Arc::new(LocalRunner::new()));
        let err = create_trap_configuration(&store, "../x", &TrapConfiguration::default(), Privilege::Elevated)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidRequest);
    }
}
