//! Target types: the health checks and reactions shared by a category of
//! targets.
//!
//! A target type owns its hostgroup, a host template every target of the
//! type inherits, one service per check, the SNMP connection settings the
//! check scripts read, and the reaction bundle the event handlers read.
//! All workflows are validated before anything is written.

use std::path::PathBuf;
use std::sync::Arc;

use mnagios_core::{
    CheckSpec, INSTANCE_HEALTH_CHECKS, INSTANCE_SUBSTITUTION, ReactionBundle, ReactionEntry,
    TargetTypeSpec, parse_target_type_identity,
};
use mnagios_store::{
    BuiltinTemplate, ConfigStore, DeployOptions, Privilege, RemoveOptions, TemplateParams,
};
use tracing::{debug, info};

use crate::error::{TargetError, TargetResult};
use crate::object_file;

/// Target types are managed by orchestration operations, which run elevated.
const PRIVILEGE: Privilege = Privilege::Elevated;

const CONNECTION_SECTION: &str = "snmp_params";

/// Names of every deployed target type, sorted.
pub fn list_target_types(store: &ConfigStore) -> TargetResult<Vec<String>> {
    let dir = store.layout().target_types_dir();
    let mut found = Vec::new();
    for file in store.list_files(&dir, Some("cfg"))? {
        let Some(text) = store.read(&dir.join(&file))? else {
            continue;
        };
        if let Some(name) = object_file::field(&text, "hostgroup_name").and_then(parse_target_type_identity) {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}

/// Target type names end up in hostgroup names and comma-joined lists.
fn check_name(name: &str) -> TargetResult<()> {
    if name.is_empty() || name.contains('/') || name.contains(',') {
        return Err(TargetError::InvalidTargetTypeName(name.to_string()));
    }
    Ok(())
}

pub struct TargetTypeManager {
    store: Arc<ConfigStore>,
}

impl TargetTypeManager {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> TargetResult<Vec<String>> {
        list_target_types(&self.store)
    }

    pub fn create(&self, spec: &TargetTypeSpec) -> TargetResult<()> {
        check_name(&spec.name)?;
        if !INSTANCE_HEALTH_CHECKS.contains(&spec.instance_health_check.as_str()) {
            return Err(TargetError::InvalidHealthCheck {
                command: spec.instance_health_check.clone(),
            });
        }
        let connection = spec
            .snmp
            .connection_params()
            .ok_or(TargetError::NoSnmpConfiguration)?;
        let reactions = build_reactions(spec)?;
        let reactions = serde_json::to_string(&reactions).map_err(|source| TargetError::Encode {
            what: "reaction bundle",
            source,
        })?;

        let layout = self.store.layout();
        let name = &spec.name;
        let options = DeployOptions::new(PRIVILEGE).without_reload();

        info!(target_type = %name, "creating target type");
        self.store.deploy_data(
            &layout.target_type_connection(name),
            &render_connection(&connection),
            PRIVILEGE,
        )?;

        self.store.deploy(
            &layout.target_type(name),
            &BuiltinTemplate::TargetType.into(),
            &TemplateParams::new()
                .with("name", name)
                .with("description", &spec.description),
            options,
        )?;

        self.store.deploy(
            &layout.target_type_host_template(name),
            &BuiltinTemplate::TargetTypeHost.into(),
            &TemplateParams::new()
                .with("target_type", name)
                .with("check_command", &spec.instance_health_check)
                .with("check_interval", spec.schedule.check_interval)
                .with("retry_interval", spec.schedule.retry_interval)
                .with("max_check_retries", spec.schedule.max_check_retries),
            options,
        )?;

        for check in &spec.checks {
            let (template, params) = check_params(name, check);
            debug!(target_type = %name, check = check.name(), template = template.name(), "deploying check");
            self.store.deploy(&layout.check(name, check.name()), &template.into(), &params, options)?;
        }

        self.store
            .deploy_data(&layout.target_type_reactions(name), &reactions, PRIVILEGE)?;
        self.store.trigger_reload(PRIVILEGE)?;
        info!(target_type = %name, checks = spec.checks.len(), "target type created");
        Ok(())
    }

    /// Remove a target type together with every host of that type.
    pub fn delete(&self, name: &str) -> TargetResult<()> {
        let layout = self.store.layout();
        let remove = RemoveOptions::new(PRIVILEGE).without_reload().ignoring_missing();
        let member_group = format!("target_type:{name}");

        info!(target_type = %name, "deleting target type");
        self.store.remove_tree(&layout.checks_dir(name), PRIVILEGE)?;

        for path in self.hosts_in_group(&member_group)? {
            debug!(path = %path.display(), "removing host of deleted target type");
            self.store.remove(&path, remove)?;
        }

        let target_types = layout.target_types_dir();
        for path in self.store.find_files(&target_types, &format!("{name}.cfg")) {
            if path.parent() != Some(target_types.as_path()) {
                self.store.remove(&path, remove)?;
            }
        }

        self.store.remove(&layout.target_type_host_template(name), remove)?;
        self.store.remove(&layout.target_type(name), remove)?;
        self.store
            .remove_tree(&layout.target_type_connection(name), PRIVILEGE)?;
        self.store
            .remove_tree(&layout.target_type_reactions(name), PRIVILEGE)?;

        self.store.trigger_reload(PRIVILEGE)?;
        Ok(())
    }

    /// Target and node configs joining `hostgroup`.
    fn hosts_in_group(&self, hostgroup: &str) -> TargetResult<Vec<PathBuf>> {
        let layout = self.store.layout();
        let mut candidates = Vec::new();
        let targets = layout.targets_dir();
        for file in self.store.list_files(&targets, Some("cfg"))? {
            candidates.push(targets.join(file));
        }
        let deployments = PathBuf::from("deployments");
        for tenant in self.store.list_dirs(&deployments)? {
            for deployment in self.store.list_dirs(&deployments.join(&tenant))? {
                let dir = deployments.join(&tenant).join(&deployment);
                for file in self.store.list_files(&dir, Some("cfg"))? {
                    candidates.push(dir.join(file));
                }
            }
        }

        let mut members = Vec::new();
        for path in candidates {
            if let Some(text) = self.store.read(&path)? {
                if object_file::hostgroups(&text).contains(&hostgroup) {
                    members.push(path);
                }
            }
        }
        Ok(members)
    }
}

fn render_connection(params: &[(&str, String)]) -> String {
    let mut text = format!("[{CONNECTION_SECTION}]\n");
    for (key, value) in params {
        text.push_str(&format!("{key} = {value}\n"));
    }
    text.push('\n');
    text
}

fn rate_flag(rate_check: bool) -> &'static str {
    if rate_check { "--rate" } else { "" }
}

fn check_params(target_type: &str, check: &CheckSpec) -> (BuiltinTemplate, TemplateParams) {
    let base = TemplateParams::new().with("target_type", target_type);
    match check {
        CheckSpec::SnmpValue(c) => (
            BuiltinTemplate::SnmpPoll,
            base.with("check_description", &c.check_description)
                .with("snmp_oid", &c.snmp_oid)
                .with("max_check_retries", c.schedule.max_check_retries)
                .with("check_interval", c.schedule.check_interval)
                .with("retry_interval", c.schedule.retry_interval)
                .with("notification_interval", c.schedule.notification_interval())
                .with("rate", rate_flag(c.rate_check))
                .extend(c.thresholds.template_params()),
        ),
        CheckSpec::SnmpAggregate(c) => (
            BuiltinTemplate::SnmpAggregate,
            base.with("check_description", &c.check_description)
                .with("snmp_oids", c.snmp_oids.join(","))
                .with("on_unknown", &c.on_unknown)
                .with("aggregation_type", c.aggregation_type.as_str())
                .with("max_check_retries", c.schedule.max_check_retries)
                .with("check_interval", c.schedule.check_interval)
                .with("retry_interval", c.schedule.retry_interval)
                .with("notification_interval", c.schedule.notification_interval())
                .with("rate", rate_flag(c.rate_check))
                .extend(c.thresholds.template_params()),
        ),
        CheckSpec::TrapReaction(c) => (BuiltinTemplate::Trap, base.with("oid", &c.trap_oid)),
    }
}

/// Validate every workflow and assemble the bundle the event handlers read.
fn build_reactions(spec: &TargetTypeSpec) -> TargetResult<ReactionBundle> {
    let mut bundle = ReactionBundle::default();
    for check in &spec.checks {
        match check {
            CheckSpec::SnmpValue(c) => {
                let levels = c.reactions.clone().validated(&[])?;
                if !levels.is_empty() {
                    bundle.checks.insert(c.check_description.clone(), levels);
                }
            }
            // One reaction per target type cannot address a single instance.
            CheckSpec::SnmpAggregate(c) => {
                let levels = c.reactions.clone().validated(&[INSTANCE_SUBSTITUTION])?;
                if !levels.is_empty() {
                    bundle.checks.insert(c.check_description.clone(), levels);
                }
            }
            CheckSpec::TrapReaction(c) => {
                if let Some(entry) = c.reaction.clone().map(|r| r.validated(&[])).transpose()?.flatten() {
                    bundle.traps.insert(c.trap_oid.clone(), entry);
                }
            }
        }
    }
    bundle.host = spec
        .instance_failure_reaction
        .clone()
        .map(|w| w.validate(&[]))
        .transpose()?
        .flatten()
        .map(|workflow| ReactionEntry {
            workflow,
            constraints: None,
        });
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnagios_core::{
        CheckSchedule, LevelReactions, SnmpAggregateCheck, SnmpProperties, SnmpV2c, SnmpValueCheck,
        Thresholds, TrapReactionCheck, WorkflowSpec, WorkflowValidationError,
    };
    use mnagios_store::LocalRunner;
    use serde_json::json;
    use std::path::Path;

    fn manager() -> (tempfile::TempDir, Arc<LocalRunner>, Arc<ConfigStore>, TargetTypeManager) {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(LocalRunner::new());
        let store = Arc::new(ConfigStore::local(dir.path(), Arc::clone(&runner)));
        let manager = TargetTypeManager::new(Arc::clone(&store));
        (dir, runner, store, manager)
    }

    fn spec() -> TargetTypeSpec {
        TargetTypeSpec {
            name: "vm".to_string(),
            description: "Virtual machines".to_string(),
            instance_health_check: "check-host-icmp".to_string(),
            schedule: CheckSchedule::default(),
            snmp: SnmpProperties {
                v3: None,
                v2c: Some(SnmpV2c {
                    community: "public".to_string(),
                }),
            },
            checks: vec![
                CheckSpec::SnmpValue(SnmpValueCheck {
                    name: "cpu".to_string(),
                    check_description: "CPU load".to_string(),
                    snmp_oid: "1.3.6.1.4.1.2021.10.1.3.1".to_string(),
                    thresholds: Thresholds {
                        high_critical_threshold: Some(90.0),
                        ..Default::default()
                    },
                    schedule: CheckSchedule {
                        check_interval: 5,
                        ..Default::default()
                    },
                    rate_check: true,
                    reactions: LevelReactions {
                        low: None,
                        high: Some(ReactionEntry {
                            workflow: WorkflowSpec::new("heal")
                                .with_parameters(json!({"node_instance_id": "{{instance}}"})),
                            constraints: None,
                        }),
                    },
                }),
                CheckSpec::TrapReaction(TrapReactionCheck {
                    name: "link-down".to_string(),
                    trap_oid: "1.3.6.1.6.3.1.1.5.3".to_string(),
                    reaction: None,
                }),
            ],
            instance_failure_reaction: Some(WorkflowSpec::new("heal")),
        }
    }

    #[test]
    fn create_deploys_every_object() {
        let (_dir, runner, store, manager) = manager();
        manager.create(&spec()).unwrap();

        let layout = store.layout();
        let poll = store.read(&layout.check("vm", "cpu")).unwrap().unwrap();
        assert!(poll.contains("vm_instances:CPU load"));
        assert!(poll.contains("check_snmp_numeric!vm!1.3.6.1.4.1.2021.10.1.3.1!!!!90!--rate"));
        assert!(poll.contains("notification_interval   5"));
        let trap = store.read(&layout.check("vm", "link-down")).unwrap().unwrap();
        assert!(trap.contains("vm_instances:SNMPTRAP 1.3.6.1.6.3.1.1.5.3"));

        let ini = store.read(&layout.target_type_connection("vm")).unwrap().unwrap();
        assert_eq!(ini, "[snmp_params]\nprotocol = 2c\ncommunity = public\n\n");

        let bundle: ReactionBundle =
            serde_json::from_str(&store.read(&layout.target_type_reactions("vm")).unwrap().unwrap()).unwrap();
        assert!(bundle.checks["CPU load"].high.is_some());
        assert!(bundle.traps.is_empty());
        assert_eq!(bundle.host.unwrap().workflow.workflow_id, "heal");

        assert_eq!(manager.list().unwrap(), vec!["vm"]);
        assert_eq!(runner.reloads(), 1);
    }

    #[test]
    fn invalid_input_writes_nothing() {
        let (_dir, runner, store, manager) = manager();

        let mut bad_check = spec();
        bad_check.instance_health_check = "check-http".to_string();
        assert!(matches!(manager.create(&bad_check), Err(TargetError::InvalidHealthCheck { .. })));

        let mut no_snmp = spec();
        no_snmp.snmp = SnmpProperties::default();
        assert!(matches!(manager.create(&no_snmp), Err(TargetError::NoSnmpConfiguration)));

        let mut aggregate = spec();
        aggregate.checks.push(CheckSpec::SnmpAggregate(SnmpAggregateCheck {
            name: "net".to_string(),
            check_description: "Traffic".to_string(),
            snmp_oids: vec!["1.3.6.1.2.1.2.2.1.10.1".to_string()],
            on_unknown: "ignore".to_string(),
            aggregation_type: Default::default(),
            thresholds: Thresholds::default(),
            schedule: CheckSchedule::default(),
            rate_check: false,
            reactions: LevelReactions {
                low: Some(ReactionEntry {
                    workflow: WorkflowSpec::new("scale")
                        .with_parameters(json!({"scalable_entity_name": "{{instance}}"})),
                    constraints: None,
                }),
                high: None,
            },
        }));
        assert!(matches!(
            manager.create(&aggregate),
            Err(TargetError::Workflow(WorkflowValidationError::DisallowedSubstitution { .. }))
        ));

        assert!(runner.commands().is_empty());
        assert!(!store.exists(Path::new("target_types")));
    }

    #[test]
    fn delete_removes_type_and_its_hosts() {
        let (_dir, _runner, store, manager) = manager();
        manager.create(&spec()).unwrap();
        let layout = store.layout();
        let options = DeployOptions::new(PRIVILEGE).without_reload();
        let target = TemplateParams::new()
            .with("instance_id", "inst_1")
            .with("instance_ip", "10.0.0.5")
            .with("tenant", "t1")
            .with("deployment", "d1")
            .with("target_type", "vm");
        store
            .deploy(&layout.target("inst_1").unwrap(), &BuiltinTemplate::Target.into(), &target, options)
            .unwrap();
        store
            .deploy(
                &layout.tenant_target_type("t1", "vm").unwrap(),
                &BuiltinTemplate::Hostgroup.into(),
                &TemplateParams::new().with("name", "tenant:t1/target_type:vm").with("description", "x"),
                options,
            )
            .unwrap();

        manager.delete("vm").unwrap();

        assert!(!store.exists(&layout.target("inst_1").unwrap()));
        assert!(!store.exists(&layout.tenant_target_type("t1", "vm").unwrap()));
        assert!(!store.exists(&layout.checks_dir("vm")));
        assert!(!store.exists(&layout.target_type("vm")));
        assert!(!store.exists(&layout.target_type_connection("vm")));
        assert!(manager.list().unwrap().is_empty());
    }
}
