//! Ask the orchestration manager to restart monitoring for every
//! deployment with monitored nodes.
//!
//! Used after the Nagios server is rebuilt or its configuration is lost:
//! each deployment's "start monitoring" operation recreates its targets.
//! Failures are isolated per deployment and collected in the report; the
//! run itself never fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use mnagios_core::{NodeIdentity, WorkflowSpec};
use mnagios_gateway::{Entity, OrchestrationApi, include_all};
use mnagios_status::ObjectCache;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::report::ReconcileReport;

/// Node property marking a node as monitored.
pub const MONITORING_PROPERTY: &str = "nagiosrest_monitoring";
/// Operation run on each monitored node.
pub const START_MONITORING_OPERATION: &str = "cloudify.interfaces.monitoring.start";
/// Tenant used to list the tenants themselves.
pub const LISTING_TENANT: &str = "default_tenant";

/// Whether Nagios already knows about a node.
pub trait MonitoringState: Send + Sync {
    fn is_monitored(&self, node: &NodeIdentity) -> bool;
}

/// A node is monitored once its pseudo-host is in the object cache.
impl MonitoringState for ObjectCache {
    fn is_monitored(&self, node: &NodeIdentity) -> bool {
        match self.load(false) {
            Ok(objects) => objects.has_host(&node.to_string()),
            Err(e) => {
                warn!(error = %e, "object cache unreadable, treating node as unmonitored");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileFilter {
    /// Only these tenants; empty means all.
    pub only_tenants: Vec<String>,
    /// Only these deployments; empty means all.
    pub only_deployments: Vec<String>,
    /// Leave nodes Nagios already monitors alone.
    pub skip_monitored: bool,
}

impl ReconcileFilter {
    fn wants_tenant(&self, tenant: &str) -> bool {
        self.only_tenants.is_empty() || self.only_tenants.iter().any(|t| t == tenant)
    }

    fn wants_deployment(&self, deployment: &str) -> bool {
        self.only_deployments.is_empty() || self.only_deployments.iter().any(|d| d == deployment)
    }
}

fn has_monitoring_properties(node: &Entity) -> bool {
    node.get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| properties.contains_key(MONITORING_PROPERTY))
}

fn start_monitoring(nodes: &[String]) -> WorkflowSpec {
    WorkflowSpec::new("execute_operation").with_parameters(json!({
        "node_ids": nodes,
        "operation": START_MONITORING_OPERATION,
    }))
}

pub struct Reconciler<A> {
    api: A,
    state: Option<Arc<dyn MonitoringState>>,
}

impl<A: OrchestrationApi> Reconciler<A> {
    pub fn new(api: A) -> Self {
        Self { api, state: None }
    }

    /// Consulted when a filter asks to skip monitored nodes.
    pub fn with_monitoring_state(mut self, state: Arc<dyn MonitoringState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn reconcile(&self, filter: &ReconcileFilter) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        info!("getting tenant list");
        let tenants = match self
            .api
            .list_entities("tenants", LISTING_TENANT, &["name"], include_all)
            .await
        {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "listing tenants failed");
                report.listing_error = Some(e.to_string());
                return report;
            }
        };

        for tenant in tenants.iter().filter_map(|t| t.get("name").and_then(Value::as_str)) {
            if !filter.wants_tenant(tenant) {
                info!(%tenant, "skipping tenant");
                continue;
            }
            self.reconcile_tenant(tenant, filter, &mut report).await;
        }

        if report.is_clean() {
            info!(summary = %report, "reconciliation finished");
        } else {
            warn!(summary = %report, "reconciliation finished with problems");
        }
        report
    }

    async fn reconcile_tenant(&self, tenant: &str, filter: &ReconcileFilter, report: &mut ReconcileReport) {
        info!(%tenant, "checking deployments");
        let nodes = match self
            .api
            .list_entities("nodes", tenant, &["deployment_id", "id"], has_monitoring_properties)
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(%tenant, error = %e, "listing nodes failed");
                report.tenant_errors.insert(tenant.to_string(), e.to_string());
                return;
            }
        };
        info!(%tenant, count = nodes.len(), "found nodes with monitoring configuration");

        let mut targets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &nodes {
            let (Some(deployment), Some(node_id)) = (
                node.get("deployment_id").and_then(Value::as_str),
                node.get("id").and_then(Value::as_str),
            ) else {
                continue;
            };
            if !filter.wants_deployment(deployment) {
                continue;
            }
            if filter.skip_monitored && self.already_monitored(tenant, deployment, node_id) {
                report.skipped_nodes += 1;
                continue;
            }
            targets
                .entry(deployment.to_string())
                .or_default()
                .push(node_id.to_string());
        }

        for (deployment, node_ids) in &targets {
            info!(%tenant, %deployment, nodes = node_ids.len(), "starting monitoring");
            match self
                .api
                .start_workflow(tenant, deployment, &start_monitoring(node_ids))
                .await
            {
                Ok(_) => report.record_started(tenant, deployment),
                Err(e) => {
                    error!(%tenant, %deployment, error = %e, "failed to start workflow");
                    report.record_failed(tenant, deployment);
                }
            }
        }
    }

    fn already_monitored(&self, tenant: &str, deployment: &str, node: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.is_monitored(&NodeIdentity::new(tenant, deployment, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReconcileOutcome;
    use mnagios_gateway::{Execution, GatewayError, GatewayResult};
    use mnagios_status::{OBJECT_CACHE_SEPARATOR, parse_data};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Manager fake: tenants, monitored nodes per tenant, and deployments
    /// whose workflow start fails.
    #[derive(Default)]
    struct FakeManager {
        tenants: Vec<&'static str>,
        nodes: BTreeMap<&'static str, Vec<Value>>,
        broken_tenants: HashSet<&'static str>,
        failing: HashSet<&'static str>,
        started: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeManager {
        fn started(&self) -> Vec<(String, String, Value)> {
            self.started.lock().unwrap().clone()
        }
    }

    fn node(deployment: &str, id: &str, monitored: bool) -> Value {
        let properties = if monitored {
            json!({ MONITORING_PROPERTY: {"target_type": "vm"} })
        } else {
            json!({})
        };
        json!({"id": id, "deployment_id": deployment, "properties": properties})
    }

    impl OrchestrationApi for FakeManager {
        async fn list_entities(
            &self,
            entity_type: &str,
            tenant: &str,
            properties: &[&str],
            include: fn(&Entity) -> bool,
        ) -> GatewayResult<Vec<Entity>> {
            let values: Vec<Value> = match entity_type {
                "tenants" => self.tenants.iter().map(|t| json!({"name": t})).collect(),
                "nodes" if self.broken_tenants.contains(tenant) => {
                    return Err(GatewayError::NoHealthyManagers);
                }
                "nodes" => self.nodes.get(tenant).cloned().unwrap_or_default(),
                _ => Vec::new(),
            };
            Ok(values
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .filter(|e| include(e))
                .map(|mut e| {
                    e.retain(|k, _| properties.contains(&k.as_str()));
                    e
                })
                .collect())
        }

        async fn start_workflow(&self, tenant: &str, deployment: &str, workflow: &WorkflowSpec) -> GatewayResult<String> {
            if self.failing.contains(deployment) {
                return Err(GatewayError::RequestFailed {
                    status: 500,
                    message: "internal error".to_string(),
                });
            }
            self.started.lock().unwrap().push((
                tenant.to_string(),
                deployment.to_string(),
                workflow.parameters.clone(),
            ));
            Ok(format!("exec-{deployment}"))
        }

        async fn get_execution(&self, _tenant: &str, execution_id: &str) -> GatewayResult<Execution> {
            Err(GatewayError::Transport(format!("unexpected lookup of {execution_id}")))
        }

        async fn list_executions(&self, _tenant: &str, _deployment: &str) -> GatewayResult<Vec<Execution>> {
            Ok(Vec::new())
        }
    }

    fn three_tenants() -> FakeManager {
        FakeManager {
            tenants: vec!["t1", "t2", "t3"],
            nodes: BTreeMap::from([
                (
                    "t1",
                    vec![node("d1", "web", true), node("d1", "db", true), node("d1", "lb", false)],
                ),
                ("t2", vec![node("d2", "web", true), node("d3", "web", true)]),
                ("t3", vec![node("d4", "web", true)]),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_monitoring_per_deployment() {
        let reconciler = Reconciler::new(three_tenants());
        let report = reconciler.reconcile(&ReconcileFilter::default()).await;

        assert_eq!(report.outcome(), ReconcileOutcome::AllSucceeded { deployments: 4 });
        let started = reconciler.api().started();
        assert_eq!(started.len(), 4);
        let (tenant, deployment, parameters) = &started[0];
        assert_eq!((tenant.as_str(), deployment.as_str()), ("t1", "d1"));
        assert_eq!(parameters["node_ids"], json!(["web", "db"]));
        assert_eq!(parameters["operation"], START_MONITORING_OPERATION);
    }

    #[tokio::test]
    async fn failures_stay_within_their_deployment_and_tenant() {
        let mut manager = three_tenants();
        manager.failing.insert("d2");
        manager.broken_tenants.insert("t1");
        let reconciler = Reconciler::new(manager);
        let report = reconciler.reconcile(&ReconcileFilter::default()).await;

        assert_eq!(report.failed.get("t2"), Some(&vec!["d2".to_string()]));
        assert_eq!(report.started.get("t2"), Some(&vec!["d3".to_string()]));
        assert_eq!(report.started.get("t3"), Some(&vec!["d4".to_string()]));
        assert!(report.tenant_errors.contains_key("t1"));
        assert_eq!(
            report.outcome(),
            ReconcileOutcome::Problems {
                tenants: 2,
                deployments: 1
            }
        );
    }

    #[tokio::test]
    async fn filters_by_tenant_and_deployment() {
        let reconciler = Reconciler::new(three_tenants());
        let report = reconciler
            .reconcile(&ReconcileFilter {
                only_tenants: vec!["t2".to_string()],
                only_deployments: vec!["d3".to_string()],
                skip_monitored: false,
            })
            .await;
        assert_eq!(report.outcome(), ReconcileOutcome::AllSucceeded { deployments: 1 });

        let report = reconciler
            .reconcile(&ReconcileFilter {
                only_tenants: vec!["t9".to_string()],
                ..Default::default()
            })
            .await;
        assert_eq!(report.outcome(), ReconcileOutcome::NothingToDo);
    }

    #[tokio::test]
    async fn skip_monitored_leaves_known_nodes_alone() {
        let cache = ObjectCache::from_data(parse_data(
            "define host {\n\thost_name\ttenant:t1/deployment:d1/node:web\n\t}\n",
            OBJECT_CACHE_SEPARATOR,
        ));
        let reconciler = Reconciler::new(three_tenants()).with_monitoring_state(Arc::new(cache));
        let report = reconciler
            .reconcile(&ReconcileFilter {
                only_tenants: vec!["t1".to_string()],
                skip_monitored: true,
                ..Default::default()
            })
            .await;

        assert_eq!(report.skipped_nodes, 1);
        let started = reconciler.api().started();
        assert_eq!(started[0].2["node_ids"], json!(["db"]));
    }

    #[tokio::test]
    async fn tenant_listing_failure_is_reported() {
        struct Down;
        impl OrchestrationApi for Down {
            async fn list_entities(
                &self,
                _: &str,
                _: &str,
                _: &[&str],
                _: fn(&Entity) -> bool,
            ) -> GatewayResult<Vec<Entity>> {
                Err(GatewayError::NoHealthyManagers)
            }
            async fn start_workflow(&self, _: &str, _: &str, _: &WorkflowSpec) -> GatewayResult<String> {
                Err(GatewayError::NoHealthyManagers)
            }
            async fn get_execution(&self, _: &str, _: &str) -> GatewayResult<Execution> {
                Err(GatewayError::NoHealthyManagers)
            }
            async fn list_executions(&self, _: &str, _: &str) -> GatewayResult<Vec<Execution>> {
                Err(GatewayError::NoHealthyManagers)
            }
        }

        let report = Reconciler::new(Down).reconcile(&ReconcileFilter::default()).await;
        assert!(report.listing_error.is_some());
        assert!(!report.is_clean());
    }
}
