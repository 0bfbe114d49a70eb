//! Manager client: endpoint failover and the orchestration operations
//! built on top of it.

use std::future::Future;

use mnagios_core::{ManagerConfig, ManagerConnection, WorkflowSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::transport::{HttpTransport, Method, Transport, TransportError, TransportRequest, TransportResponse};

/// Error codes a standby cluster member answers with.
const NOT_ACTIVE_MANAGER_CODES: [&str; 2] = ["not_cluster_master", "removed_from_cluster"];

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One entity as returned by a list endpoint.
pub type Entity = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Started,
    Terminated,
    Failed,
    Cancelling,
    ForceCancelling,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn is_in_progress(self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Started => "started",
            ExecutionStatus::Terminated => "terminated",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelling => "cancelling",
            ExecutionStatus::ForceCancelling => "force_cancelling",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// The orchestration manager operations this workspace consumes.
pub trait OrchestrationApi: Send + Sync {
    /// Every entity of `entity_type` visible to `tenant`, across all pages.
    /// Entities failing `include` are dropped; when `properties` is
    /// non-empty, only those keys are kept.
    fn list_entities(
        &self,
        entity_type: &str,
        tenant: &str,
        properties: &[&str],
        include: fn(&Entity) -> bool,
    ) -> impl Future<Output = GatewayResult<Vec<Entity>>> + Send;

    /// Start `workflow` on `deployment`, returning the execution id.
    fn start_workflow(
        &self,
        tenant: &str,
        deployment: &str,
        workflow: &WorkflowSpec,
    ) -> impl Future<Output = GatewayResult<String>> + Send;

    fn get_execution(
        &self,
        tenant: &str,
        execution_id: &str,
    ) -> impl Future<Output = GatewayResult<Execution>> + Send;

    fn list_executions(
        &self,
        tenant: &str,
        deployment: &str,
    ) -> impl Future<Output = GatewayResult<Vec<Execution>>> + Send;
}

/// Keep every entity.
pub fn include_all(_: &Entity) -> bool {
    true
}

/// Client for a manager cluster. Requests go to each base URL in turn
/// until one answers as the active manager.
pub struct ManagerClient<T> {
    transport: T,
    base_urls: Vec<String>,
    page_size: usize,
}

impl ManagerClient<HttpTransport> {
    /// Connect using the credential and connection files named in `config`.
    pub fn from_config(config: &ManagerConfig) -> GatewayResult<Self> {
        let connection = ManagerConnection::load(config)?;
        debug!(?connection, "manager connection loaded");
        let transport = HttpTransport::new(&connection)?;
        Ok(Self::new(transport, connection.base_urls).with_page_size(config.page_size))
    }
}

impl<T: Transport> ManagerClient<T> {
    pub fn new(transport: T, base_urls: Vec<String>) -> Self {
        Self {
            transport,
            base_urls,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one request, failing over across the configured endpoints.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        tenant: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> GatewayResult<Value> {
        if !path.starts_with('/') {
            error!(%path, "manager path does not start with /");
            return Err(GatewayError::BadPath(path.to_string()));
        }

        for base_url in &self.base_urls {
            let request = TransportRequest {
                method,
                url: format!("{base_url}{path}"),
                tenant: tenant.to_string(),
                query: query.clone(),
                body: body.clone(),
            };
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(TransportError::Unreachable(reason)) => {
                    warn!(%base_url, %reason, "manager appears to be down, trying next");
                    continue;
                }
                Err(TransportError::Other(reason)) => return Err(GatewayError::Transport(reason)),
            };

            if not_active_manager(&response) {
                warn!(%base_url, "manager is a replica, trying next");
                continue;
            }
            if response.status < 300 {
                if response.body.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&response.body).map_err(|source| GatewayError::Decode {
                    what: "manager response",
                    source,
                });
            }

            let message = failure_reason(&response);
            error!(status = response.status, %message, "manager request failed");
            return Err(GatewayError::RequestFailed {
                status: response.status,
                message,
            });
        }

        error!("no healthy managers reached");
        Err(GatewayError::NoHealthyManagers)
    }
}

fn not_active_manager(response: &TransportResponse) -> bool {
    if response.status != 400 {
        return false;
    }
    // An unexpected error structure is not a cluster issue.
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("error_code").and_then(Value::as_str).map(str::to_string))
        .is_some_and(|code| NOT_ACTIVE_MANAGER_CODES.contains(&code.as_str()))
}

fn failure_reason(response: &TransportResponse) -> String {
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| response.body.clone())
}

impl<T: Transport> OrchestrationApi for ManagerClient<T> {
    async fn list_entities(
        &self,
        entity_type: &str,
        tenant: &str,
        properties: &[&str],
        include: fn(&Entity) -> bool,
    ) -> GatewayResult<Vec<Entity>> {
        debug!(%entity_type, %tenant, ?properties, "listing entities");
        let path = format!("/api/v3.1/{entity_type}");
        let mut results = Vec::new();
        let mut offset = 0;
        loop {
            let query = vec![
                ("_offset".to_string(), offset.to_string()),
                ("_size".to_string(), self.page_size.to_string()),
            ];
            let page = self.request(Method::Get, &path, tenant, query, None).await?;
            let items = match page.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            debug!(%entity_type, offset, count = items.len(), "received page");
            if items.is_empty() {
                break;
            }
            for item in items {
                let Value::Object(mut entity) = item else {
                    continue;
                };
                if !include(&entity) {
                    continue;
                }
                if !properties.is_empty() {
                    entity.retain(|key, _| properties.contains(&key.as_str()));
                }
                results.push(entity);
            }
            offset += self.page_size;
        }
        Ok(results)
    }

    async fn start_workflow(&self, tenant: &str, deployment: &str, workflow: &WorkflowSpec) -> GatewayResult<String> {
        info!(workflow = %workflow.workflow_id, %deployment, %tenant, "running workflow");
        let body = json!({
            "deployment_id": deployment,
            "workflow_id": workflow.workflow_id,
            "parameters": workflow.parameters,
            "allow_custom_parameters": workflow.allow_custom_parameters,
            "force": workflow.force,
            "dry_run": false,
        });
        let wrap = |source: GatewayError| GatewayError::StartWorkflowFailed {
            workflow: workflow.workflow_id.clone(),
            deployment: deployment.to_string(),
            source: Box::new(source),
        };
        let result = self
            .request(Method::Post, "/api/v3.1/executions", tenant, Vec::new(), Some(body))
            .await
            .map_err(|e| {
                error!(error = %e, "starting workflow failed");
                wrap(e)
            })?;
        match result.get("id").and_then(Value::as_str) {
            Some(id) => Ok(id.to_string()),
            None => Err(wrap(GatewayError::Transport(format!(
                "execution response carried no id: {result}"
            )))),
        }
    }

    async fn get_execution(&self, tenant: &str, execution_id: &str) -> GatewayResult<Execution> {
        debug!(%execution_id, %tenant, "retrieving execution");
        let path = format!("/api/v3.1/executions/{execution_id}");
        let value = self.request(Method::Get, &path, tenant, Vec::new(), None).await?;
        serde_json::from_value(value).map_err(|source| GatewayError::Decode {
            what: "execution",
            source,
        })
    }

    async fn list_executions(&self, tenant: &str, deployment: &str) -> GatewayResult<Vec<Execution>> {
        let query = vec![
            ("deployment_id".to_string(), deployment.to_string()),
            ("_include".to_string(), "id,workflow_id,status,error".to_string()),
        ];
        let value = self
            .request(Method::Get, "/api/v3.1/executions", tenant, query, None)
            .await?;
        let items = value.get("items").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(items).map_err(|source| GatewayError::Decode {
            what: "execution list",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport answering from a closure and recording every request.
    pub(crate) struct FnTransport<F> {
        respond: F,
        pub(crate) sent: Mutex<Vec<TransportRequest>>,
    }

    impl<F> FnTransport<F>
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync,
    {
        pub(crate) fn new(respond: F) -> Self {
            Self {
                respond,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl<F> Transport for FnTransport<F>
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync,
    {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            let response = (self.respond)(&request);
            self.sent.lock().unwrap().push(request);
            response
        }
    }

    fn urls(hosts: &[&str]) -> Vec<String> {
        hosts.iter().map(|h| format!("https://{h}:443")).collect()
    }

    #[tokio::test]
    async fn skips_unreachable_and_replica_managers() {
        let transport = FnTransport::new(|request: &TransportRequest| {
            if request.url.starts_with("https://down") {
                Err(TransportError::Unreachable("connection refused".into()))
            } else if request.url.starts_with("https://replica") {
                Ok(TransportResponse::json(400, &json!({"error_code": "not_cluster_master", "message": "no"})))
            } else {
                Ok(TransportResponse::json(200, &json!({"ok": true})))
            }
        });
        let client = ManagerClient::new(transport, urls(&["down", "replica", "master"]));
        let value = client
            .request(Method::Get, "/api/v3.1/status", "t1", Vec::new(), None)
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(client.transport().urls().len(), 3);
        let sent = client.transport().sent.lock().unwrap();
        assert!(sent.iter().all(|r| r.tenant == "t1"));
    }

    #[tokio::test]
    async fn exhausting_endpoints_is_no_healthy_managers() {
        let transport = FnTransport::new(|_: &TransportRequest| {
            Ok(TransportResponse::json(400, &json!({"error_code": "removed_from_cluster"})))
        });
        let client = ManagerClient::new(transport, urls(&["a", "b"]));
        let err = client
            .request(Method::Get, "/api/v3.1/status", "t1", Vec::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoHealthyManagers));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn other_failures_stop_at_the_first_manager() {
        let transport = FnTransport::new(|_: &TransportRequest| {
            Ok(TransportResponse::json(400, &json!({"error_code": "bad_parameters", "message": "nope"})))
        });
        let client = ManagerClient::new(transport, urls(&["a", "b"]));
        match client.request(Method::Get, "/x", "t1", Vec::new(), None).await {
            Err(GatewayError::RequestFailed { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(client.transport().urls().len(), 1);

        let err = client
            .request(Method::Get, "relative", "t1", Vec::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadPath(_)));
    }

    #[tokio::test]
    async fn list_entities_pages_filters_and_projects() {
        let transport = FnTransport::new(|request: &TransportRequest| {
            let offset: usize = request
                .query
                .iter()
                .find(|(k, _)| k == "_offset")
                .map(|(_, v)| v.parse().unwrap())
                .unwrap();
            let items = match offset {
                0 => json!([
                    {"id": "a", "deployment_id": "d1", "properties": {"nagiosrest_monitoring": {}}},
                    {"id": "b", "deployment_id": "d1", "properties": {}},
                ]),
                2 => json!([
                    {"id": "c", "deployment_id": "d2", "properties": {"nagiosrest_monitoring": {}}},
                ]),
                _ => json!([]),
            };
            Ok(TransportResponse::json(200, &json!({"items": items})))
        });
        let client = ManagerClient::new(transport, urls(&["m"])).with_page_size(2);
        let monitored = |entity: &Entity| {
            entity
                .get("properties")
                .and_then(|p| p.get("nagiosrest_monitoring"))
                .is_some()
        };
        let nodes = client
            .list_entities("nodes", "t1", &["id", "deployment_id"], monitored)
            .await
            .unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(nodes.iter().all(|n| !n.contains_key("properties")));
        // Pages at 0 and 2, then the empty page at 4.
        assert_eq!(client.transport().urls().len(), 3);
    }

    #[tokio::test]
    async fn start_workflow_posts_execution_request() {
        let transport = FnTransport::new(|request: &TransportRequest| {
            assert_eq!(request.method, Method::Post);
            let body = request.body.as_ref().unwrap();
            assert_eq!(body["deployment_id"], "d1");
            assert_eq!(body["workflow_id"], "heal");
            assert_eq!(body["dry_run"], false);
            Ok(TransportResponse::json(201, &json!({"id": "exec-1"})))
        });
        let client = ManagerClient::new(transport, urls(&["m"]));
        let id = client
            .start_workflow("t1", "d1", &WorkflowSpec::new("heal"))
            .await
            .unwrap();
        assert_eq!(id, "exec-1");
        assert!(client.transport().urls()[0].ends_with("/api/v3.1/executions"));
    }

    #[tokio::test]
    async fn start_workflow_failure_names_the_workflow() {
        let transport = FnTransport::new(|_: &TransportRequest| {
            Err(TransportError::Unreachable("down".into()))
        });
        let client = ManagerClient::new(transport, urls(&["m"]));
        let err = client
            .start_workflow("t1", "d1", &WorkflowSpec::new("heal"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StartWorkflowFailed { ref workflow, .. } if workflow == "heal"));
        assert!(err.is_unavailable());
    }

    #[test]
    fn unknown_execution_status_decodes() {
        let execution: Execution =
            serde_json::from_value(json!({"id": "e", "status": "queued"})).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Unknown);
        assert!(!execution.status.is_in_progress());
    }
}
