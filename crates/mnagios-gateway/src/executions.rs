//! Bounded polling of workflow executions.

use std::time::Duration;

use mnagios_core::{ManagerConfig, WorkflowSpec};
use mnagios_status::ObjectCache;
use tracing::{debug, error, info};

use crate::client::{Execution, ExecutionStatus, OrchestrationApi};
use crate::error::{GatewayError, GatewayResult};

/// How long to keep asking about an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_checks: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_checks: 180,
            interval: Duration::from_secs(10),
        }
    }
}

impl From<&ManagerConfig> for PollSettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            max_checks: config.max_checks,
            interval: config.check_interval(),
        }
    }
}

/// Poll until the execution leaves `pending`/`started`, then require it
/// to have `terminated`.
pub async fn wait_for_execution_success<A: OrchestrationApi>(
    api: &A,
    tenant: &str,
    execution_id: &str,
    poll: PollSettings,
) -> GatewayResult<Execution> {
    debug!(%execution_id, "waiting for execution");
    let checks = poll.max_checks.max(1);
    let mut check = 0;
    let execution = loop {
        debug!(check, max = checks, "checking execution");
        let execution = api.get_execution(tenant, execution_id).await?;
        check += 1;
        if !execution.status.is_in_progress() || check >= checks {
            break execution;
        }
        tokio::time::sleep(poll.interval).await;
    };

    if execution.status != ExecutionStatus::Terminated {
        error!(
            %execution_id,
            status = execution.status.as_str(),
            error = execution.error.as_deref().unwrap_or(""),
            "execution did not terminate"
        );
        let message = match (&execution.status, &execution.error) {
            (ExecutionStatus::Failed, Some(error)) => error.clone(),
            (status, _) => format!("Final state was {}", status.as_str()),
        };
        return Err(GatewayError::ExecutionDidNotSucceed {
            execution_id: execution_id.to_string(),
            message,
        });
    }
    Ok(execution)
}

/// Wait for an execution of `workflow` to appear on `deployment`.
///
/// Gives up with `ExecutionNotStarted` once `max_wait_for_start` has passed
/// without one. With `wait_for_completion`, the found execution is then
/// polled to success.
pub async fn wait_for_execution_on_deployment<A: OrchestrationApi>(
    api: &A,
    tenant: &str,
    deployment: &str,
    workflow: &str,
    max_wait_for_start: Duration,
    retry_interval: Duration,
    wait_for_completion: Option<PollSettings>,
) -> GatewayResult<Execution> {
    let mut waited = Duration::ZERO;
    loop {
        let executions = api.list_executions(tenant, deployment).await?;
        if let Some(execution) = executions.into_iter().find(|e| e.workflow_id == workflow) {
            info!(%workflow, %deployment, execution_id = %execution.id, "execution started");
            return match wait_for_completion {
                Some(poll) => wait_for_execution_success(api, tenant, &execution.id, poll).await,
                None => Ok(execution),
            };
        }
        if waited >= max_wait_for_start {
            return Err(GatewayError::ExecutionNotStarted {
                workflow: workflow.to_string(),
                deployment: deployment.to_string(),
                waited,
            });
        }
        debug!(%workflow, %deployment, ?waited, "waiting for execution to start");
        tokio::time::sleep(retry_interval).await;
        waited += retry_interval.max(Duration::from_millis(1));
    }
}

/// Start `workflow` on the deployment owning `instance_id`.
///
/// The tenant and deployment are looked up in the object cache unless the
/// caller already knows both. Returns the tenant and the execution id.
pub async fn run_workflow_for_instance<A: OrchestrationApi>(
    api: &A,
    objects: &ObjectCache,
    instance_id: &str,
    workflow: &WorkflowSpec,
    known: Option<(&str, &str)>,
) -> GatewayResult<(String, String)> {
    debug!(%instance_id, workflow = %workflow.workflow_id, "running workflow for instance");
    let (tenant, deployment) = match known {
        Some((tenant, deployment)) => (tenant.to_string(), deployment.to_string()),
        None => {
            let found = objects.load(false)?.tenant_and_deployment_for_instance(instance_id)?;
            (found.tenant, found.deployment)
        }
    };
    let execution_id = api.start_workflow(&tenant, &deployment, workflow).await?;
    Ok((tenant, execution_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Entity;
    use mnagios_status::{OBJECT_CACHE_SEPARATOR, parse_data};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Orchestration fake answering executions from scripts.
    #[derive(Default)]
    struct FakeApi {
        executions: Mutex<VecDeque<Execution>>,
        listings: Mutex<VecDeque<Vec<Execution>>>,
        started: Mutex<Vec<(String, String, String)>>,
    }

    fn execution(id: &str, workflow: &str, status: ExecutionStatus, error: Option<&str>) -> Execution {
        Execution {
            id: id.to_string(),
            workflow_id: workflow.to_string(),
            deployment_id: Some("d1".to_string()),
            status,
            error: error.map(str::to_string),
        }
    }

    impl OrchestrationApi for FakeApi {
        async fn list_entities(
            &self,
            _entity_type: &str,
            _tenant: &str,
            _properties: &[&str],
            _include: fn(&Entity) -> bool,
        ) -> GatewayResult<Vec<Entity>> {
            Ok(Vec::new())
        }

        async fn start_workflow(&self, tenant: &str, deployment: &str, workflow: &WorkflowSpec) -> GatewayResult<String> {
            self.started.lock().unwrap().push((
                tenant.to_string(),
                deployment.to_string(),
                workflow.workflow_id.clone(),
            ));
            Ok("exec-1".to_string())
        }

        async fn get_execution(&self, _tenant: &str, execution_id: &str) -> GatewayResult<Execution> {
            let mut executions = self.executions.lock().unwrap();
            let next = if executions.len() > 1 {
                executions.pop_front()
            } else {
                executions.front().cloned()
            };
            next.ok_or_else(|| GatewayError::Transport(format!("no execution {execution_id}")))
        }

        async fn list_executions(&self, _tenant: &str, _deployment: &str) -> GatewayResult<Vec<Execution>> {
            let mut listings = self.listings.lock().unwrap();
            Ok(if listings.len() > 1 {
                listings.pop_front().unwrap_or_default()
            } else {
                listings.front().cloned().unwrap_or_default()
            })
        }
    }

    fn fast(max_checks: u32) -> PollSettings {
        PollSettings {
            max_checks,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn waits_through_progress_to_termination() {
        let api = FakeApi::default();
        api.executions.lock().unwrap().extend([
            execution("e", "heal", ExecutionStatus::Pending, None),
            execution("e", "heal", ExecutionStatus::Started, None),
            execution("e", "heal", ExecutionStatus::Terminated, None),
        ]);
        let done = wait_for_execution_success(&api, "t1", "e", fast(10)).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Terminated);
    }

    #[tokio::test]
    async fn failed_execution_reports_its_error() {
        let api = FakeApi::default();
        api.executions
            .lock()
            .unwrap()
            .push_back(execution("e", "heal", ExecutionStatus::Failed, Some("boom")));
        match wait_for_execution_success(&api, "t1", "e", fast(10)).await {
            Err(GatewayError::ExecutionDidNotSucceed { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn running_past_the_deadline_is_a_failure() {
        let api = FakeApi::default();
        api.executions
            .lock()
            .unwrap()
            .push_back(execution("e", "heal", ExecutionStatus::Started, None));
        match wait_for_execution_success(&api, "t1", "e", fast(3)).await {
            Err(GatewayError::ExecutionDidNotSucceed { message, .. }) => {
                assert_eq!(message, "Final state was started")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn finds_execution_once_it_appears() {
        let api = FakeApi::default();
        api.listings.lock().unwrap().extend([
            vec![],
            vec![execution("x", "install", ExecutionStatus::Terminated, None)],
            vec![
                execution("x", "install", ExecutionStatus::Terminated, None),
                execution("h", "heal", ExecutionStatus::Started, None),
            ],
        ]);
        api.executions
            .lock()
            .unwrap()
            .push_back(execution("h", "heal", ExecutionStatus::Terminated, None));
        let found = wait_for_execution_on_deployment(
            &api,
            "t1",
            "d1",
            "heal",
            Duration::from_secs(1),
            Duration::from_millis(1),
            Some(fast(5)),
        )
        .await
        .unwrap();
        assert_eq!(found.id, "h");
        assert_eq!(found.status, ExecutionStatus::Terminated);
    }

    #[tokio::test]
    async fn execution_that_never_starts_times_out() {
        let api = FakeApi::default();
        let err = wait_for_execution_on_deployment(
            &api,
            "t1",
            "d1",
            "scale",
            Duration::from_millis(3),
            Duration::from_millis(1),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::ExecutionNotStarted { .. }));
    }

    #[tokio::test]
    async fn instance_workflow_targets_its_deployment() {
        let cache = ObjectCache::from_data(parse_data(
            "define hostgroup {\n\thostgroup_name\ttenant:t1/deployment:d1\n\tmembers\tinst_1,inst_2\n\t}\n",
            OBJECT_CACHE_SEPARATOR,
        ));
        let api = FakeApi::default();
        let (tenant, execution_id) =
            run_workflow_for_instance(&api, &cache, "inst_1", &WorkflowSpec::new("heal"), None)
                .await
                .unwrap();
        assert_eq!(tenant, "t1");
        assert_eq!(execution_id, "exec-1");
        assert_eq!(
            api.started.lock().unwrap().as_slice(),
            &[("t1".to_string(), "d1".to_string(), "heal".to_string())]
        );

        let missing = run_workflow_for_instance(&api, &cache, "inst_9", &WorkflowSpec::new("heal"), None).await;
        assert!(matches!(missing, Err(GatewayError::Status(ref e)) if e.is_not_found()));
    }
}
