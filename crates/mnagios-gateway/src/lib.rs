//! mnagios-gateway — talking to the orchestration manager.
//!
//! Reactions and reconciliation start workflows on the manager cluster.
//! Every request is tried against each configured endpoint in turn,
//! skipping managers that are down or answer as a standby.
//!
//! ```text
//!   ManagerClient<T: Transport> ──▶ https://m1:443 ✗ unreachable
//!        │  (OrchestrationApi)  ──▶ https://m2:443 ✗ not_cluster_master
//!        │                      ──▶ https://m3:443 ✓
//!        └── executions: wait_for_execution_success, wait_for_execution_on_deployment
//! ```

pub mod client;
pub mod error;
pub mod executions;
pub mod transport;

pub use client::{
    DEFAULT_PAGE_SIZE, Entity, Execution, ExecutionStatus, ManagerClient, OrchestrationApi, include_all,
};
pub use error::{GatewayError, GatewayResult};
pub use executions::{
    PollSettings, run_workflow_for_instance, wait_for_execution_on_deployment, wait_for_execution_success,
};
pub use transport::{HttpTransport, Method, Transport, TransportError, TransportRequest, TransportResponse};
