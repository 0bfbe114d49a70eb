//! mnagios-api — REST API for managed Nagios.
//!
//! Orchestration workflows call these routes on the Nagios server to add
//! and remove monitored instances and groups. Requests arrive through an
//! authenticating proxy which sets `Proxy-User`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Greet the authenticated user |
//! | PUT | `/targets/{tenant}/{deployment}/{instance_id}` | Monitor an instance |
//! | DELETE | `/targets/{tenant}/{deployment}/{instance_id}` | Stop monitoring an instance |
//! | PUT | `/groups/{tenant}/{group_type}/{group_name}` | Create a group instance |
//! | DELETE | `/groups/{tenant}/{group_type}/{group_name}` | Delete a group instance |
//! | PUT | `/metagroups/{tenant}/{group_type}/{prefix}` | Create a meta-group |
//! | DELETE | `/metagroups/{tenant}/{group_type}/{prefix}` | Delete a meta-group |

pub mod error;
pub mod group_handlers;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, put};
use axum::{Json, Router};
use mnagios_groups::GroupManager;
use mnagios_status::NagiosStateReader;
use mnagios_targets::TargetManager;

pub use error::{ApiError, ApiResult};

/// How long a new target may take to show up after the reload.
#[derive(Debug, Clone, Copy)]
pub struct SettleSettings {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_secs(1),
        }
    }
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub targets: Arc<TargetManager>,
    pub groups: Arc<GroupManager>,
    pub reader: Arc<NagiosStateReader>,
    pub settle: SettleSettings,
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::hello))
        .route(
            "/targets/{tenant}/{deployment}/{instance_id}",
            put(handlers::put_target).delete(handlers::delete_target),
        )
        .route(
            "/groups/{tenant}/{group_type}/{group_name}",
            put(group_handlers::put_group).delete(group_handlers::delete_group),
        )
        .route(
            "/metagroups/{tenant}/{group_type}/{prefix}",
            put(group_handlers::put_meta_group).delete(group_handlers::delete_meta_group),
        )
        .with_state(state)
}
