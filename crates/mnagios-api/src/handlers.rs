//! REST handlers for targets.
//!
//! Store operations are blocking (file moves, validation runs), so each one
//! runs on the blocking pool.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use mnagios_core::derive_node_id;
use mnagios_groups::list_group_types;
use mnagios_status::ServiceState;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::{ApiResponse, ApiState};

/// Header the fronting proxy puts the authenticated user in.
pub const PROXY_USER_HEADER: &str = "Proxy-User";

const TRAP_SERVICE_PREFIX: &str = "SNMPTRAP ";

/// Decode a JSON body after checking every required key is present.
pub(crate) fn parse_body<T: DeserializeOwned>(
    body: Result<Json<Value>, JsonRejection>,
    required: &[&str],
) -> ApiResult<T> {
    let Ok(Json(value)) = body else {
        return Err(ApiError::BadRequest(format!(
            "Content-Type header must be set to application/json and the following \
             parameters supplied in a json dict: {}",
            required.join(",")
        )));
    };
    if !required.iter().all(|arg| value.get(arg).is_some()) {
        return Err(ApiError::BadRequest(format!(
            "Not all arguments were supplied. Required args: {}",
            required.join(",")
        )));
    }
    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ── Root ───────────────────────────────────────────────────────

/// GET /
pub async fn hello(headers: HeaderMap) -> ApiResult<String> {
    let user = headers
        .get(PROXY_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("no authenticated user".to_string()))?;
    Ok(format!("Hello {user}\n"))
}

// ── Targets ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub instance_ip: String,
    pub target_type: String,
    /// `[group_type, group_name]` pairs the instance's node joins.
    #[serde(default)]
    pub groups: Vec<(String, String)>,
}

/// PUT /targets/{tenant}/{deployment}/{instance_id}
pub async fn put_target(
    State(state): State<ApiState>,
    Path((tenant, deployment, instance_id)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request: TargetRequest = parse_body(body, &["instance_ip", "target_type"])?;
    info!(%tenant, %deployment, %instance_id, target_type = %request.target_type, "creating target");

    let worker = state.clone();
    let (t, d, i) = (tenant.clone(), deployment.clone(), instance_id.clone());
    let groups = request.groups.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        if !groups.is_empty() {
            let available = list_group_types(worker.targets.store()).map_err(ApiError::from)?;
            if let Some((unknown, _)) = groups.iter().find(|(gt, _)| !available.contains(gt)) {
                return Err(ApiError::BadRequest(format!(
                    "group type {unknown} was not valid; available group types are: {}",
                    available.join(", ")
                )));
            }
        }
        worker
            .targets
            .create_target(&i, &request.instance_ip, &t, &d, &request.target_type)?;
        Ok(())
    })
    .await??;

    settle_trap_services(&state, &instance_id).await;

    if !request.groups.is_empty() {
        let worker = state.clone();
        let (t, d) = (tenant.clone(), deployment.clone());
        let node = derive_node_id(&instance_id).to_string();
        let groups = request.groups;
        tokio::task::spawn_blocking(move || -> ApiResult<()> {
            for (group_type, group_name) in &groups {
                worker
                    .groups
                    .associate_node_with_group(&t, &d, &node, group_type, group_name)?;
            }
            Ok(())
        })
        .await??;
    }

    Ok(ApiResponse::ok(format!("{instance_id} target created")))
}

/// Wait for the reloaded object cache to contain the instance, then mark
/// its trap services OK so they do not start out pending.
async fn settle_trap_services(state: &ApiState, instance_id: &str) {
    let reader = Arc::clone(&state.reader);
    let mut present = false;
    for attempt in 0..state.settle.attempts {
        let defined = reader
            .load_object_cache(true)
            .map(|objects| objects.target_type_for_instance(instance_id).is_ok())
            .unwrap_or(false);
        if defined {
            present = true;
            break;
        }
        debug!(%instance_id, attempt, "instance not defined yet, retrying");
        tokio::time::sleep(state.settle.interval).await;
    }
    if !present {
        warn!(%instance_id, "instance did not appear in the object cache");
        return;
    }

    let snapshot = match reader.load_status_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(%instance_id, error = %e, "status unavailable, trap services left pending");
            return;
        }
    };
    for service in snapshot.services_for_host(instance_id) {
        let Some(description) = service.get("service_description") else {
            continue;
        };
        let is_trap = description
            .split_once(':')
            .is_some_and(|(_, name)| name.starts_with(TRAP_SERVICE_PREFIX));
        if !is_trap {
            continue;
        }
        debug!(%instance_id, service = %description, "submitting OK passive check result");
        if let Err(e) = reader.commands().submit_passive_check_result(
            instance_id,
            description,
            ServiceState::Ok,
            "No traps received",
        ) {
            warn!(%instance_id, service = %description, error = %e, "passive result not submitted");
        }
    }
}

/// DELETE /targets/{tenant}/{deployment}/{instance_id}
pub async fn delete_target(
    State(state): State<ApiState>,
    Path((tenant, deployment, instance_id)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    info!(%tenant, %deployment, %instance_id, "deleting target");
    let deleted = tokio::task::spawn_blocking(move || {
        state.targets.delete_target(&instance_id, &tenant, &deployment)
    })
    .await??;
    Ok(ApiResponse::ok(serde_json::json!({
        "node_removed": deleted.node_removed,
        "hostgroups_removed": deleted.hostgroups_removed,
    })))
}
