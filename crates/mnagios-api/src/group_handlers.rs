//! REST handlers for group instances and meta-groups.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use mnagios_core::{Aggregation, MetaGroupSpec, Thresholds, WorkflowSpec};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::ApiResult;
use crate::handlers::parse_body;
use crate::{ApiResponse, ApiState};

// ── Group instances ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub reaction_target: String,
}

/// PUT /groups/{tenant}/{group_type}/{group_name}
pub async fn put_group(
    State(state): State<ApiState>,
    Path((tenant, group_type, group_name)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request: GroupRequest = parse_body(body, &["reaction_target"])?;
    info!(%tenant, %group_type, %group_name, "creating group instance");
    let name = group_name.clone();
    tokio::task::spawn_blocking(move || {
        state
            .groups
            .create_group_instance(&tenant, &group_type, &name, &request.reaction_target)
    })
    .await??;
    Ok(ApiResponse::ok(format!("Group instance {group_name} created")))
}

/// DELETE /groups/{tenant}/{group_type}/{group_name}
pub async fn delete_group(
    State(state): State<ApiState>,
    Path((tenant, group_type, group_name)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    info!(%tenant, %group_type, %group_name, "deleting group instance");
    let message = format!("{group_name} of {group_type} for {tenant} deleted");
    tokio::task::spawn_blocking(move || state.groups.delete_group_instance(&tenant, &group_type, &group_name))
        .await??;
    Ok(ApiResponse::ok(message))
}

// ── Meta-groups ────────────────────────────────────────────────

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct MetaGroupRequest {
    pub approach: Aggregation,
    pub unknown: String,
    pub target: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub low_reaction: Option<WorkflowSpec>,
    #[serde(default)]
    pub high_reaction: Option<WorkflowSpec>,
}

/// PUT /metagroups/{tenant}/{group_type}/{prefix}
pub async fn put_meta_group(
    State(state): State<ApiState>,
    Path((tenant, group_type, prefix)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request: MetaGroupRequest = parse_body(body, &["approach", "unknown", "target"])?;
    info!(%tenant, %group_type, %prefix, approach = request.approach.as_str(), "creating meta group");
    let spec = MetaGroupSpec {
        tenant,
        group_type,
        group_instance_prefix: prefix.clone(),
        approach: request.approach,
        unknown: request.unknown,
        check_interval: request.interval,
        thresholds: request.thresholds,
        reaction_target: request.target,
        low_reaction: request.low_reaction,
        high_reaction: request.high_reaction,
    };
    tokio::task::spawn_blocking(move || state.groups.create_meta_group(&spec)).await??;
    Ok(ApiResponse::ok(format!("Meta group {prefix} created")))
}

/// DELETE /metagroups/{tenant}/{group_type}/{prefix}
pub async fn delete_meta_group(
    State(state): State<ApiState>,
    Path((tenant, group_type, prefix)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    info!(%tenant, %group_type, %prefix, "deleting meta group");
    let message = format!("{prefix} of {group_type} for {tenant} deleted");
    tokio::task::spawn_blocking(move || state.groups.delete_meta_group(&tenant, &group_type, &prefix)).await??;
    Ok(ApiResponse::ok(message))
}
