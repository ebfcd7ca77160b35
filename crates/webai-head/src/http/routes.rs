// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The head's UI-facing task and node API (§6). Unauthenticated at this
//! boundary — every mutating call is re-signed with the head's own key
//! before being forwarded to the owning node (§4.5).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webai_config::{NodeFanoutError, TaskSpec, TaskSummary};

use crate::error::HeadError;
use crate::http::AppState;

#[derive(Deserialize)]
pub struct NodeIdQuery {
    pub node_id: Option<String>,
}

#[derive(Serialize)]
pub struct ConfigDefaultsResponse {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub max_steps: u32,
    #[serde(rename = "supportedModels")]
    pub supported_models: Vec<String>,
    #[serde(rename = "refreshSeconds")]
    pub refresh_seconds: u64,
    #[serde(rename = "openaiBaseUrl", skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(rename = "leaveBrowserOpen")]
    pub leave_browser_open: bool,
    #[serde(rename = "reasoningEffortOptions")]
    pub reasoning_effort_options: Vec<String>,
    #[serde(rename = "reasoningEffortOptionsByModel")]
    pub reasoning_effort_options_by_model: std::collections::HashMap<String, Vec<String>>,
    #[serde(rename = "schedulingEnabled")]
    pub scheduling_enabled: bool,
    #[serde(rename = "scheduleCheckSeconds")]
    pub schedule_check_seconds: u64,
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

pub async fn config_defaults(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let d = &state.defaults;
    Json(ConfigDefaultsResponse {
        model: d.model.clone(),
        temperature: d.temperature,
        max_steps: d.max_steps,
        supported_models: d.supported_models.clone(),
        refresh_seconds: d.refresh_seconds,
        openai_base_url: d.openai_base_url.clone(),
        leave_browser_open: d.leave_browser_open,
        reasoning_effort_options: d.reasoning_effort_options.clone(),
        reasoning_effort_options_by_model: d.reasoning_effort_options_by_model.clone(),
        scheduling_enabled: d.scheduling_enabled,
        schedule_check_seconds: d.schedule_check_seconds,
        node_id: None,
        node_name: None,
    })
}

#[derive(Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<crate::registry::NodeOverview>,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enroll_token: Option<String>,
}

pub async fn list_nodes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let nodes = state.registry.overview().await;
    let enroll_token = state.enroll_token.lock().await.clone();
    Json(NodesResponse {
        nodes,
        public_key: state.keypair.public_key_pem(),
        enroll_token,
    })
}

#[derive(Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<TaskSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<NodeFanoutError>>,
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (tasks, errors) = state.registry.list_tasks().await;
    let errors = if errors.is_empty() { None } else { Some(errors) };
    Json(TasksResponse { tasks, errors })
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(mut spec): Json<TaskSpec>,
) -> Result<impl IntoResponse, HeadError> {
    spec.created_at = Utc::now();
    let record = state.registry.create_task(spec).await?;
    Ok(Json(record))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    let detail = state.registry.get_task(id, q.node_id.as_deref()).await?;
    Ok(Json(detail))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    state.registry.delete_task(id, q.node_id.as_deref()).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AssistBody {
    pub message: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

pub async fn assist_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AssistBody>,
) -> Result<impl IntoResponse, HeadError> {
    let record = state
        .registry
        .assist_task(id, body.node_id.as_deref(), body.message)
        .await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct ContinueBody {
    pub instructions: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

pub async fn continue_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ContinueBody>,
) -> Result<impl IntoResponse, HeadError> {
    let record = state
        .registry
        .continue_task(id, body.node_id.as_deref(), body.instructions)
        .await?;
    Ok(Json(record))
}

pub async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    state.registry.stop_task(id, q.node_id.as_deref()).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn run_now_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    state.registry.run_now(id, q.node_id.as_deref()).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ScheduleBody {
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub node_id: Option<String>,
}

pub async fn schedule_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleBody>,
) -> Result<impl IntoResponse, HeadError> {
    let record = state
        .registry
        .reschedule(id, body.node_id.as_deref(), body.when)
        .await?;
    Ok(Json(record))
}

pub async fn open_browser(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    let record = state.registry.open_browser(id, q.node_id.as_deref()).await?;
    Ok(Json(record))
}

pub async fn close_browser(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    let record = state.registry.close_browser(id, q.node_id.as_deref()).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct AdminVncResponse {
    pub vnc_launch_url: String,
}

pub async fn admin_vnc(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<NodeIdQuery>,
) -> Result<impl IntoResponse, HeadError> {
    let vnc_launch_url = state.registry.admin_vnc(id, q.node_id.as_deref()).await?;
    Ok(Json(AdminVncResponse { vnc_launch_url }))
}
