// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The node's task API (§6 Node HTTP surface). Every handler re-verifies
//! the signed envelope itself against the raw body before deserializing
//! anything, rather than trusting a middleware layer to have done it —
//! same shape as the gateway's Slack webhook handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use webai_config::TaskSpec;

use crate::error::NodeError;
use crate::http::{auth::verify_envelope, AppState};

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, NodeError> {
    if body.is_empty() {
        return serde_json::from_slice(b"{}").map_err(|e| NodeError::InvalidInput(e.to_string()));
    }
    serde_json::from_slice(body).map_err(|e| NodeError::InvalidInput(e.to_string()))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let spec: TaskSpec = parse_body(&body)?;
    let record = state.engine.create(spec).await?;
    Ok(Json(record))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    Ok(Json(state.engine.list()?))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    Ok(Json(state.engine.get(id)?))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    state.engine.delete(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AssistBody {
    pub message: String,
}

pub async fn assist_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let payload: AssistBody = parse_body(&body)?;
    let record = state.engine.assist(id, payload.message).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct ContinueBody {
    pub instructions: String,
}

pub async fn continue_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let payload: ContinueBody = parse_body(&body)?;
    let record = state.engine.continue_task(id, payload.instructions).await?;
    Ok(Json(record))
}

pub async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    state.engine.stop(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn run_now_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    state.engine.run_now(id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ScheduleBody {
    pub when: DateTime<Utc>,
}

pub async fn schedule_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let payload: ScheduleBody = parse_body(&body)?;
    let record = state.engine.reschedule(id, payload.when)?;
    Ok(Json(record))
}

pub async fn open_browser(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let record = state.engine.open_browser(id).await?;
    Ok(Json(record))
}

pub async fn close_browser(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    let record = state.engine.close_browser(id).await?;
    Ok(Json(record))
}

#[derive(serde::Serialize)]
pub struct ConfigDefaults {
    pub node_id: String,
    pub node_name: String,
    pub max_steps_default: u32,
}

pub async fn config_defaults(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, NodeError> {
    verify_envelope(&state, &method, &uri, &headers, &body)?;
    Ok(Json(ConfigDefaults {
        node_id: state.node_id.clone(),
        node_name: state.node_name.clone(),
        max_steps_default: state.max_steps_default,
    }))
}
