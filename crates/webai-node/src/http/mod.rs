// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The node's HTTP surface: the task API under `/api`, gated by the
//! signed envelope, and the token-gated `/vnc/{task_id}` WebSocket route.

pub mod auth;
pub mod routes;
pub mod tls;
pub mod vnc;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use webai_crypto::{NonceCache, TrustedKeyStore};
use webai_engine::TaskEngine;
use webai_vnc::VncBroker;

pub struct AppState {
    pub engine: Arc<TaskEngine>,
    pub vnc: Arc<VncBroker>,
    pub keys: Arc<TrustedKeyStore>,
    pub nonces: Arc<NonceCache>,
    pub require_auth: bool,
    pub max_steps_default: u32,
    pub node_id: String,
    pub node_name: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/tasks", post(routes::create_task).get(routes::list_tasks))
        .route("/api/tasks/:id", get(routes::get_task).delete(routes::delete_task))
        .route("/api/tasks/:id/assist", post(routes::assist_task))
        .route("/api/tasks/:id/continue", post(routes::continue_task))
        .route("/api/tasks/:id/stop", post(routes::stop_task))
        .route("/api/tasks/:id/run-now", post(routes::run_now_task))
        .route("/api/tasks/:id/schedule", post(routes::schedule_task))
        .route("/api/tasks/:id/open-browser", post(routes::open_browser))
        .route("/api/tasks/:id/close-browser", post(routes::close_browser))
        .route("/api/config/defaults", get(routes::config_defaults))
        .route("/vnc/:id", get(vnc::vnc_socket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
