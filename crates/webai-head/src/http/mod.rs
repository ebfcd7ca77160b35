// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The head's public HTTP surface (§6): the UI-facing task/node API under
//! `/api`, an enrollment endpoint nodes can use to fetch the head's public
//! key on first contact, and the SPA's static assets. Unlike the node,
//! this surface is unauthenticated at the boundary — the operator is
//! expected to front it with TLS/ingress (§6).

pub mod enroll;
pub mod routes;
pub mod security;

use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use webai_config::HeadDefaults;
use webai_crypto::HeadKeypair;

use crate::registry::NodeRegistry;

pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub keypair: Arc<HeadKeypair>,
    pub defaults: HeadDefaults,
    /// Single-use; cleared the first time a node successfully enrolls.
    pub enroll_token: Mutex<Option<String>>,
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let api = Router::new()
        .route("/api/config/defaults", get(routes::config_defaults))
        .route("/api/nodes", get(routes::list_nodes))
        .route("/api/enroll", get(enroll::enroll))
        .route("/api/tasks", get(routes::list_tasks).post(routes::create_task))
        .route("/api/tasks/:id", get(routes::get_task).delete(routes::delete_task))
        .route("/api/tasks/:id/assist", post(routes::assist_task))
        .route("/api/tasks/:id/continue", post(routes::continue_task))
        .route("/api/tasks/:id/stop", post(routes::stop_task))
        .route("/api/tasks/:id/run-now", post(routes::run_now_task))
        .route("/api/tasks/:id/schedule", post(routes::schedule_task))
        .route("/api/tasks/:id/open-browser", post(routes::open_browser))
        .route("/api/tasks/:id/close-browser", post(routes::close_browser))
        .route("/api/tasks/:id/admin-vnc", post(routes::admin_vnc))
        .with_state(state);

    // Any path not matched above falls through to the SPA's `index.html`
    // so client-side routing works on a hard refresh or deep link.
    let spa = ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .merge(api)
        .fallback_service(spa)
        .layer(axum::middleware::from_fn(security::security_headers))
        .layer(axum::middleware::from_fn(security::csrf_guard))
        .layer(TraceLayer::new_for_http())
}
