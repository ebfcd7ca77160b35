// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The VNC access route. Gated by a one-shot bearer token minted by
//! `open_browser`, not by the envelope scheme — the browser's own VNC
//! client speaks this, not the head, so there is no signing key to check.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::http::AppState;

#[derive(Deserialize)]
pub struct VncQuery {
    pub token: String,
}

/// Unlike the rest of the node surface, gating here is spelled out as raw
/// status codes (§6/§8 property 4) rather than the generic error taxonomy:
/// a bad or revoked token is 403, a task with no open browser is 404 — both
/// returned before the WebSocket upgrade, never after.
pub async fn vnc_socket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<VncQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.vnc.verify(id, &query.token).is_err() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let detail = match state.engine.get(id) {
        Ok(d) => d,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if !detail.record.browser_open {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(port) = detail.record.vnc_port else {
        return StatusCode::NOT_FOUND.into_response();
    };

    ws.on_upgrade(move |socket| async move {
        match webai_vnc::connect_local(port).await {
            Ok(backend) => webai_vnc::bridge(socket, backend).await,
            Err(e) => {
                tracing::warn!(%id, port, error = %e, "failed to connect to local VNC backend");
            }
        }
    })
}
