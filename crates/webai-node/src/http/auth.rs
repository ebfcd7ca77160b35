// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Envelope verification for the node's task API. Mirrors the gateway's
//! Slack-signature pattern: the handler reads the raw body and headers
//! itself and verifies before touching anything, rather than running
//! verification as an opaque middleware layer that the handler can't see.

use axum::http::{HeaderMap, Method, Uri};
use chrono::Utc;

use crate::error::NodeError;
use crate::http::AppState;

const SIGNATURE_HEADER: &str = "x-webai-signature";
const SIG_META_HEADER: &str = "x-webai-sig-meta";

pub fn verify_envelope(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), NodeError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let meta = headers
        .get(SIG_META_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    webai_crypto::verify(
        &state.keys,
        &state.nonces,
        state.require_auth,
        method.as_str(),
        path_and_query,
        body,
        signature,
        meta,
        Utc::now(),
    )
    .map_err(NodeError::from)
}
