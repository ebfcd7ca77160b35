// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Single-use enrollment (§4.1): lets a freshly-started node fetch and
//! trust the head's public key without an operator copying key material
//! by hand. The configured token is consumed on first successful use —
//! a second attempt with the same token gets `not_found`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::HeadError;
use crate::http::AppState;

#[derive(Deserialize)]
pub struct EnrollQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub key_id: String,
    pub public_key_pem: String,
}

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EnrollQuery>,
) -> Result<impl IntoResponse, HeadError> {
    let mut guard = state.enroll_token.lock().await;
    let expected = guard.as_ref().ok_or(HeadError::NotFound)?;

    if !webai_crypto::token_matches(&query.token, expected) {
        return Err(HeadError::NotFound);
    }
    *guard = None;

    Ok(Json(EnrollResponse {
        key_id: state.keypair.key_id().to_string(),
        public_key_pem: state.keypair.public_key_pem(),
    }))
}
