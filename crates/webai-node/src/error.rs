// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use webai_config::ErrorCode;
use webai_crypto::EnvelopeError;
use webai_engine::EngineError;
use webai_vnc::VncError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("task not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("trust not configured")]
    TrustNotConfigured,

    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    fn code(&self) -> ErrorCode {
        match self {
            NodeError::NotFound => ErrorCode::NotFound,
            NodeError::Conflict(_) => ErrorCode::Conflict,
            NodeError::InvalidInput(_) => ErrorCode::InvalidInput,
            NodeError::Unauthorized(_) => ErrorCode::Unauthorized,
            NodeError::TrustNotConfigured => ErrorCode::TrustNotConfigured,
            NodeError::Internal(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: code.as_str(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<EngineError> for NodeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound => NodeError::NotFound,
            EngineError::Conflict(msg) => NodeError::Conflict(msg),
            EngineError::InvalidInput(msg) => NodeError::InvalidInput(msg),
            EngineError::Internal(msg) => NodeError::Internal(msg),
        }
    }
}

impl From<VncError> for NodeError {
    fn from(e: VncError) -> Self {
        match e {
            VncError::TokenMismatch => NodeError::Unauthorized("vnc token mismatch".into()),
            VncError::NotOpen => NodeError::Conflict("browser is not open".into()),
        }
    }
}

impl From<EnvelopeError> for NodeError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::TrustNotConfigured => NodeError::TrustNotConfigured,
            EnvelopeError::MissingKey => {
                NodeError::Unauthorized("unknown signing key".into())
            }
            EnvelopeError::BadSignature => NodeError::Unauthorized("bad signature".into()),
            EnvelopeError::Stale => NodeError::Unauthorized("request timestamp out of range".into()),
            EnvelopeError::Replayed => NodeError::Unauthorized("nonce replayed".into()),
            EnvelopeError::BodyMismatch => NodeError::Unauthorized("body hash mismatch".into()),
            EnvelopeError::BadMeta(msg) => NodeError::Unauthorized(format!("bad signature metadata: {msg}")),
        }
    }
}
