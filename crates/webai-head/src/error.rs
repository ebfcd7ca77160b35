// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use webai_config::ErrorCode;
use webai_node_client::NodeClientError;

#[derive(Debug, Error)]
pub enum HeadError {
    #[error("no such node")]
    NodeNotFound,

    #[error("task not found on any node")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no node reachable: {0}")]
    NodeUnreachable(String),

    /// A single-node direct routing failure is surfaced as the node's own
    /// status (§7 propagation policy) rather than remapped to a head code.
    #[error("node returned {status} {code}: {message}")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl HeadError {
    fn code(&self) -> ErrorCode {
        match self {
            HeadError::NodeNotFound | HeadError::NotFound => ErrorCode::NotFound,
            HeadError::InvalidInput(_) => ErrorCode::InvalidInput,
            HeadError::Conflict(_) => ErrorCode::Conflict,
            HeadError::NodeUnreachable(_) => ErrorCode::NodeUnreachable,
            HeadError::Remote { .. } => ErrorCode::Internal,
            HeadError::Internal(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for HeadError {
    fn into_response(self) -> Response {
        if let HeadError::Remote { status, code, message } = &self {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = ErrorBody {
                error: code.clone(),
                message: message.clone(),
            };
            return (status, axum::Json(body)).into_response();
        }
        let code = self.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: code.as_str().to_string(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<NodeClientError> for HeadError {
    fn from(e: NodeClientError) -> Self {
        match e {
            NodeClientError::Http(err) => HeadError::NodeUnreachable(err.to_string()),
            NodeClientError::Remote { status, code, message } => {
                HeadError::Remote { status, code, message }
            }
            NodeClientError::Decode(err) => {
                HeadError::Internal(format!("could not decode node response: {err}"))
            }
        }
    }
}
