// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A typed, signed-envelope HTTP client for a node's task API (§6). This
//! is the only way the head talks to a node — every call is signed with
//! the head's Ed25519 key the way [`webai_crypto::envelope`] expects, and
//! every node-side failure surfaces as a [`NodeClientError`] rather than
//! a bare reqwest error, so callers can distinguish "node down" from
//! "node rejected this request".

mod error;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webai_config::{TaskDetail, TaskRecord, TaskSpec, TaskSummary};
use webai_crypto::HeadKeypair;

pub use error::NodeClientError;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDefaults {
    pub node_id: String,
    pub node_name: String,
    pub max_steps_default: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

pub struct NodeClient {
    base_url: String,
    keypair: Arc<HeadKeypair>,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(base_url: impl Into<String>, keypair: Arc<HeadKeypair>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        NodeClient {
            base_url,
            keypair,
            http: reqwest::Client::new(),
        }
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, NodeClientError> {
        let body_bytes = match body {
            Some(b) => serde_json::to_vec(b)?,
            None => Vec::new(),
        };

        let now = Utc::now();
        let nonce = Uuid::new_v4().to_string();
        let envelope = webai_crypto::sign(&self.keypair, method.as_str(), path, &body_bytes, nonce, now);

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .request(method, url)
            .header("x-webai-signature", envelope.signature_b64)
            .header("x-webai-sig-meta", envelope.meta_b64)
            .header("content-type", "application/json")
            .body(body_bytes)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let detail: Result<ErrorBody, _> = serde_json::from_slice(&bytes);
            return match detail {
                Ok(e) => Err(NodeClientError::Remote {
                    status: status.as_u16(),
                    code: e.error,
                    message: e.message,
                }),
                Err(_) => Err(NodeClientError::Remote {
                    status: status.as_u16(),
                    code: "unknown".into(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                }),
            };
        }

        if bytes.is_empty() {
            // Callers asking for `()` rely on this; any other `R` would
            // fail to deserialize from an empty body, which is correct.
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn create_task(&self, spec: &TaskSpec) -> Result<TaskRecord, NodeClientError> {
        self.call(reqwest::Method::POST, "/api/tasks", Some(spec)).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>, NodeClientError> {
        self.call::<(), _>(reqwest::Method::GET, "/api/tasks", None).await
    }

    pub async fn get_task(&self, id: Uuid) -> Result<TaskDetail, NodeClientError> {
        self.call::<(), _>(reqwest::Method::GET, &format!("/api/tasks/{id}"), None)
            .await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), NodeClientError> {
        self.call::<(), ()>(reqwest::Method::DELETE, &format!("/api/tasks/{id}"), None)
            .await
    }

    pub async fn assist_task(&self, id: Uuid, message: String) -> Result<TaskRecord, NodeClientError> {
        #[derive(Serialize)]
        struct Body {
            message: String,
        }
        self.call(
            reqwest::Method::POST,
            &format!("/api/tasks/{id}/assist"),
            Some(&Body { message }),
        )
        .await
    }

    pub async fn continue_task(
        &self,
        id: Uuid,
        instructions: String,
    ) -> Result<TaskRecord, NodeClientError> {
        #[derive(Serialize)]
        struct Body {
            instructions: String,
        }
        self.call(
            reqwest::Method::POST,
            &format!("/api/tasks/{id}/continue"),
            Some(&Body { instructions }),
        )
        .await
    }

    pub async fn stop_task(&self, id: Uuid) -> Result<(), NodeClientError> {
        self.call::<(), ()>(reqwest::Method::POST, &format!("/api/tasks/{id}/stop"), None)
            .await
    }

    pub async fn run_now(&self, id: Uuid) -> Result<(), NodeClientError> {
        self.call::<(), ()>(reqwest::Method::POST, &format!("/api/tasks/{id}/run-now"), None)
            .await
    }

    pub async fn reschedule(
        &self,
        id: Uuid,
        when: DateTime<Utc>,
    ) -> Result<TaskRecord, NodeClientError> {
        #[derive(Serialize)]
        struct Body {
            when: DateTime<Utc>,
        }
        self.call(
            reqwest::Method::POST,
            &format!("/api/tasks/{id}/schedule"),
            Some(&Body { when }),
        )
        .await
    }

    pub async fn open_browser(&self, id: Uuid) -> Result<TaskRecord, NodeClientError> {
        self.call::<(), _>(
            reqwest::Method::POST,
            &format!("/api/tasks/{id}/open-browser"),
            None,
        )
        .await
    }

    pub async fn close_browser(&self, id: Uuid) -> Result<TaskRecord, NodeClientError> {
        self.call::<(), _>(
            reqwest::Method::POST,
            &format!("/api/tasks/{id}/close-browser"),
            None,
        )
        .await
    }

    pub async fn config_defaults(&self) -> Result<ConfigDefaults, NodeClientError> {
        self.call::<(), _>(reqwest::Method::GET, "/api/config/defaults", None)
            .await
    }
}
