// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire and persistence types shared by every crate in the workspace:
//! the task record and its sub-documents, node descriptors, and the
//! error/terminal-reason taxonomies used to map domain failures onto
//! HTTP status codes at exactly one layer per surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task. See the state machine in the task engine docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    WaitingForInput,
    Completed,
    Failed,
    Stopped,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states permit only browser-session edits until delete (I5).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped | TaskStatus::Cancelled
        )
    }
}

/// Why a task run ended, when it did not end in plain `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    StepBudgetExceeded,
    NodeRestart,
    BrowserCrashed,
    Cancelled,
}

impl TerminalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalReason::StepBudgetExceeded => "step_budget_exceeded",
            TerminalReason::NodeRestart => "node_restart",
            TerminalReason::BrowserCrashed => "browser_crashed",
            TerminalReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surface-level error code, shared by both HTTP surfaces' `IntoResponse`
/// mapping. Keeping this in one place means the mapping from domain error
/// to wire code lives in exactly one spot per crate (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    Conflict,
    NotFound,
    Unauthorized,
    TrustNotConfigured,
    NodeUnreachable,
    Internal,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidInput => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::NodeUnreachable => 502,
            ErrorCode::TrustNotConfigured => 503,
            ErrorCode::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Conflict => "conflict",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::TrustNotConfigured => "trust_not_configured",
            ErrorCode::NodeUnreachable => "node_unreachable",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Pending assistance request blocking a task in `waiting_for_input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistance {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

/// Persisted per-task record — the authoritative state for everything
/// except the append-only steps/chat logs (I7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub node_id: String,
    pub title: String,
    pub instructions: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    pub max_steps: u32,
    pub leave_browser_open: bool,

    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub step_count: u32,
    pub browser_open: bool,
    pub needs_attention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistance: Option<Assistance>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnc_token: Option<String>,
    /// Local TCP port the node's VNC server listens on for this task's
    /// browser session. Node-internal; never serialized to the head/UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnc_port: Option<u16>,
}

impl TaskRecord {
    pub fn new(id: Uuid, node_id: impl Into<String>, spec: &TaskSpec) -> Self {
        let now = spec.created_at;
        let status = if spec.scheduled_for.is_some() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };
        TaskRecord {
            id,
            node_id: node_id.into(),
            title: spec.title.clone(),
            instructions: spec.instructions.clone(),
            model_name: spec.model_name.clone(),
            reasoning_effort: spec.reasoning_effort.clone(),
            max_steps: spec.max_steps,
            leave_browser_open: spec.leave_browser_open,
            status,
            scheduled_for: spec.scheduled_for,
            created_at: now,
            updated_at: now,
            step_count: 0,
            browser_open: false,
            needs_attention: false,
            last_error: None,
            assistance: None,
            vnc_token: None,
            vnc_port: None,
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            node_id: self.node_id.clone(),
            title: self.title.clone(),
            status: self.status,
            step_count: self.step_count,
            browser_open: self.browser_open,
            needs_attention: self.needs_attention,
            scheduled_for: self.scheduled_for,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Input to task creation, as received from the API (head or node-direct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub instructions: String,
    pub model_name: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    pub max_steps: u32,
    #[serde(default)]
    pub leave_browser_open: bool,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

/// One entry of the append-only steps log (I2). `step_number` is 1-based
/// and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One entry of the append-only chat log, totally ordered by append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Lightweight view returned by `list()` / head fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub node_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub step_count: u32,
    pub browser_open: bool,
    pub needs_attention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Full view returned by `get()`: record + logs + an optional launch URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    pub record: TaskRecord,
    pub steps: Vec<Step>,
    pub chat_history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnc_launch_url: Option<String>,
}

/// Node descriptor as tracked by the head. No mirrored task state lives
/// here — the head never migrates or duplicates task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Per-node error entry in a fan-out response; failures never cross-
/// contaminate other nodes' entries (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFanoutError {
    pub node_id: String,
    pub detail: String,
}
