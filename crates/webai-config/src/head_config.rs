// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_head_bind() -> String {
    "127.0.0.1:8788".to_string()
}

fn default_key_dir() -> PathBuf {
    PathBuf::from("./keys")
}

fn default_fanout_timeout_seconds() -> u64 {
    5
}

fn default_model() -> String {
    "gpt-5".to_string()
}

fn default_max_steps() -> u32 {
    50
}

fn default_supported_models() -> Vec<String> {
    vec!["gpt-5".to_string(), "gpt-5-mini".to_string()]
}

fn default_refresh_seconds() -> u64 {
    5
}

fn default_reasoning_effort_options() -> Vec<String> {
    vec!["low".to_string(), "medium".to_string(), "high".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_schedule_check_seconds() -> u64 {
    5
}

/// UI-facing defaults the head serves at `GET /api/config/defaults` (§6).
/// These are operator-configured values, not mirrored from any one node —
/// the head has no per-node task state to derive them from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_supported_models")]
    pub supported_models: Vec<String>,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub leave_browser_open: bool,
    #[serde(default = "default_reasoning_effort_options")]
    pub reasoning_effort_options: Vec<String>,
    #[serde(default)]
    pub reasoning_effort_options_by_model: HashMap<String, Vec<String>>,
    #[serde(default = "default_true")]
    pub scheduling_enabled: bool,
    #[serde(default = "default_schedule_check_seconds")]
    pub schedule_check_seconds: u64,
}

impl Default for HeadDefaults {
    fn default() -> Self {
        HeadDefaults {
            model: default_model(),
            temperature: None,
            max_steps: default_max_steps(),
            supported_models: default_supported_models(),
            refresh_seconds: default_refresh_seconds(),
            openai_base_url: None,
            leave_browser_open: false,
            reasoning_effort_options: default_reasoning_effort_options(),
            reasoning_effort_options_by_model: HashMap::new(),
            scheduling_enabled: true,
            schedule_check_seconds: default_schedule_check_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadHttpConfig {
    #[serde(default = "default_head_bind")]
    pub bind: String,
}

impl Default for HeadHttpConfig {
    fn default() -> Self {
        HeadHttpConfig {
            bind: default_head_bind(),
        }
    }
}

/// A single configured node, as parsed from `HEAD_NODES=url|id[,url|id...]`
/// or from the `nodes:` config list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub url: String,
}

/// Configuration for the head process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadConfig {
    #[serde(default)]
    pub http: HeadHttpConfig,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    #[serde(default)]
    pub enroll_token: Option<String>,
    #[serde(default = "default_fanout_timeout_seconds")]
    pub fanout_timeout_seconds: u64,
    #[serde(default)]
    pub defaults: HeadDefaults,
}

impl Default for HeadConfig {
    fn default() -> Self {
        HeadConfig {
            http: HeadHttpConfig::default(),
            nodes: Vec::new(),
            key_dir: default_key_dir(),
            enroll_token: None,
            fanout_timeout_seconds: default_fanout_timeout_seconds(),
            defaults: HeadDefaults::default(),
        }
    }
}

impl HeadConfig {
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("HEAD_PORT") {
            self.http.bind = format!("127.0.0.1:{v}");
        }
        if let Ok(v) = std::env::var("HEAD_NODES") {
            self.nodes = parse_head_nodes(&v);
        }
        if let Ok(v) = std::env::var("HEAD_KEY_DIR") {
            self.key_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HEAD_ENROLL_TOKEN") {
            self.enroll_token = Some(v);
        }
    }
}

/// Parses `HEAD_NODES=url|id[,url|id...]`. An entry without an explicit
/// `|id` is assigned an ordinal id (`node-0`, `node-1`, ...).
fn parse_head_nodes(raw: &str) -> Vec<NodeEntry> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, entry)| match entry.split_once('|') {
            Some((url, id)) => NodeEntry {
                id: id.to_string(),
                url: url.to_string(),
            },
            None => NodeEntry {
                id: format!("node-{i}"),
                url: entry.to_string(),
            },
        })
        .collect()
}
