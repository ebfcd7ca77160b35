// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_node_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_steps() -> u32 {
    50
}

fn default_schedule_check_seconds() -> u64 {
    5
}

fn default_vnc_port() -> u16 {
    5900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHttpConfig {
    #[serde(default = "default_node_bind")]
    pub bind: String,
    /// Directory holding (or to generate) this node's own TLS cert/key,
    /// for nodes that terminate TLS themselves rather than behind ingress.
    #[serde(default)]
    pub tls_cert_dir: Option<PathBuf>,
}

impl Default for NodeHttpConfig {
    fn default() -> Self {
        NodeHttpConfig {
            bind: default_node_bind(),
            tls_cert_dir: None,
        }
    }
}

/// Configuration for a single node process. Production-safe defaults:
/// auth is required, the HTTP bind is loopback-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub http: NodeHttpConfig,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    /// NODE_REQUIRE_AUTH. When true and no trusted head keys are loaded,
    /// every envelope-gated route returns `trust_not_configured` (503).
    #[serde(default = "default_true")]
    pub require_auth: bool,
    /// Paths to PEM/base64 key files, or literal base64-encoded key bytes,
    /// as listed in `HEAD_PUBLIC_KEYS`.
    #[serde(default)]
    pub head_public_keys: Vec<String>,
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_max_steps")]
    pub max_steps_default: u32,
    #[serde(default = "default_schedule_check_seconds")]
    pub schedule_check_seconds: u64,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    /// Local TCP port of the VNC server backing this node's browser
    /// sessions (§4.4). The VNC server itself is an external collaborator
    /// (out of scope per §1); this is just where the broker dials.
    #[serde(default = "default_vnc_port")]
    pub vnc_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            http: NodeHttpConfig::default(),
            node_id: None,
            node_name: None,
            require_auth: true,
            head_public_keys: Vec::new(),
            data_root: default_data_root(),
            max_steps_default: default_max_steps(),
            schedule_check_seconds: default_schedule_check_seconds(),
            openai_api_key: None,
            openai_base_url: None,
            vnc_port: default_vnc_port(),
        }
    }
}

impl NodeConfig {
    /// Apply environment-variable overrides (§6); env wins over file config
    /// so containerized deployments need no mounted file at all.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("APP_PORT") {
            self.http.bind = format!("127.0.0.1:{v}");
        }
        if let Ok(v) = std::env::var("NODE_ID") {
            self.node_id = Some(v);
        }
        if let Ok(v) = std::env::var("NODE_NAME") {
            self.node_name = Some(v);
        }
        if let Ok(v) = std::env::var("NODE_REQUIRE_AUTH") {
            self.require_auth = parse_bool(&v, self.require_auth);
        }
        if let Ok(v) = std::env::var("HEAD_PUBLIC_KEYS") {
            self.head_public_keys = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MAX_STEPS_DEFAULT") {
            if let Ok(n) = v.parse() {
                self.max_steps_default = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULE_CHECK_SECONDS") {
            if let Ok(n) = v.parse() {
                self.schedule_check_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.openai_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("VNC_PORT") {
            if let Ok(n) = v.parse() {
                self.vnc_port = n;
            }
        }
    }

    pub fn node_id(&self) -> String {
        self.node_id.clone().unwrap_or_else(|| "node-1".to_string())
    }

    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .unwrap_or_else(|| self.node_id())
    }
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_is_loopback() {
        let cfg = NodeConfig::default();
        assert!(cfg.http.bind.starts_with("127.0.0.1:"));
    }

    #[test]
    fn default_require_auth_is_true() {
        assert!(NodeConfig::default().require_auth);
    }

    #[test]
    fn node_config_yaml_round_trip() {
        let cfg = NodeConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.http.bind, cfg.http.bind);
        assert_eq!(back.require_auth, cfg.require_auth);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("YES", false));
        assert!(!parse_bool("false", true));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("garbage", true));
    }
}
