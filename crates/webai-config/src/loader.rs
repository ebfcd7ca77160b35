// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{HeadConfig, NodeConfig};

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones (§4.7): a system-wide file,
/// a user file under the XDG config home, a workspace-local file, then an
/// explicit `--config` path.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/webai/config.yaml"));
    paths.push(PathBuf::from("/etc/webai/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/webai/config.yaml"));
        paths.push(home.join(".config/webai/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("webai/config.yaml"));
        paths.push(cfg.join("webai/config.yml"));
    }

    paths.push(PathBuf::from(".webai/config.yaml"));
    paths.push(PathBuf::from(".webai/config.yml"));
    paths.push(PathBuf::from("webai.yaml"));
    paths.push(PathBuf::from("webai.yml"));

    paths
}

/// Merges every discovered YAML layer (plus an optional explicit path) into
/// a single `serde_yaml::Value`. Each layer overrides only the keys it sets.
fn merged_layers(extra: Option<&Path>) -> anyhow::Result<serde_yaml::Value> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    Ok(merged)
}

/// Deserializes the `section` key out of the merged document (e.g. `node:`
/// or `head:`). Falls back to treating the whole document as the section
/// when that key is absent, so a mode-specific file needs no nesting.
fn section<T: DeserializeOwned + Default>(
    merged: &serde_yaml::Value,
    section: &str,
) -> anyhow::Result<T> {
    if matches!(merged, serde_yaml::Value::Mapping(m) if m.is_empty()) {
        return Ok(T::default());
    }
    if let serde_yaml::Value::Mapping(m) = merged {
        if let Some(v) = m.get(serde_yaml::Value::String(section.to_string())) {
            return Ok(serde_yaml::from_value(v.clone())
                .with_context(|| format!("parsing `{section}` config section"))?);
        }
    }
    Ok(serde_yaml::from_value(merged.clone()).unwrap_or_default())
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Loads the node configuration: layered YAML, then environment overrides.
/// `load_node(None)` with no file present still yields a secure, loopback-
/// bound, auth-required configuration.
pub fn load_node(extra: Option<&Path>) -> anyhow::Result<NodeConfig> {
    let merged = merged_layers(extra)?;
    let mut cfg: NodeConfig = section(&merged, "node")?;
    cfg.apply_env();
    Ok(cfg)
}

/// Loads the head configuration: layered YAML, then environment overrides.
pub fn load_head(extra: Option<&Path>) -> anyhow::Result<HeadConfig> {
    let merged = merged_layers(extra)?;
    let mut cfg: HeadConfig = section(&merged, "head")?;
    cfg.apply_env();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("http:\n  bind: 127.0.0.1:1\n  tls_cert_dir: null");
        let src = val("http:\n  bind: 127.0.0.1:2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["http"]["bind"].as_str(), Some("127.0.0.1:2"));
    }

    #[test]
    fn load_node_returns_error_when_explicit_path_missing() {
        let result = load_node(Some(Path::new("/tmp/webai_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_node_with_no_extra_path_returns_secure_defaults() {
        // No search-path file exists in a clean test sandbox, and apply_env
        // leaves require_auth untouched when NODE_REQUIRE_AUTH is unset.
        std::env::remove_var("NODE_REQUIRE_AUTH");
        let cfg = load_node(None).unwrap();
        assert!(cfg.require_auth);
        assert!(cfg.http.bind.starts_with("127.0.0.1:"));
    }

    #[test]
    fn load_node_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "node:\n  http:\n    bind: 127.0.0.1:9999").unwrap();
        let cfg = load_node(Some(f.path())).unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:9999");
    }

    #[test]
    fn load_node_accepts_unnested_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "http:\n  bind: 127.0.0.1:7000").unwrap();
        let cfg = load_node(Some(f.path())).unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:7000");
    }

    #[test]
    fn load_head_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "head:\n  http:\n    bind: 127.0.0.1:8000").unwrap();
        let cfg = load_head(Some(f.path())).unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:8000");
    }
}
