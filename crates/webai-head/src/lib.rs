// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Entry point for running a webai head: loads or generates the head's
//! signing key, builds the node registry from configuration, and serves
//! the public HTTP surface in [`http`].

pub mod error;
pub mod http;
pub mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use webai_config::HeadConfig;
use webai_crypto::HeadKeypair;

pub use error::HeadError;
pub use http::AppState;
pub use registry::NodeRegistry;

/// Directory the SPA's static build output is served from. Overridable in
/// tests; in production this is the directory shipped alongside the binary.
fn static_dir() -> PathBuf {
    std::env::var("WEBAI_HEAD_STATIC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"))
}

/// Runs a head to completion (i.e. until the process is killed). Builds
/// the node registry from a loaded [`HeadConfig`] and serves the HTTP API.
/// The head is unauthenticated at its own boundary — the operator fronts
/// it with TLS/ingress (§6) — so no TLS setup happens here, unlike the node.
pub async fn run(config: HeadConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.key_dir)?;
    let private_path = config.key_dir.join("head_private.pem");
    let public_path = config.key_dir.join("head_public.pem");
    let keypair = Arc::new(HeadKeypair::load_or_generate(&private_path, &public_path)?);
    info!(key_id = %keypair.key_id(), "head signing key ready");

    let registry = Arc::new(NodeRegistry::new(
        &config.nodes,
        keypair.clone(),
        Duration::from_secs(config.fanout_timeout_seconds),
    ));
    if registry.is_empty() {
        tracing::warn!("head started with no configured nodes (HEAD_NODES is empty)");
    }

    let state = Arc::new(AppState {
        registry,
        keypair,
        defaults: config.defaults.clone(),
        enroll_token: Mutex::new(config.enroll_token.clone()),
    });

    let app = http::router(state, &static_dir());
    let addr: std::net::SocketAddr = config
        .http
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid head http.bind {:?}: {e}", config.http.bind))?;

    info!(addr = %addr, nodes = config.nodes.len(), "head listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
