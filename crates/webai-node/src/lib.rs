// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Entry point for running a webai node: wires the task store, scheduler,
//! VNC broker, trust material, and task engine together behind the HTTP
//! surface in [`http`].

pub mod error;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;
use webai_config::NodeConfig;
use webai_crypto::{NonceCache, TrustedKeyStore};
use webai_engine::{MockAgentRunner, TaskEngine};
use webai_scheduler::Scheduler;
use webai_store::TaskStore;
use webai_vnc::VncBroker;

pub use error::NodeError;
pub use http::AppState;

/// Runs a node to completion (i.e. until the process is killed). Builds
/// the full stack from a loaded [`NodeConfig`] and serves the HTTP API,
/// with TLS if `http.tls_cert_dir` is set.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let store = Arc::new(TaskStore::new(&config.data_root)?);
    let (scheduler, due_rx) = Scheduler::new(Duration::from_secs(config.schedule_check_seconds));
    let scheduler = Arc::new(scheduler);
    let vnc = Arc::new(VncBroker::new());
    let keys = Arc::new(TrustedKeyStore::load(&config.head_public_keys));
    let nonces = Arc::new(NonceCache::default());

    // The agent runner is an external capability the rest of the system
    // does not assume anything about beyond the `AgentRunner` contract;
    // this build ships only the scripted mock, wired the same way any
    // future real driver would be.
    let runner: Arc<dyn webai_engine::AgentRunner> = Arc::new(MockAgentRunner::new(Vec::new()));

    let engine = TaskEngine::new(
        config.node_id(),
        store,
        scheduler,
        due_rx,
        vnc.clone(),
        runner,
        config.max_steps_default,
        config.vnc_port,
    );
    engine.recover().await?;

    let state = Arc::new(AppState {
        engine,
        vnc,
        keys,
        nonces,
        require_auth: config.require_auth,
        max_steps_default: config.max_steps_default,
        node_id: config.node_id(),
        node_name: config.node_name(),
    });

    let app = http::router(state);
    let addr: std::net::SocketAddr = config
        .http
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid node http.bind {:?}: {e}", config.http.bind))?;

    match &config.http.tls_cert_dir {
        Some(cert_dir) => {
            // Idempotent: multiple crypto backends can be linked in when run
            // alongside webai-head in `combined` mode, so rustls needs a
            // process-wide default told explicitly which one to use.
            let _ = rustls::crypto::ring::default_provider().install_default();
            let runtime = http::tls::load_or_generate(cert_dir)?;
            info!(
                addr = %addr,
                fingerprint = %runtime.fingerprint_sha256,
                "node listening (TLS)"
            );
            let tls_config =
                RustlsConfig::from_pem_file(&runtime.cert_path, &runtime.key_path).await?;
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(addr = %addr, "node listening (no TLS — local/dev use only)");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
