// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::path::Path;

use clap::Parser;
use cli::{Cli, CombinedCommands, Commands, HeadCommands, NodeCommands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use webai_config::{HeadConfig, NodeConfig};

/// Invalid or unreadable configuration (§6).
const EXIT_INVALID_CONFIG: i32 = 2;
/// `require_auth` is set but no trusted head key loaded (§6).
const EXIT_MISSING_TRUST_MATERIAL: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }

        Commands::Node { command } => match command {
            NodeCommands::Start { config } => {
                let node_config = load_node_or_exit(config.as_deref());
                require_trust_material_or_exit(&node_config);
                webai_node::run(node_config).await
            }
            NodeCommands::ShowConfig { config } => {
                let node_config = load_node_or_exit(config.as_deref());
                print_yaml(&node_config)
            }
        },

        Commands::Head { command } => match command {
            HeadCommands::Start { config } => {
                let head_config = load_head_or_exit(config.as_deref());
                webai_head::run(head_config).await
            }
            HeadCommands::ShowConfig { config } => {
                let head_config = load_head_or_exit(config.as_deref());
                print_yaml(&head_config)
            }
        },

        Commands::Combined { command } => match command {
            CombinedCommands::Start { config } => {
                let node_config = load_node_or_exit(config.as_deref());
                require_trust_material_or_exit(&node_config);
                let mut head_config = load_head_or_exit(config.as_deref());
                wire_combined_head_at_node(&mut head_config, &node_config);
                run_combined(node_config, head_config).await
            }
        },
    }
}

/// Runs a node and a head side by side in this process. Either one exiting
/// (cleanly or with an error) tears down the pair rather than leaving an
/// orphaned half running.
async fn run_combined(node_config: NodeConfig, head_config: HeadConfig) -> anyhow::Result<()> {
    tokio::try_join!(webai_node::run(node_config), webai_head::run(head_config))?;
    Ok(())
}

/// If the operator left `head.nodes` empty in a combined config, point the
/// head at the node's own bind address. Combined mode never needs a node
/// list beyond "the node right here" — the only hop is loopback.
fn wire_combined_head_at_node(head_config: &mut HeadConfig, node_config: &NodeConfig) {
    if head_config.nodes.is_empty() {
        head_config.nodes.push(webai_config::NodeEntry {
            id: node_config.node_id(),
            url: format!("http://{}", node_config.http.bind),
        });
    }
}

fn load_node_or_exit(config: Option<&Path>) -> NodeConfig {
    match webai_config::load_node(config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: invalid node configuration: {e:#}");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    }
}

fn load_head_or_exit(config: Option<&Path>) -> HeadConfig {
    match webai_config::load_head(config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: invalid head configuration: {e:#}");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    }
}

/// `require_auth` with no trusted head key is a misconfigured node: every
/// envelope-gated route would simply 503 forever (§6). Catch it at startup
/// instead of letting the node come up looking healthy and silently useless.
fn require_trust_material_or_exit(config: &NodeConfig) {
    if !config.require_auth {
        return;
    }
    let keys = webai_crypto::TrustedKeyStore::load(&config.head_public_keys);
    if keys.is_empty() {
        eprintln!(
            "error: node.require_auth is true but no trusted head public key was loaded \
             (set HEAD_PUBLIC_KEYS, or node.require_auth: false for local/dev use)"
        );
        std::process::exit(EXIT_MISSING_TRUST_MATERIAL);
    }
}

fn print_yaml<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

/// Always logs to stderr; a long-running server process has no TUI to
/// protect, unlike the interactive agent CLI this workspace grew out of.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
