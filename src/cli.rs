// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// `webai node` subcommands.
#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Start the node: task engine, HTTP API, scheduler, and VNC broker.
    ///
    /// Binds loopback-only by default. Requires at least one trusted head
    /// public key in `HEAD_PUBLIC_KEYS` / `node.head_public_keys` unless
    /// `NODE_REQUIRE_AUTH=false` is explicitly set.
    Start {
        /// Path to the node config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the effective node configuration and exit.
    ShowConfig {
        /// Path to the node config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// `webai head` subcommands.
#[derive(Subcommand, Debug)]
pub enum HeadCommands {
    /// Start the head: node registry, fan-out router, and the public UI API.
    ///
    /// Unauthenticated at its own boundary (§6) — front it with TLS/ingress.
    /// Generates a signing keypair on first run under `head.key_dir`.
    Start {
        /// Path to the head config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the effective head configuration and exit.
    ShowConfig {
        /// Path to the head config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// `webai combined` subcommands.
#[derive(Subcommand, Debug)]
pub enum CombinedCommands {
    /// Start a head and a node in the same process.
    ///
    /// Reads both the `node:` and `head:` sections from the same config
    /// file. If `head.nodes` is left empty, the head is wired straight at
    /// this node's own bind address so the collocated pair never leaves
    /// loopback.
    Start {
        /// Path to the combined config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "webai",
    about = "Distributed control plane and per-node task engine for AI-driven browser automation",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v = debug, -vv = trace). Respects RUST_LOG if set.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Node: owns task state, browsers, schedules, and VNC access.
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Head: fleet-wide UI/API router with envelope signing and fan-out.
    Head {
        #[command(subcommand)]
        command: HeadCommands,
    },

    /// Run a head and a node together in a single process.
    Combined {
        #[command(subcommand)]
        command: CombinedCommands,
    },

    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "webai", &mut std::io::stdout());
}
