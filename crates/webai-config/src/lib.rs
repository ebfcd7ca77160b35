// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod head_config;
mod loader;
mod node_config;
mod types;

pub use head_config::{HeadConfig, HeadDefaults, HeadHttpConfig, NodeEntry};
pub use loader::{load_head, load_node};
pub use node_config::{NodeConfig, NodeHttpConfig};
pub use types::*;
