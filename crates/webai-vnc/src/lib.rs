// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod broker;
mod error;
mod proxy;

pub use broker::VncBroker;
pub use error::VncError;
pub use proxy::{bridge, connect_local};
