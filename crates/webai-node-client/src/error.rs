// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeClientError {
    #[error("request to node failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node returned {status} {code}: {message}")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },

    #[error("could not parse node response: {0}")]
    Decode(#[from] serde_json::Error),
}
