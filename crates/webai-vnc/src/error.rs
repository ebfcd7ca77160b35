// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VncError {
    #[error("token mismatch or revoked")]
    TokenMismatch,
    #[error("task has no open browser session")]
    NotOpen,
}
