// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;
use webai_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::NotFound,
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::Io(msg) | StoreError::Corrupt(msg) => EngineError::Internal(msg),
        }
    }
}
