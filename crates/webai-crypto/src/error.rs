// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid key material: {0}")]
    BadKey(String),
}

/// Reasons an envelope fails verification (§4.1, §8 property 3). Kept
/// distinct from the HTTP-facing `ErrorCode` so the node's HTTP layer can
/// decide, in one place, which ones map to 401 vs 503.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("no trusted key for this key id")]
    MissingKey,
    #[error("signature verification failed")]
    BadSignature,
    #[error("timestamp outside acceptable clock skew")]
    Stale,
    #[error("nonce already used within the replay window")]
    Replayed,
    #[error("malformed envelope metadata: {0}")]
    BadMeta(String),
    #[error("body hash does not match signed envelope")]
    BodyMismatch,
    #[error("no trusted keys configured")]
    TrustNotConfigured,
}
