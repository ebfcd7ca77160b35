// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-task VNC token mint/revoke (§4.4). Tokens are 128-bit random,
//! URL-safe, and rotated on each browser open; the previous token is
//! invalidated the instant a new one is minted. Tokens never appear in
//! logs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use uuid::Uuid;

use crate::error::VncError;

#[derive(Default)]
pub struct VncBroker {
    tokens: DashMap<Uuid, String>,
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl VncBroker {
    pub fn new() -> Self {
        VncBroker::default()
    }

    /// Rotates the token for `id`; any previously issued token stops
    /// admitting the WebSocket immediately.
    pub fn mint(&self, id: Uuid) -> String {
        let token = random_token();
        self.tokens.insert(id, token.clone());
        token
    }

    /// Revokes the live token for `id` (browser closed, task deleted).
    pub fn revoke(&self, id: Uuid) {
        self.tokens.remove(&id);
    }

    pub fn launch_url(id: Uuid, token: &str) -> String {
        format!("/vnc/{id}?token={token}")
    }

    /// Verifies `(id, token)` against the live mapping. Any mismatch
    /// (unknown task, wrong token, or revoked token) fails closed.
    pub fn verify(&self, id: Uuid, token: &str) -> Result<(), VncError> {
        match self.tokens.get(&id) {
            Some(live) if live.as_str() == token => Ok(()),
            _ => Err(VncError::TokenMismatch),
        }
    }

    pub fn current_token(&self, id: Uuid) -> Option<String> {
        self.tokens.get(&id).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_succeeds() {
        let broker = VncBroker::new();
        let id = Uuid::new_v4();
        let token = broker.mint(id);
        assert!(broker.verify(id, &token).is_ok());
    }

    #[test]
    fn wrong_token_is_rejected() {
        let broker = VncBroker::new();
        let id = Uuid::new_v4();
        broker.mint(id);
        assert_eq!(broker.verify(id, "wrong"), Err(VncError::TokenMismatch));
    }

    #[test]
    fn unknown_task_is_rejected() {
        let broker = VncBroker::new();
        assert_eq!(
            broker.verify(Uuid::new_v4(), "anything"),
            Err(VncError::TokenMismatch)
        );
    }

    #[test]
    fn remint_invalidates_previous_token() {
        let broker = VncBroker::new();
        let id = Uuid::new_v4();
        let first = broker.mint(id);
        let second = broker.mint(id);
        assert_ne!(first, second);
        assert_eq!(broker.verify(id, &first), Err(VncError::TokenMismatch));
        assert!(broker.verify(id, &second).is_ok());
    }

    #[test]
    fn revoke_invalidates_token() {
        let broker = VncBroker::new();
        let id = Uuid::new_v4();
        let token = broker.mint(id);
        broker.revoke(id);
        assert_eq!(broker.verify(id, &token), Err(VncError::TokenMismatch));
    }

    #[test]
    fn two_mints_produce_different_tokens() {
        let broker = VncBroker::new();
        let a = broker.mint(Uuid::new_v4());
        let b = broker.mint(Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn launch_url_has_expected_shape() {
        let id = Uuid::new_v4();
        let url = VncBroker::launch_url(id, "tok123");
        assert_eq!(url, format!("/vnc/{id}?token=tok123"));
    }
}
