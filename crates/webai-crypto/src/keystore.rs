// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A node's set of trusted head public keys (§3, §4.1): loaded from
//! `HEAD_PUBLIC_KEYS` entries that are each either a path to a PEM file or
//! a literal SPKI PEM block. Reloadable on cache miss or an HUP-like
//! signal without restarting the process.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::VerifyingKey;
use tracing::{info, warn};

use crate::keypair::fingerprint;
use crate::CryptoError;

#[derive(Default)]
pub struct TrustedKeyStore {
    keys: RwLock<HashMap<String, VerifyingKey>>,
}

impl TrustedKeyStore {
    pub fn new() -> Self {
        TrustedKeyStore {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Loads every entry in `HEAD_PUBLIC_KEYS` (comma-split by the caller).
    /// Entries that fail to parse are logged and skipped rather than
    /// aborting the whole load — one bad entry should not disable trust
    /// for keys that did parse.
    pub fn load(entries: &[String]) -> Self {
        let store = Self::new();
        store.reload(entries);
        store
    }

    pub fn reload(&self, entries: &[String]) {
        let mut fresh = HashMap::new();
        for entry in entries {
            match load_one(entry) {
                Ok((key_id, vk)) => {
                    info!(key_id = %key_id, "loaded trusted head public key");
                    fresh.insert(key_id, vk);
                }
                Err(e) => warn!(entry = %entry, error = %e, "skipping unreadable trusted key entry"),
            }
        }
        *self.keys.write().unwrap() = fresh;
    }

    pub fn insert(&self, key_id: String, vk: VerifyingKey) {
        self.keys.write().unwrap().insert(key_id, vk);
    }

    pub fn get(&self, key_id: &str) -> Option<VerifyingKey> {
        self.keys.read().unwrap().get(key_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap().len()
    }
}

/// `entry` is either a path to a PEM file or a literal SPKI PEM block
/// (§4.1). The key id isn't carried in PEM, so it's always re-derived as
/// the key's [`fingerprint`].
fn load_one(entry: &str) -> Result<(String, VerifyingKey), CryptoError> {
    let path = std::path::Path::new(entry);
    let raw = if path.is_file() {
        std::fs::read_to_string(path).map_err(|e| CryptoError::Io(e.to_string()))?
    } else {
        entry.to_string()
    };

    let vk = VerifyingKey::from_public_key_pem(raw.trim())
        .map_err(|e| CryptoError::BadKey(format!("invalid SPKI PEM: {e}")))?;
    Ok((fingerprint(&vk), vk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadKeypair;

    #[test]
    fn empty_store_has_no_keys() {
        let store = TrustedKeyStore::new();
        assert!(store.is_empty());
    }

    #[test]
    fn load_from_literal_pem() {
        let kp = HeadKeypair::generate();
        let store = TrustedKeyStore::load(&[kp.public_key_pem()]);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fingerprint(&kp.verifying_key())).is_some());
    }

    #[test]
    fn load_from_public_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let priv_path = dir.path().join("p.pem");
        let pub_path = dir.path().join("pub.pem");
        let kp = HeadKeypair::generate_and_save(&priv_path, &pub_path).unwrap();

        let store = TrustedKeyStore::load(&[pub_path.to_string_lossy().to_string()]);
        assert_eq!(store.get(kp.key_id()).unwrap(), kp.verifying_key());
    }

    #[test]
    fn unreadable_entry_is_skipped_not_fatal() {
        let store = TrustedKeyStore::load(&["not a valid key at all".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn reload_replaces_previous_set() {
        let a = HeadKeypair::generate();
        let b = HeadKeypair::generate();
        let store = TrustedKeyStore::load(&[a.public_key_pem()]);
        assert_eq!(store.len(), 1);
        store.reload(&[b.public_key_pem()]);
        assert_eq!(store.len(), 1);
        assert!(store.get(a.key_id()).is_none());
        assert!(store.get(b.key_id()).is_some());
    }
}
