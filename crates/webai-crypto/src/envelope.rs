// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The signed request envelope (§4.1, §6): binds method, path+query, body
//! hash, a monotonic nonce, a UTC timestamp, and the signing key id into
//! one canonical string, which is Ed25519-signed. Carried as two headers:
//! `X-WebAI-Signature: base64(ed25519(canonical))` and
//! `X-WebAI-Sig-Meta: base64url(json({ts, nonce, key_id, body_sha256}))`.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::keypair::{decode_b64, encode_b64};
use crate::keystore::TrustedKeyStore;
use crate::replay::NonceCache;
use crate::{EnvelopeError, HeadKeypair};

/// Default clock-skew tolerance, in seconds (§4.1, §9 resolved).
pub const DEFAULT_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub ts: DateTime<Utc>,
    pub nonce: String,
    pub key_id: String,
    pub body_sha256: String,
}

pub fn sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// `METHOD\nPATH_AND_QUERY\nBODY_SHA256\nTS\nNONCE\nKEY_ID`.
fn canonical_string(method: &str, path_and_query: &str, meta: &EnvelopeMeta) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path_and_query,
        meta.body_sha256,
        meta.ts.to_rfc3339(),
        meta.nonce,
        meta.key_id
    )
}

/// A signed envelope ready to attach as the two HTTP headers.
pub struct SignedEnvelope {
    pub signature_b64: String,
    pub meta_b64: String,
}

/// Signs a request. `nonce` should be a fresh random value per call
/// (callers typically use a UUID v4).
pub fn sign(
    keypair: &HeadKeypair,
    method: &str,
    path_and_query: &str,
    body: &[u8],
    nonce: String,
    now: DateTime<Utc>,
) -> SignedEnvelope {
    let meta = EnvelopeMeta {
        ts: now,
        nonce,
        key_id: keypair.key_id().to_string(),
        body_sha256: sha256_hex(body),
    };
    let canonical = canonical_string(method, path_and_query, &meta);
    let signature: Signature = keypair.sign(canonical.as_bytes());

    let meta_json = serde_json::to_vec(&meta).expect("EnvelopeMeta serializes");
    SignedEnvelope {
        signature_b64: encode_b64(&signature.to_bytes()),
        meta_b64: encode_b64(&meta_json),
    }
}

/// Verifies a request envelope against the node's trusted key set,
/// applying the acceptance rules in §4.1 in order: unknown key id, body
/// hash mismatch, clock skew, nonce replay, then the signature itself.
#[allow(clippy::too_many_arguments)]
pub fn verify(
    keys: &TrustedKeyStore,
    nonces: &NonceCache,
    require_auth: bool,
    method: &str,
    path_and_query: &str,
    body: &[u8],
    signature_b64: &str,
    meta_b64: &str,
    now: DateTime<Utc>,
) -> Result<(), EnvelopeError> {
    if !require_auth && keys.is_empty() {
        return Ok(());
    }
    if keys.is_empty() {
        return Err(EnvelopeError::TrustNotConfigured);
    }

    let meta_json =
        decode_b64(meta_b64).map_err(|e| EnvelopeError::BadMeta(e.to_string()))?;
    let meta: EnvelopeMeta = serde_json::from_slice(&meta_json)
        .map_err(|e| EnvelopeError::BadMeta(e.to_string()))?;

    let verifying_key = keys.get(&meta.key_id).ok_or(EnvelopeError::MissingKey)?;

    let actual_hash = sha256_hex(body);
    if actual_hash != meta.body_sha256 {
        return Err(EnvelopeError::BodyMismatch);
    }

    if (now - meta.ts).num_seconds().abs() > DEFAULT_SKEW_SECONDS {
        return Err(EnvelopeError::Stale);
    }

    if !nonces.check_and_record(&meta.key_id, &meta.nonce, now) {
        return Err(EnvelopeError::Replayed);
    }

    let sig_bytes = decode_b64(signature_b64).map_err(|e| EnvelopeError::BadMeta(e.to_string()))?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| EnvelopeError::BadSignature)?;
    let signature = Signature::from_bytes(&sig_arr);

    let canonical = canonical_string(method, path_and_query, &meta);
    verifying_key
        .verify(canonical.as_bytes(), &signature)
        .map_err(|_| EnvelopeError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make() -> (HeadKeypair, TrustedKeyStore, NonceCache) {
        let kp = HeadKeypair::generate();
        let store = TrustedKeyStore::load(&[kp.public_key_pem()]);
        let nonces = NonceCache::default();
        (kp, store, nonces)
    }

    #[test]
    fn valid_envelope_verifies() {
        let (kp, store, nonces) = make();
        let now = Utc::now();
        let body = br#"{"title":"t"}"#;
        let env = sign(&kp, "POST", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        assert!(verify(
            &store, &nonces, true, "POST", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now
        )
        .is_ok());
    }

    #[test]
    fn altered_body_fails() {
        let (kp, store, nonces) = make();
        let now = Utc::now();
        let body = b"original";
        let env = sign(&kp, "POST", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        let tampered = b"tampered!";
        let err = verify(
            &store, &nonces, true, "POST", "/api/tasks", tampered,
            &env.signature_b64, &env.meta_b64, now,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::BodyMismatch);
    }

    #[test]
    fn altered_path_fails() {
        let (kp, store, nonces) = make();
        let now = Utc::now();
        let body = b"x";
        let env = sign(&kp, "GET", "/api/tasks/1", body, Uuid::new_v4().to_string(), now);
        let err = verify(
            &store, &nonces, true, "GET", "/api/tasks/2", body,
            &env.signature_b64, &env.meta_b64, now,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::BadSignature);
    }

    #[test]
    fn reused_nonce_within_window_fails() {
        let (kp, store, nonces) = make();
        let now = Utc::now();
        let body = b"x";
        let nonce = Uuid::new_v4().to_string();
        let env = sign(&kp, "GET", "/api/tasks", body, nonce, now);
        assert!(verify(
            &store, &nonces, true, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now
        )
        .is_ok());
        let err = verify(
            &store, &nonces, true, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now + chrono::Duration::seconds(10),
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::Replayed);
    }

    #[test]
    fn timestamp_outside_skew_fails() {
        let (kp, store, nonces) = make();
        let now = Utc::now();
        let body = b"x";
        let env = sign(&kp, "GET", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        let later = now + chrono::Duration::seconds(DEFAULT_SKEW_SECONDS + 5);
        let err = verify(
            &store, &nonces, true, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, later,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::Stale);
    }

    #[test]
    fn unknown_key_id_fails() {
        let (kp, store, nonces) = make();
        let other = HeadKeypair::generate();
        let now = Utc::now();
        let body = b"x";
        let env = sign(&other, "GET", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        let _ = &kp; // only `other` signed; store only trusts `kp`
        let err = verify(
            &store, &nonces, true, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::MissingKey);
    }

    #[test]
    fn no_trusted_keys_and_auth_required_is_trust_not_configured() {
        let store = TrustedKeyStore::new();
        let nonces = NonceCache::default();
        let kp = HeadKeypair::generate();
        let now = Utc::now();
        let body = b"x";
        let env = sign(&kp, "GET", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        let err = verify(
            &store, &nonces, true, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::TrustNotConfigured);
    }

    #[test]
    fn no_trusted_keys_and_auth_not_required_passes() {
        let store = TrustedKeyStore::new();
        let nonces = NonceCache::default();
        let kp = HeadKeypair::generate();
        let now = Utc::now();
        let body = b"x";
        let env = sign(&kp, "GET", "/api/tasks", body, Uuid::new_v4().to_string(), now);
        assert!(verify(
            &store, &nonces, false, "GET", "/api/tasks", body,
            &env.signature_b64, &env.meta_b64, now,
        )
        .is_ok());
    }
}
