// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Atomic, restrictive-permission file writes for secret material. Same
//! discipline the reference stack applies to its bearer-token file: write
//! to a sibling temp file, fix permissions, then rename — never a
//! truncate-in-place write a crash could leave half-written.

use std::path::Path;

use crate::CryptoError;

/// Writes PEM (or any other secret text) with the private-key permission
/// discipline: mode 0600 on unix, never world-readable even transiently.
pub fn write_secret_pem(path: &Path, text: &str) -> Result<(), CryptoError> {
    write_secret_bytes(path, text.as_bytes())
}

/// Writes PEM (or any other non-secret text) world-readable, no special
/// permissions — this is the public half.
pub fn write_public_pem(path: &Path, text: &str) -> Result<(), CryptoError> {
    write_bytes(path, text.as_bytes())
}

fn write_secret_bytes(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CryptoError::Io(e.to_string()))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| CryptoError::Io(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| CryptoError::Io(e.to_string()))?;
    }

    std::fs::rename(&tmp, path).map_err(|e| CryptoError::Io(e.to_string()))?;
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CryptoError::Io(e.to_string()))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| CryptoError::Io(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| CryptoError::Io(e.to_string()))?;
    Ok(())
}
