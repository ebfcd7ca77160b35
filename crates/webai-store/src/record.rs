// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Atomic record persistence (§4.2, §8 property 8): every mutation is
//! written to a sibling temp file, fsynced, then renamed over the live
//! file, so interrupting a write at any byte leaves either the old or the
//! new valid JSON on disk — never a partial one.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use webai_config::TaskRecord;

use crate::error::StoreError;

pub fn load_record(path: &Path) -> Result<TaskRecord, StoreError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub fn save_record(path: &Path, record: &TaskRecord) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = File::create(&tmp)?;
        let text = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
