// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Append-only JSON-lines persistence shared by the steps and chat logs.
//! A write that is interrupted mid-line leaves a truncated final line;
//! `load` tolerates exactly that by dropping an unparseable last line. An
//! unparseable line anywhere else is a genuine corruption and propagates.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    writeln!(f, "{line}")?;
    f.sync_all()?;
    Ok(())
}

pub fn load_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<T>(line) {
            Ok(v) => out.push(v),
            Err(e) => {
                if i == lines.len() - 1 {
                    // Last line may be a partial write from a crash; drop it.
                    break;
                }
                return Err(StoreError::Corrupt(format!("line {i}: {e}")));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        n: u32,
    }

    #[test]
    fn append_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        for n in 0..5 {
            append_line(&path, &Rec { n }).unwrap();
        }
        let loaded: Vec<Rec> = load_lines(&path).unwrap();
        assert_eq!(loaded, (0..5).map(|n| Rec { n }).collect::<Vec<_>>());
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.jsonl");
        let loaded: Vec<Rec> = load_lines(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn truncated_last_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        append_line(&path, &Rec { n: 1 }).unwrap();
        append_line(&path, &Rec { n: 2 }).unwrap();
        // Simulate a crash mid-write of the third line.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "{{\"n\":3,\"partia").unwrap();

        let loaded: Vec<Rec> = load_lines(&path).unwrap();
        assert_eq!(loaded, vec![Rec { n: 1 }, Rec { n: 2 }]);
    }

    #[test]
    fn corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{\"n\":1}\nnot json\n{\"n\":3}\n").unwrap();
        let result: Result<Vec<Rec>, StoreError> = load_lines(&path);
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
