// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The per-task directory store (§2, §3, I7): `${data_root}/tasks/{id}/`
//! holds `record.json`, `steps.jsonl`, `chat.jsonl`, and an opaque
//! `browser/` profile directory. This is the sole source of truth on
//! restart — nothing here depends on in-memory state surviving a crash.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use webai_config::{ChatMessage, Step, TaskRecord};

use crate::error::StoreError;
use crate::jsonl;
use crate::record;

pub struct TaskStore {
    data_root: PathBuf,
    /// Per-task mutex guarding any non-append write to the record, handed
    /// out to the engine so record mutations serialize per task (§5).
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Presence of an id here means a runner is currently alive for that
    /// task; enforces the single-runner invariant (I1).
    running: DashMap<Uuid, ()>,
}

/// Held while a task's runner is alive. Dropping it (including on panic
/// or cancellation) frees the task for a future run. Owns an `Arc` back
/// to the store so it can be moved into a spawned `'static` task.
pub struct RunGuard {
    store: Arc<TaskStore>,
    id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.store.running.remove(&self.id);
    }
}

impl TaskStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_root = data_root.into();
        std::fs::create_dir_all(data_root.join("tasks"))?;
        Ok(TaskStore {
            data_root,
            locks: DashMap::new(),
            running: DashMap::new(),
        })
    }

    pub fn task_dir(&self, id: Uuid) -> PathBuf {
        self.data_root.join("tasks").join(id.to_string())
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.task_dir(id).join("record.json")
    }

    fn steps_path(&self, id: Uuid) -> PathBuf {
        self.task_dir(id).join("steps.jsonl")
    }

    fn chat_path(&self, id: Uuid) -> PathBuf {
        self.task_dir(id).join("chat.jsonl")
    }

    pub fn browser_dir(&self, id: Uuid) -> PathBuf {
        self.task_dir(id).join("browser")
    }

    pub fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.task_dir(record.id))?;
        self.save_record(record)
    }

    pub fn load_record(&self, id: Uuid) -> Result<TaskRecord, StoreError> {
        record::load_record(&self.record_path(id))
    }

    pub fn save_record(&self, record: &TaskRecord) -> Result<(), StoreError> {
        record::save_record(&self.record_path(record.id), record)
    }

    pub fn append_step(&self, id: Uuid, step: &Step) -> Result<(), StoreError> {
        jsonl::append_line(&self.steps_path(id), step)
    }

    pub fn load_steps(&self, id: Uuid) -> Result<Vec<Step>, StoreError> {
        jsonl::load_lines(&self.steps_path(id))
    }

    pub fn append_chat(&self, id: Uuid, message: &ChatMessage) -> Result<(), StoreError> {
        jsonl::append_line(&self.chat_path(id), message)
    }

    pub fn load_chat(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        jsonl::load_lines(&self.chat_path(id))
    }

    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let dir = self.task_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        self.locks.remove(&id);
        self.running.remove(&id);
        Ok(())
    }

    pub fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let tasks_dir = self.data_root.join("tasks");
        let mut ids = Vec::new();
        if !tasks_dir.exists() {
            return Ok(ids);
        }
        for entry in std::fs::read_dir(&tasks_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = Uuid::parse_str(name) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Per-task mutex for any non-append record mutation (§5 shared-
    /// resource policy).
    pub fn mutex(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Enforces (I1): at most one live runner per task. Returns a conflict
    /// error if a runner is already alive for `id`.
    pub fn try_begin_run(self: &Arc<Self>, id: Uuid) -> Result<RunGuard, StoreError> {
        match self.running.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::Conflict("task already running".into()))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(());
                Ok(RunGuard {
                    store: self.clone(),
                    id,
                })
            }
        }
    }

    pub fn is_running(&self, id: Uuid) -> bool {
        self.running.contains_key(&id)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}
