// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deferred-start scheduler (§4.3): a single cooperative timer per node
//! maintains a min-heap keyed by `scheduled_for`. There is exactly one
//! due instant per task — never a recurring cron expression — so this is
//! a plain binary heap with lazy deletion, not a cron-expression engine.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// A scheduler entry. Ordered only by `when` so the heap behaves as a
/// min-heap over due instants regardless of `id`/`generation`.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Entry {
    when: DateTime<Utc>,
    id: Uuid,
    generation: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.when.cmp(&other.when)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Current generation per scheduled task id. Absence means the task
    /// is not currently scheduled (cancelled, or already promoted).
    generations: HashMap<Uuid, u64>,
}

/// Promotes due tasks to the `due` channel. The receiver half is owned by
/// the task engine, which submits the task id into the ready queue.
pub struct Scheduler {
    inner: Mutex<Inner>,
    due_tx: mpsc::UnboundedSender<Uuid>,
    check_interval: StdDuration,
}

impl Scheduler {
    pub fn new(check_interval: StdDuration) -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        (
            Scheduler {
                inner: Mutex::new(Inner {
                    heap: BinaryHeap::new(),
                    generations: HashMap::new(),
                }),
                due_tx,
                check_interval,
            },
            due_rx,
        )
    }

    /// Schedules `id` to become due at `when`. A second call for the same
    /// `id` supersedes the first (used by `reschedule`).
    pub fn schedule(&self, id: Uuid, when: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let generation = inner.generations.entry(id).or_insert(0);
        *generation += 1;
        let generation = *generation;
        inner.heap.push(Reverse(Entry { when, id, generation }));
        debug!(%id, %when, "task scheduled");
    }

    pub fn reschedule(&self, id: Uuid, when: DateTime<Utc>) {
        self.schedule(id, when);
    }

    /// Cancels a pending schedule; any already-queued heap entry becomes
    /// stale and is discarded at pop time.
    pub fn cancel(&self, id: Uuid) {
        self.inner.lock().unwrap().generations.remove(&id);
    }

    /// Removes the heap entry and submits `id` immediately.
    pub fn run_now(&self, id: Uuid) {
        self.inner.lock().unwrap().generations.remove(&id);
        let _ = self.due_tx.send(id);
    }

    fn pop_due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let mut due = Vec::new();
        loop {
            let is_due = matches!(inner.heap.peek(), Some(Reverse(e)) if e.when <= now);
            if !is_due {
                break;
            }
            let Reverse(entry) = inner.heap.pop().unwrap();
            match inner.generations.get(&entry.id) {
                Some(g) if *g == entry.generation => {
                    inner.generations.remove(&entry.id);
                    due.push(entry.id);
                }
                _ => {
                    // Stale entry: superseded by reschedule/cancel/run_now.
                    continue;
                }
            }
        }
        due
    }

    /// Spawns the cooperative timer loop. The returned handle may be
    /// aborted on shutdown.
    pub fn spawn(self: std::sync::Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            loop {
                ticker.tick().await;
                let due = self.pop_due(Utc::now());
                for id in due {
                    info!(%id, "scheduled task is due");
                    let _ = self.due_tx.send(id);
                }
            }
        })
    }
}
