// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The task lifecycle engine (§4.2): the state machine in a box, run on
//! top of [`webai_store::TaskStore`] for persistence, [`webai_scheduler::Scheduler`]
//! for deferred start, and [`webai_vnc::VncBroker`] for the browser access
//! token. The engine never talks to a real browser or AI model — it only
//! reacts to [`RunnerEvent`]s emitted by whatever [`AgentRunner`] it is
//! constructed with.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use webai_config::{Assistance, ChatMessage, ChatRole, Step, TaskDetail, TaskRecord, TaskSpec, TaskStatus, TaskSummary};
use webai_scheduler::Scheduler;
use webai_store::TaskStore;
use webai_vnc::VncBroker;

use crate::error::EngineError;
use crate::runner::{AgentRunner, Outcome, RunnerEvent, RunnerHandle};

/// Bounded deadline the engine waits for a runner to exit cooperatively
/// before it considers `delete`/`stop` to have forced termination (§5).
const SHUTDOWN_DEADLINE: StdDuration = StdDuration::from_secs(15);

/// State tracked for a task whose runner is currently alive. Held outside
/// the persisted record because it is pure in-process coordination state
/// that does not survive a restart (§4.2 crash recovery already accounts
/// for that by failing such tasks with `node_restart`).
struct ActiveRun {
    handle: RunnerHandle,
    /// Set by `stop`/`delete` before cancelling, so the event loop can
    /// distinguish an operator-requested stop from a crashed runner when
    /// the event channel closes without a `Finished` event.
    stop_requested: Arc<std::sync::atomic::AtomicBool>,
}

pub struct TaskEngine {
    node_id: String,
    store: Arc<TaskStore>,
    scheduler: Arc<Scheduler>,
    vnc: Arc<VncBroker>,
    runner: Arc<dyn AgentRunner>,
    max_steps_default: u32,
    vnc_port: u16,
    active: DashMap<Uuid, ActiveRun>,
    /// The answer a blocked runner is waiting on, handed to it by `assist`.
    pending_assist: DashMap<Uuid, oneshot::Sender<String>>,
}

impl TaskEngine {
    /// Constructs the engine and spawns the scheduler's due-task consumer.
    /// Callers must also invoke [`TaskEngine::recover`] once at startup,
    /// before serving requests, to apply the crash-recovery rules (§4.2).
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<TaskStore>,
        scheduler: Arc<Scheduler>,
        due_rx: mpsc::UnboundedReceiver<Uuid>,
        vnc: Arc<VncBroker>,
        runner: Arc<dyn AgentRunner>,
        max_steps_default: u32,
        vnc_port: u16,
    ) -> Arc<Self> {
        let engine = Arc::new(TaskEngine {
            node_id: node_id.into(),
            store,
            scheduler,
            vnc,
            runner,
            max_steps_default,
            vnc_port,
            active: DashMap::new(),
            pending_assist: DashMap::new(),
        });
        engine.scheduler.clone().spawn();
        engine.clone().spawn_due_consumer(due_rx);
        engine
    }

    fn spawn_due_consumer(self: Arc<Self>, mut due_rx: mpsc::UnboundedReceiver<Uuid>) {
        tokio::spawn(async move {
            while let Some(id) = due_rx.recv().await {
                if let Err(e) = self.promote_due(id).await {
                    warn!(%id, error = %e, "failed to promote due task");
                }
            }
        });
    }

    async fn promote_due(&self, id: Uuid) -> Result<(), EngineError> {
        let mutex = self.store.mutex(id);
        let _guard = mutex.lock().await;
        let mut record = self.store.load_record(id)?;
        if record.status != TaskStatus::Scheduled {
            // Superseded (e.g. deleted) between scheduling and firing.
            return Ok(());
        }
        record.status = TaskStatus::Pending;
        record.scheduled_for = None;
        record.updated_at = Utc::now();
        self.store.save_record(&record)?;
        drop(_guard);
        self.submit_run(id).await
    }

    // ── Crash recovery (§4.2) ────────────────────────────────────────────

    /// Scans the data root and applies the crash-recovery rules: tasks
    /// that had no durable runner state are failed with `node_restart`;
    /// scheduled tasks are re-enqueued; any `browser_open` flag left set
    /// is reset, since the browser process never survives a restart.
    pub async fn recover(&self) -> Result<(), EngineError> {
        for id in self.store.list_ids()? {
            let mut record = match self.store.load_record(id) {
                Ok(r) => r,
                Err(e) => {
                    warn!(%id, error = %e, "skipping unreadable task record during recovery");
                    continue;
                }
            };
            let mut changed = false;

            match record.status {
                TaskStatus::Running | TaskStatus::WaitingForInput | TaskStatus::Pending => {
                    record.status = TaskStatus::Failed;
                    record.last_error = Some("node_restart".to_string());
                    record.needs_attention = false;
                    record.assistance = None;
                    changed = true;
                }
                TaskStatus::Scheduled => {
                    if let Some(when) = record.scheduled_for {
                        self.scheduler.schedule(id, when);
                    }
                }
                TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Stopped
                | TaskStatus::Cancelled => {}
            }

            if record.browser_open {
                record.browser_open = false;
                record.vnc_token = None;
                record.vnc_port = None;
                self.vnc.revoke(id);
                changed = true;
            }

            if changed {
                record.updated_at = Utc::now();
                self.store.save_record(&record)?;
                info!(%id, status = ?record.status, "recovered task state after restart");
            }
        }
        Ok(())
    }

    // ── Public contract (§4.2) ───────────────────────────────────────────

    pub async fn create(&self, mut spec: TaskSpec) -> Result<TaskRecord, EngineError> {
        if spec.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty".into()));
        }
        if spec.instructions.trim().is_empty() {
            return Err(EngineError::InvalidInput("instructions must not be empty".into()));
        }
        if spec.max_steps == 0 {
            spec.max_steps = self.max_steps_default;
        }
        spec.created_at = Utc::now();

        let id = Uuid::new_v4();
        let record = TaskRecord::new(id, self.node_id.clone(), &spec);
        self.store.create(&record)?;

        if let Some(when) = record.scheduled_for {
            self.scheduler.schedule(id, when);
        } else {
            self.submit_run(id).await?;
        }

        self.store.load_record(id).map_err(EngineError::from)
    }

    pub fn get(&self, id: Uuid) -> Result<TaskDetail, EngineError> {
        let record = self.store.load_record(id)?;
        let steps = self.store.load_steps(id)?;
        let chat_history = self.store.load_chat(id)?;
        let vnc_launch_url = if record.browser_open {
            record
                .vnc_token
                .as_deref()
                .map(|t| VncBroker::launch_url(id, t))
        } else {
            None
        };
        Ok(TaskDetail {
            record,
            steps,
            chat_history,
            vnc_launch_url,
        })
    }

    pub fn list(&self) -> Result<Vec<TaskSummary>, EngineError> {
        let mut out = Vec::new();
        for id in self.store.list_ids()? {
            match self.store.load_record(id) {
                Ok(r) => out.push(r.summary()),
                Err(e) => warn!(%id, error = %e, "skipping unreadable task record in list()"),
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        // Ensure the record exists before tearing anything down, so a
        // delete on an unknown id surfaces `not_found` rather than
        // silently succeeding.
        self.store.load_record(id)?;
        self.stop_and_wait(id).await;
        self.vnc.revoke(id);
        self.scheduler.cancel(id);
        self.store.delete(id)?;
        Ok(())
    }

    pub async fn assist(&self, id: Uuid, message: String) -> Result<TaskRecord, EngineError> {
        let mutex = self.store.mutex(id);
        let _guard = mutex.lock().await;
        let mut record = self.store.load_record(id)?;
        if record.status != TaskStatus::WaitingForInput {
            return Err(EngineError::Conflict(
                "task is not waiting for input".into(),
            ));
        }
        let Some(respond) = self.pending_assist.remove(&id).map(|(_, tx)| tx) else {
            return Err(EngineError::Conflict("no blocked runner to resume".into()));
        };

        if let Some(assistance) = record.assistance.as_mut() {
            assistance.response_text = Some(message.clone());
        }
        record.needs_attention = false;
        record.status = TaskStatus::Running;
        record.updated_at = Utc::now();
        self.store.save_record(&record)?;
        self.store.append_chat(
            id,
            &ChatMessage {
                role: ChatRole::User,
                content: message.clone(),
                at: Utc::now(),
            },
        )?;

        let _ = respond.send(message);
        Ok(record)
    }

    pub async fn continue_task(&self, id: Uuid, instructions: String) -> Result<TaskRecord, EngineError> {
        {
            let mutex = self.store.mutex(id);
            let _guard = mutex.lock().await;
            let mut record = self.store.load_record(id)?;
            if !record.status.is_terminal() {
                return Err(EngineError::Conflict(
                    "continue is only valid on a terminal task".into(),
                ));
            }
            record.instructions = instructions.clone();
            record.status = TaskStatus::Pending;
            record.last_error = None;
            record.needs_attention = false;
            record.assistance = None;
            record.updated_at = Utc::now();
            self.store.save_record(&record)?;
            self.store.append_chat(
                id,
                &ChatMessage {
                    role: ChatRole::User,
                    content: instructions,
                    at: Utc::now(),
                },
            )?;
        }
        self.submit_run(id).await?;
        self.store.load_record(id).map_err(EngineError::from)
    }

    pub async fn stop(&self, id: Uuid) -> Result<(), EngineError> {
        {
            let record = self.store.load_record(id)?;
            if record.status != TaskStatus::Running && record.status != TaskStatus::WaitingForInput {
                return Err(EngineError::Conflict("task is not running".into()));
            }
        }
        self.stop_and_wait(id).await;
        Ok(())
    }

    async fn stop_and_wait(&self, id: Uuid) {
        let Some((_, active)) = self.active.remove(&id) else {
            return;
        };
        active
            .stop_requested
            .store(true, std::sync::atomic::Ordering::SeqCst);
        // Unblock a runner suspended in on_ask_human so it observes
        // cancellation instead of hanging until the deadline.
        if let Some((_, respond)) = self.pending_assist.remove(&id) {
            drop(respond);
        }
        active.handle.cancel();
        if tokio::time::timeout(SHUTDOWN_DEADLINE, active.handle.join())
            .await
            .is_err()
        {
            warn!(%id, "runner did not exit within the shutdown deadline; proceeding anyway");
        }
    }

    pub async fn open_browser(&self, id: Uuid) -> Result<TaskRecord, EngineError> {
        let mutex = self.store.mutex(id);
        let _guard = mutex.lock().await;
        let mut record = self.store.load_record(id)?;
        if !record.browser_open {
            let token = self.vnc.mint(id);
            record.browser_open = true;
            record.vnc_token = Some(token);
            record.vnc_port = Some(self.vnc_port);
            record.updated_at = Utc::now();
            self.store.save_record(&record)?;
        }
        Ok(record)
    }

    pub async fn close_browser(&self, id: Uuid) -> Result<TaskRecord, EngineError> {
        let mutex = self.store.mutex(id);
        let _guard = mutex.lock().await;
        let mut record = self.store.load_record(id)?;
        if record.browser_open {
            self.vnc.revoke(id);
            record.browser_open = false;
            record.vnc_token = None;
            record.vnc_port = None;
            record.updated_at = Utc::now();
            self.store.save_record(&record)?;
        }
        Ok(record)
    }

    pub fn reschedule(&self, id: Uuid, when: DateTime<Utc>) -> Result<TaskRecord, EngineError> {
        let mut record = self.store.load_record(id)?;
        if record.status != TaskStatus::Scheduled {
            return Err(EngineError::Conflict("task is not scheduled".into()));
        }
        self.scheduler.reschedule(id, when);
        record.scheduled_for = Some(when);
        record.updated_at = Utc::now();
        self.store.save_record(&record)?;
        Ok(record)
    }

    pub fn run_now(&self, id: Uuid) -> Result<(), EngineError> {
        let record = self.store.load_record(id)?;
        if record.status != TaskStatus::Scheduled {
            return Err(EngineError::Conflict("task is not scheduled".into()));
        }
        self.scheduler.run_now(id);
        Ok(())
    }

    // ── Run machinery ────────────────────────────────────────────────────

    async fn submit_run(self: &Arc<Self>, id: Uuid) -> Result<(), EngineError> {
        let run_guard = self.store.try_begin_run(id)?;

        let mut record = self.store.load_record(id)?;
        record.status = TaskStatus::Running;
        record.updated_at = Utc::now();
        self.store.save_record(&record)?;

        let (tx, rx) = mpsc::channel(32);
        let handle = self.runner.start(record, tx);
        let stop_requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
        self.active.insert(
            id,
            ActiveRun {
                handle,
                stop_requested: stop_requested.clone(),
            },
        );

        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive_run(id, rx, run_guard, stop_requested).await;
        });
        Ok(())
    }

    async fn drive_run(
        self: Arc<Self>,
        id: Uuid,
        mut events: mpsc::Receiver<RunnerEvent>,
        _run_guard: webai_store::RunGuard,
        stop_requested: Arc<std::sync::atomic::AtomicBool>,
    ) {
        let mutex = self.store.mutex(id);
        let mut finished = false;

        loop {
            match events.recv().await {
                Some(RunnerEvent::Step(payload)) => {
                    let _guard = mutex.lock().await;
                    let mut record = match self.store.load_record(id) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(%id, error = %e, "failed to load record while recording step");
                            continue;
                        }
                    };
                    let step_number = record.step_count + 1;
                    let step = Step {
                        step_number,
                        summary_html: payload.summary_html,
                        screenshot_b64: payload.screenshot_b64,
                        url: payload.url,
                        title: payload.title,
                    };
                    if let Err(e) = self.store.append_step(id, &step) {
                        warn!(%id, error = %e, "failed to persist step");
                        continue;
                    }
                    record.step_count = step_number;
                    record.updated_at = Utc::now();

                    if record.step_count > record.max_steps {
                        record.status = TaskStatus::Failed;
                        record.last_error = Some("step_budget_exceeded".to_string());
                        let _ = self.store.save_record(&record);
                        drop(_guard);
                        if let Some((_, active)) = self.active.remove(&id) {
                            active.handle.cancel();
                        }
                        finished = true;
                        break;
                    }
                    let _ = self.store.save_record(&record);
                }
                Some(RunnerEvent::AskHuman { question, respond }) => {
                    let _guard = mutex.lock().await;
                    let mut record = match self.store.load_record(id) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(%id, error = %e, "failed to load record for ask_human");
                            let _ = respond.send(String::new());
                            continue;
                        }
                    };
                    record.status = TaskStatus::WaitingForInput;
                    record.needs_attention = true;
                    record.assistance = Some(Assistance {
                        question,
                        response_text: None,
                    });
                    record.updated_at = Utc::now();
                    let _ = self.store.save_record(&record);
                    self.pending_assist.insert(id, respond);
                }
                Some(RunnerEvent::Finished(outcome)) => {
                    self.apply_outcome(id, outcome).await;
                    finished = true;
                    break;
                }
                None => {
                    // Channel closed without a Finished event: either a
                    // cooperative stop (flag set before cancelling) or an
                    // unexpected runner crash.
                    if stop_requested.load(std::sync::atomic::Ordering::SeqCst) {
                        self.terminal(id, TaskStatus::Stopped, None).await;
                    } else {
                        self.terminal(id, TaskStatus::Failed, Some("browser_crashed".to_string()))
                            .await;
                    }
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            self.terminal(id, TaskStatus::Failed, Some("browser_crashed".to_string()))
                .await;
        }
        self.active.remove(&id);
        self.pending_assist.remove(&id);
    }

    async fn apply_outcome(&self, id: Uuid, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.terminal(id, TaskStatus::Completed, None).await,
            Outcome::Failed(reason) => self.terminal(id, TaskStatus::Failed, Some(reason)).await,
        }
    }

    /// Applies a terminal transition: sets `status`/`last_error`, then
    /// flips `browser_open` per `leave_browser_open` (on_finish, §4.2).
    async fn terminal(&self, id: Uuid, status: TaskStatus, last_error: Option<String>) {
        let mutex = self.store.mutex(id);
        let _guard = mutex.lock().await;
        let mut record = match self.store.load_record(id) {
            Ok(r) => r,
            Err(e) => {
                warn!(%id, error = %e, "failed to load record for terminal transition");
                return;
            }
        };
        // A delete() running concurrently may have already removed this
        // task; nothing to do in that case.
        record.status = status;
        record.last_error = last_error;
        record.needs_attention = false;
        record.assistance = None;

        if record.leave_browser_open && status != TaskStatus::Failed {
            if !record.browser_open {
                let token = self.vnc.mint(id);
                record.browser_open = true;
                record.vnc_token = Some(token);
                record.vnc_port = Some(self.vnc_port);
            }
        } else if record.browser_open {
            self.vnc.revoke(id);
            record.browser_open = false;
            record.vnc_token = None;
            record.vnc_port = None;
        }

        record.updated_at = Utc::now();
        let _ = self.store.save_record(&record);
        info!(%id, ?status, "task reached terminal state");
    }
}

/// Tasks currently known to be alive, for diagnostics/tests.
#[allow(dead_code)]
fn active_ids(engine: &TaskEngine) -> HashSet<Uuid> {
    engine.active.iter().map(|e| *e.key()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{MockAction, MockAgentRunner, StepPayload};
    use std::time::Duration;
    use webai_config::TaskSpec;

    fn spec(title: &str, max_steps: u32) -> TaskSpec {
        TaskSpec {
            title: title.to_string(),
            instructions: "do the thing".to_string(),
            model_name: "gpt-5".to_string(),
            reasoning_effort: None,
            max_steps,
            leave_browser_open: false,
            scheduled_for: None,
            node_id: None,
            created_at: Utc::now(),
        }
    }

    fn make_engine(runner: MockAgentRunner) -> (Arc<TaskEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path()).unwrap());
        let (scheduler, due_rx) = Scheduler::new(StdDuration::from_millis(20));
        let scheduler = Arc::new(scheduler);
        let vnc = Arc::new(VncBroker::new());
        let engine = TaskEngine::new(
            "node-1",
            store,
            scheduler,
            due_rx,
            vnc,
            Arc::new(runner),
            50,
            5900,
        );
        (engine, dir)
    }

    async fn wait_for_terminal(engine: &TaskEngine, id: Uuid) -> TaskRecord {
        for _ in 0..200 {
            let record = engine.get(id).unwrap().record;
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    // E1: launch -> complete.
    #[tokio::test]
    async fn e1_launch_to_complete() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ]);
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 3)).await.unwrap();
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.step_count, 2);
        assert!(!record.browser_open);
        let detail = engine.get(record.id).unwrap();
        assert!(detail.vnc_launch_url.is_none());
    }

    // E2: assist roundtrip.
    #[tokio::test]
    async fn e2_assist_roundtrip() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Ask("confirm?".to_string()),
            MockAction::Complete,
        ]);
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();

        let mut waiting = None;
        for _ in 0..200 {
            let r = engine.get(record.id).unwrap().record;
            if r.status == TaskStatus::WaitingForInput {
                waiting = Some(r);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let waiting = waiting.expect("task should reach waiting_for_input");
        assert!(waiting.needs_attention);
        assert_eq!(waiting.assistance.unwrap().question, "confirm?");

        engine.assist(record.id, "yes".to_string()).await.unwrap();
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Completed);
    }

    // E3: scheduled start.
    #[tokio::test]
    async fn e3_scheduled_start() {
        let runner = MockAgentRunner::new(vec![MockAction::Complete]);
        let (engine, _dir) = make_engine(runner);
        let mut s = spec("t", 5);
        s.scheduled_for = Some(Utc::now() + chrono::Duration::milliseconds(100));
        let record = engine.create(s).await.unwrap();
        assert_eq!(record.status, TaskStatus::Scheduled);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let record = engine.get(record.id).unwrap().record;
        assert!(record.scheduled_for.is_none());
        assert!(matches!(
            record.status,
            TaskStatus::Running | TaskStatus::Completed
        ));
    }

    // I1 / §8 property 1: concurrent start attempts, exactly one wins.
    #[tokio::test]
    async fn single_runner_invariant_under_concurrent_starts() {
        let runner = MockAgentRunner::new(vec![MockAction::Complete])
            .with_step_delay(Duration::from_millis(100));
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();

        // A second concurrent submit attempt while the first run is alive
        // must be rejected by the store's single-runner guard.
        let err = engine.submit_run(record.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    // Step budget overrun -> failed with step_budget_exceeded.
    #[tokio::test]
    async fn step_budget_exceeded_fails_the_task() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ]);
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 2)).await.unwrap();
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("step_budget_exceeded"));
    }

    // stop() transitions a running task to stopped.
    #[tokio::test]
    async fn stop_transitions_to_stopped() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ])
        .with_step_delay(Duration::from_millis(200));
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.stop(record.id).await.unwrap();
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Stopped);
    }

    // continue() on a terminal task starts a fresh run.
    #[tokio::test]
    async fn continue_starts_a_fresh_run_on_terminal_task() {
        let runner = MockAgentRunner::new(vec![MockAction::Complete]);
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Completed);

        let record = engine
            .continue_task(record.id, "do more".to_string())
            .await
            .unwrap();
        assert!(record.status == TaskStatus::Pending || record.status == TaskStatus::Running);
        let record = wait_for_terminal(&engine, record.id).await;
        assert_eq!(record.status, TaskStatus::Completed);

        let chat = engine.get(record.id).unwrap().chat_history;
        assert!(chat.iter().any(|m| m.content == "do more"));
    }

    // continue() is rejected on a non-terminal task.
    #[tokio::test]
    async fn continue_rejected_while_running() {
        let runner = MockAgentRunner::new(vec![MockAction::Complete])
            .with_step_delay(Duration::from_millis(200));
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();
        let err = engine
            .continue_task(record.id, "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    // open_browser / close_browser toggle the vnc token (I3).
    #[tokio::test]
    async fn open_and_close_browser_manage_vnc_token() {
        let runner = MockAgentRunner::new(vec![MockAction::Complete]);
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();
        let _ = wait_for_terminal(&engine, record.id).await;

        let opened = engine.open_browser(record.id).await.unwrap();
        assert!(opened.browser_open);
        assert!(opened.vnc_token.is_some());

        let closed = engine.close_browser(record.id).await.unwrap();
        assert!(!closed.browser_open);
        assert!(closed.vnc_token.is_none());
    }

    // §8 property 7: crash recovery.
    #[tokio::test]
    async fn recover_fails_non_terminal_tasks_with_node_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path()).unwrap());
        let id = Uuid::new_v4();
        let mut record = TaskRecord::new(id, "node-1", &spec("t", 5));
        record.status = TaskStatus::Running;
        record.browser_open = true;
        store.create(&record).unwrap();

        let (scheduler, due_rx) = Scheduler::new(StdDuration::from_secs(3600));
        let engine = TaskEngine::new(
            "node-1",
            store.clone(),
            Arc::new(scheduler),
            due_rx,
            Arc::new(VncBroker::new()),
            Arc::new(MockAgentRunner::new(vec![MockAction::Complete])),
            50,
            5900,
        );
        engine.recover().await.unwrap();

        let recovered = store.load_record(id).unwrap();
        assert_eq!(recovered.status, TaskStatus::Failed);
        assert_eq!(recovered.last_error.as_deref(), Some("node_restart"));
        assert!(!recovered.browser_open);
        assert!(store.task_dir(id).exists());
    }

    // delete() removes the task and stops any live runner.
    #[tokio::test]
    async fn delete_stops_runner_and_removes_directory() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ])
        .with_step_delay(Duration::from_millis(200));
        let (engine, _dir) = make_engine(runner);
        let record = engine.create(spec("t", 5)).await.unwrap();
        let dir = engine.store.task_dir(record.id);
        assert!(dir.exists());

        engine.delete(record.id).await.unwrap();
        assert!(!dir.exists());
        assert!(matches!(engine.get(record.id), Err(EngineError::NotFound)));
    }
}
