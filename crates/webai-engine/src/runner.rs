// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The abstract agent driver (§4.2, §9 "polymorphism over agent driver").
//! The engine never knows how a run actually steers a browser; it only
//! reacts to the tagged events a runner emits on the channel handed to
//! `start`. Swapping in a real browser-automation backend later means
//! implementing this one trait — nothing in [`crate::engine`] changes.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use webai_config::TaskRecord;

/// One step emitted by a runner. `step_number` is assigned by the engine,
/// not the runner, so the step budget (I2) is enforced in exactly one place.
#[derive(Debug, Clone, Default)]
pub struct StepPayload {
    pub summary_html: Option<String>,
    pub screenshot_b64: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// How a run ended, absent operator-initiated cancellation (which the
/// engine applies directly when it cancels the run's token).
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed,
    Failed(String),
}

/// A tagged event flowing from a running agent to the engine.
pub enum RunnerEvent {
    Step(StepPayload),
    /// The runner is blocked on a human answer. The engine resumes it by
    /// sending the answer down `respond`; until then the runner task is
    /// simply suspended and emits nothing further.
    AskHuman {
        question: String,
        respond: oneshot::Sender<String>,
    },
    Finished(Outcome),
}

/// Returned by [`AgentRunner::start`]. Cancelling it asks the run to stop
/// cooperatively; the run signals completion by dropping its sender side
/// of the event channel or sending `Finished`, whichever happens first.
pub struct RunnerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Capability trait for driving one task run. Implementors own whatever
/// browser-automation machinery actually performs the work; the engine
/// only ever sees [`RunnerEvent`]s.
pub trait AgentRunner: Send + Sync {
    fn start(&self, task: TaskRecord, events: mpsc::Sender<RunnerEvent>) -> RunnerHandle;
}

/// A scripted action played back by [`MockAgentRunner`]. Exists so the
/// engine's state machine can be exercised end to end without a real
/// browser-automation backend wired in.
#[derive(Debug, Clone)]
pub enum MockAction {
    Step(StepPayload),
    Ask(String),
    Complete,
    Fail(String),
}

/// A fake [`AgentRunner`] that plays back a fixed script, one action at a
/// time, respecting cancellation and round-tripping `AskHuman` answers
/// through the same channel real runners would use.
#[derive(Clone)]
pub struct MockAgentRunner {
    script: Vec<MockAction>,
    step_delay: std::time::Duration,
}

impl MockAgentRunner {
    pub fn new(script: Vec<MockAction>) -> Self {
        MockAgentRunner {
            script,
            step_delay: std::time::Duration::from_millis(0),
        }
    }

    pub fn with_step_delay(mut self, delay: std::time::Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

impl AgentRunner for MockAgentRunner {
    fn start(&self, _task: TaskRecord, events: mpsc::Sender<RunnerEvent>) -> RunnerHandle {
        let cancel = CancellationToken::new();
        let cancel_inner = cancel.clone();
        let script = self.script.clone();
        let delay = self.step_delay;

        let task = tokio::spawn(async move {
            for action in script {
                if cancel_inner.is_cancelled() {
                    return;
                }
                match action {
                    MockAction::Step(payload) => {
                        tokio::select! {
                            _ = cancel_inner.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        if events.send(RunnerEvent::Step(payload)).await.is_err() {
                            return;
                        }
                    }
                    MockAction::Ask(question) => {
                        let (respond, answer) = oneshot::channel();
                        if events
                            .send(RunnerEvent::AskHuman { question, respond })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        tokio::select! {
                            _ = cancel_inner.cancelled() => return,
                            _ = answer => {}
                        }
                    }
                    MockAction::Complete => {
                        let _ = events.send(RunnerEvent::Finished(Outcome::Completed)).await;
                        return;
                    }
                    MockAction::Fail(reason) => {
                        let _ = events.send(RunnerEvent::Finished(Outcome::Failed(reason))).await;
                        return;
                    }
                }
            }
            let _ = events.send(RunnerEvent::Finished(Outcome::Completed)).await;
        });

        RunnerHandle { cancel, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use webai_config::TaskSpec;

    fn record() -> TaskRecord {
        let spec = TaskSpec {
            title: "t".into(),
            instructions: "i".into(),
            model_name: "gpt-5".into(),
            reasoning_effort: None,
            max_steps: 10,
            leave_browser_open: false,
            scheduled_for: None,
            node_id: None,
            created_at: Utc::now(),
        };
        TaskRecord::new(Uuid::new_v4(), "node-1", &spec)
    }

    #[tokio::test]
    async fn completes_after_scripted_steps() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = runner.start(record(), tx);
        let mut steps = 0;
        loop {
            match rx.recv().await.unwrap() {
                RunnerEvent::Step(_) => steps += 1,
                RunnerEvent::Finished(Outcome::Completed) => break,
                _ => panic!("unexpected event"),
            }
        }
        assert_eq!(steps, 2);
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn ask_human_blocks_until_answered() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Ask("continue?".into()),
            MockAction::Complete,
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = runner.start(record(), tx);
        match rx.recv().await.unwrap() {
            RunnerEvent::AskHuman { question, respond } => {
                assert_eq!(question, "continue?");
                respond.send("yes".into()).unwrap();
            }
            _ => panic!("expected AskHuman"),
        }
        match rx.recv().await.unwrap() {
            RunnerEvent::Finished(Outcome::Completed) => {}
            _ => panic!("expected Finished"),
        }
    }

    #[tokio::test]
    async fn cancel_stops_the_script_early() {
        let runner = MockAgentRunner::new(vec![
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Step(StepPayload::default()),
            MockAction::Complete,
        ])
        .with_step_delay(std::time::Duration::from_millis(50));
        let (tx, mut rx) = mpsc::channel(8);
        let handle = runner.start(record(), tx);
        handle.cancel();
        let got = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await;
        assert!(got.unwrap_or(None).is_none(), "cancelled run should emit nothing further");
    }

    #[tokio::test]
    async fn fail_action_reports_reason() {
        let runner = MockAgentRunner::new(vec![MockAction::Fail("boom".into())]);
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = runner.start(record(), tx);
        match rx.recv().await.unwrap() {
            RunnerEvent::Finished(Outcome::Failed(reason)) => assert_eq!(reason, "boom"),
            _ => panic!("expected Failed"),
        }
    }
}
