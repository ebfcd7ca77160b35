// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The per-node task lifecycle engine (§4.2): state machine, persistence,
//! scheduler glue, and the abstract [`AgentRunner`] integration point.

mod engine;
mod error;
pub mod runner;

pub use engine::TaskEngine;
pub use error::EngineError;
pub use runner::{
    AgentRunner, MockAction, MockAgentRunner, Outcome, RunnerEvent, RunnerHandle, StepPayload,
};
