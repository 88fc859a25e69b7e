// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes shared by the engine/orchestrator/tools test suites. Not compiled
//! into release builds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::driver::{AgentDriver, AgentEvent, AgentEventStream, DriverCrash, TurnContext};

/// A scripted sequence of turns. Each call to `invoke` pops the next script
/// entry; scripts exhausted beyond what's provided panic, surfacing test
/// bugs immediately rather than hanging.
pub struct FakeDriver {
    scripts: Mutex<Vec<Vec<Result<AgentEvent, DriverCrash>>>>,
    calls: AtomicUsize,
    pub last_contexts: Mutex<Vec<TurnContext>>,
}

impl FakeDriver {
    pub fn new(scripts: Vec<Vec<Result<AgentEvent, DriverCrash>>>) -> Self {
        Self { scripts: Mutex::new(scripts), calls: AtomicUsize::new(0), last_contexts: Mutex::new(Vec::new()) }
    }

    pub fn single_turn(events: Vec<Result<AgentEvent, DriverCrash>>) -> Self {
        Self::new(vec![events])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AgentDriver for FakeDriver {
    fn invoke(&self, ctx: TurnContext) -> AgentEventStream {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_contexts.lock().unwrap().push(ctx);
        let mut scripts = self.scripts.lock().unwrap();
        let events = if index < scripts.len() {
            std::mem::take(&mut scripts[index])
        } else {
            vec![]
        };
        Box::pin(tokio_stream::iter(events))
    }
}

/// A driver whose stream never terminates until cancelled, used to exercise
/// the cancellation path.
pub struct HangingDriver;

impl AgentDriver for HangingDriver {
    fn invoke(&self, _ctx: TurnContext) -> AgentEventStream {
        Box::pin(tokio_stream::pending::<Result<AgentEvent, DriverCrash>>())
    }
}

pub fn text_event(content: &str) -> Result<AgentEvent, DriverCrash> {
    Ok(AgentEvent::Text { content: content.to_string() })
}

pub fn status_event(status: &str) -> Result<AgentEvent, DriverCrash> {
    Ok(AgentEvent::Status { status: status.to_string(), session_id: None })
}
