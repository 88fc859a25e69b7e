// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AgentDriver` interface: the external collaborator (§1, §2) that
//! yields a typed stream of agent events for a given thread turn. The
//! engine only depends on this trait; the concrete process/SDK integration
//! lives outside this crate's scope.
//!
//! Object-safe by the same shape as a pluggable detector: a boxed future
//! (here, a boxed stream) rather than an `async fn` in the trait, so it can
//! be stored as `Arc<dyn AgentDriver>` inside shared application state.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::event_bus::EventBus;
use crate::model::PermissionMode;
use crate::rendezvous::Rendezvous;

/// An inline image attachment on a user message (§6: capped at 10 per message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data_base64: String,
}

/// One agent-yielded event, pre-aggregation. Mirrors the original source's
/// `AgentMessage` union (text/thinking/tool_use/tool_result/error/usage/status).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    Text { content: String },
    Thinking { content: String, #[serde(default)] signature: Option<String> },
    ToolUse { id: String, name: String, #[serde(default)] input: Option<serde_json::Value> },
    ToolInput { id: String, input: serde_json::Value },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        content: Option<String>,
    },
    Error { message: String },
    Usage { input_tokens: u64, output_tokens: u64, cost_usd: f64 },
    /// Terminal status string (`"done"`, `"blocked"`, or free text) and the
    /// session token to remember for resumption, if the driver returned one.
    Status { status: String, #[serde(default)] session_id: Option<String> },
}

/// Raised when the driver itself dies mid-stream (process crash, SDK
/// exception). Distinct from a `AgentEvent::Error`, which is a well-formed
/// event the agent chose to emit.
#[derive(Debug, Clone)]
pub struct DriverCrash {
    pub message: String,
}

impl std::fmt::Display for DriverCrash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "driver crashed: {}", self.message)
    }
}

impl std::error::Error for DriverCrash {}

pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, DriverCrash>> + Send>>;

/// Per-turn context the driver needs to build its system prompt and tool
/// surface. `can_spawn` is computed by the orchestrator from the thread's
/// depth and nesting policy (SPEC_FULL supplement #1) so the driver never
/// has to consult the Store itself.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub thread_id: String,
    pub prompt: String,
    pub images: Vec<ImageAttachment>,
    pub session_id: Option<String>,
    pub model: String,
    pub permission_mode: PermissionMode,
    pub extended_thinking: bool,
    /// True when this thread may call SpawnThread/Task this turn.
    pub can_spawn: bool,
    /// True for sub-threads, which additionally get the SignalStatus tool.
    pub is_subthread: bool,
    /// Extra instructions appended to the prompt on a retry attempt.
    pub continuation: bool,
    /// Pre-resolved environment passed through to the driver process, e.g.
    /// `MAX_THINKING_TOKENS` when `extended_thinking` is set.
    pub env: HashMap<String, String>,
    /// Handle for the driver to publish `question`/`plan_approval` events
    /// and rendezvous on the answer itself (§4.3): the engine only consumes
    /// the driver's `AgentEvent` stream and never brokers prompts on its
    /// behalf, so these two collaborators are handed through directly.
    pub bus: Arc<EventBus>,
    pub rendezvous: Arc<Rendezvous>,
}

pub trait AgentDriver: Send + Sync {
    fn invoke(&self, ctx: TurnContext) -> AgentEventStream;
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
