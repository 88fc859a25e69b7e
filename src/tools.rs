// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tool surface exposed to agents (§6): names and parameters only, per
//! the spec — "semantics enforced by the engine, not the tool body". The
//! original source registers these as async callbacks closed over a
//! per-turn registry (`mainthread.agents.registry`); here that registry is
//! [`AgentToolRegistry`], a small interface the (external, out-of-scope)
//! agent driver calls back into rather than a closure smuggled through a
//! mutable global (§9 design notes).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, ThreadHostError};
use crate::model::{Message, PermissionMode, Thread, ThreadStatus};

pub const TOOL_SPAWN_THREAD: &str = "SpawnThread";
pub const TOOL_LIST_THREADS: &str = "ListThreads";
pub const TOOL_ARCHIVE_THREAD: &str = "ArchiveThread";
pub const TOOL_READ_THREAD: &str = "ReadThread";
pub const TOOL_SEND_TO_THREAD: &str = "SendToThread";
pub const TOOL_SIGNAL_STATUS: &str = "SignalStatus";

/// Arguments accepted by the `SpawnThread` tool.
#[derive(Debug, Clone, Default)]
pub struct SpawnThreadArgs {
    pub title: String,
    pub work_dir: Option<String>,
    pub initial_message: Option<String>,
    pub model: Option<String>,
    pub permission_mode: Option<PermissionMode>,
    pub extended_thinking: Option<bool>,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The interface the agents layer needs from the orchestrator, handed to the
/// driver as part of a turn's context so built-in tool calls can be
/// fulfilled without the driver reaching into `Store`/`EventBus` itself.
pub trait AgentToolRegistry: Send + Sync {
    /// §4.5.4: updates the child's stored status and publishes
    /// `subthread_status` on the parent stream. Must fail explicitly
    /// (rather than silently drop) if `child_id` has no parent wired.
    fn broadcast_status_signal<'a>(
        &'a self,
        child_id: &'a str,
        status: ThreadStatus,
        reason: String,
    ) -> BoxFuture<'a, Result<()>>;

    /// §4.5.5: enqueue a fire-and-forget message to one of `source_id`'s own
    /// children, subject to the 5/60s rate limit.
    fn send_to_thread<'a>(
        &'a self,
        source_id: &'a str,
        target_id: &'a str,
        message: String,
    ) -> BoxFuture<'a, Result<Thread>>;

    fn spawn_thread<'a>(&'a self, parent_id: &'a str, args: SpawnThreadArgs) -> BoxFuture<'a, Result<Thread>>;

    fn list_threads<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Thread>>>;

    fn archive_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<()>>;

    fn read_thread<'a>(&'a self, thread_id: &'a str, limit: Option<usize>) -> BoxFuture<'a, Result<Vec<Message>>>;
}

/// Ordered ring of recent-send timestamps per source thread, enforcing
/// `SendToThread`'s 5 messages / rolling 60s limit (§4.5.5).
#[derive(Default)]
pub struct SendRateLimiter {
    recent: Mutex<std::collections::HashMap<String, VecDeque<Instant>>>,
}

pub const SEND_RATE_LIMIT: usize = 5;
pub const SEND_RATE_WINDOW: Duration = Duration::from_secs(60);

impl SendRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `source_id` now, rejecting it if 5 or more
    /// attempts already fall within the trailing 60s window.
    pub fn check_and_record(&self, source_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        let entry = recent.entry(source_id.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) > SEND_RATE_WINDOW {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() >= SEND_RATE_LIMIT {
            return Err(ThreadHostError::rate_limited(format!(
                "thread {source_id} exceeded {SEND_RATE_LIMIT} SendToThread calls per 60s"
            )));
        }
        entry.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
