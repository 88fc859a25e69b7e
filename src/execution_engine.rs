// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs one agent turn end to end (§4.4): admission, timeout, retry with
//! session resumption, incremental persistence, finalisation, status
//! classification, and parent escalation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{AgentDriver, AgentEvent, ImageAttachment, TurnContext};
use crate::error::{Result, ThreadHostError};
use crate::event::ThreadEvent;
use crate::event_bus::EventBus;
use crate::message_stream::MessageStream;
use crate::model::{MessageRole, NewThread, Thread, ThreadStatus};
use crate::rendezvous::Rendezvous;
use crate::store::Store;
use crate::task_registry::TaskRegistry;

pub const RETRY_DELAY: Duration = Duration::from_secs(3);
const CONTINUATION_PROMPT: &str =
    "Your previous execution was interrupted. Please continue where you left off and complete the task.";

/// Request to run one turn. `skip_add_user_message` is true whenever the
/// caller already persisted the user-facing message (direct sends persist
/// it first per §4.5.1; notification/spawn flows persist a synthetic
/// message before scheduling the turn).
#[derive(Debug, Clone)]
pub struct RunTurnRequest {
    pub thread_id: String,
    pub prompt: String,
    pub images: Vec<ImageAttachment>,
    pub broadcast_status: bool,
    pub skip_add_user_message: bool,
}

impl RunTurnRequest {
    pub fn new(thread_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            broadcast_status: true,
            skip_add_user_message: false,
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The parent-facing side of parent/child orchestration (§4.5.3, §4.5.4),
/// handed to the engine so it never has to reach into the Orchestrator
/// directly — a small interface per dependency, not a closure smuggled
/// through a global (§9).
pub trait ParentLink: Send + Sync {
    /// §4.5.4: the child called SignalStatus. Must fail explicitly if
    /// `child` has no parent wired.
    fn on_signal_status<'a>(&'a self, child: &'a Thread, status: ThreadStatus, reason: String) -> BoxFuture<'a, Result<()>>;

    /// §4.5.3: the child's run terminated (success, crash-exhaustion, or
    /// timeout — never on cancellation). `already_signaled` suppresses the
    /// duplicate `subthread_status` publish when SignalStatus already did it.
    fn on_terminal<'a>(
        &'a self,
        child: &'a Thread,
        status: ThreadStatus,
        reason: Option<String>,
        already_signaled: bool,
    ) -> BoxFuture<'a, ()>;
}

/// A [`ParentLink`] that does nothing; used for threads with no parent and
/// in standalone tests that don't exercise escalation.
pub struct NoParentLink;

impl ParentLink for NoParentLink {
    fn on_signal_status<'a>(&'a self, child: &'a Thread, _status: ThreadStatus, _reason: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Err(ThreadHostError::validation(format!("thread {} has no parent to signal", child.id))) })
    }

    fn on_terminal<'a>(&'a self, _child: &'a Thread, _status: ThreadStatus, _reason: Option<String>, _already_signaled: bool) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(ThreadStatus),
    Stopped,
}

pub struct ExecutionEngine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    rendezvous: Arc<Rendezvous>,
    tasks: Arc<TaskRegistry>,
    semaphore: Arc<Semaphore>,
    driver: Arc<dyn AgentDriver>,
    config: Arc<Config>,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        rendezvous: Arc<Rendezvous>,
        tasks: Arc<TaskRegistry>,
        semaphore: Arc<Semaphore>,
        driver: Arc<dyn AgentDriver>,
        config: Arc<Config>,
    ) -> Self {
        Self { store, bus, rendezvous, tasks, semaphore, driver, config }
    }

    fn can_spawn(&self, thread: &Thread) -> Result<bool> {
        let depth = self.store.thread_depth(&thread.id)?;
        if depth < 0 {
            return Ok(false);
        }
        let depth = depth as u32;
        Ok(depth < thread.nesting.max_thread_depth && (depth == 0 || thread.nesting.allow_nested_subthreads))
    }

    async fn publish(&self, thread_id: &str, event: ThreadEvent) {
        if let Err(e) = self.bus.publish(thread_id, event).await {
            warn!(thread_id, error = %e, "failed to publish event");
        }
    }

    pub async fn run_turn(&self, request: RunTurnRequest, parent_link: &dyn ParentLink) -> Result<TurnOutcome> {
        let RunTurnRequest { thread_id, mut prompt, mut images, broadcast_status, skip_add_user_message } = request;

        // 1. fetch
        let mut thread = self.store.get_thread(&thread_id)?.ok_or_else(|| ThreadHostError::not_found(format!("thread {thread_id} not found")))?;

        if !skip_add_user_message {
            let message = self.store.add_message(&thread_id, MessageRole::User, &prompt, None)?;
            self.publish(&thread_id, ThreadEvent::Message { message }).await;
        }

        // 2. register task, cancelling any prior turn for this thread
        let (cancel_token, ticket) = self.tasks.register(&thread_id);

        // 3. seed assistant placeholder message
        let assistant_message = self.store.add_message(&thread_id, MessageRole::Assistant, "...", None)?;
        let assistant_id = assistant_message.id.clone();
        let mut stream_state = MessageStream::new();

        // 4. admission
        self.publish(&thread_id, ThreadEvent::QueueWaiting { message: "waiting for an available agent slot".into() }).await;
        let permit = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                self.tasks.deregister(&thread_id, ticket);
                self.store.update_thread_status(&thread_id, ThreadStatus::Active)?;
                self.publish(&thread_id, ThreadEvent::Stopped {}).await;
                return Ok(TurnOutcome::Stopped);
            }
            permit = self.semaphore.clone().acquire_owned() => permit.map_err(|_| ThreadHostError::infrastructure("semaphore closed"))?,
        };
        self.publish(&thread_id, ThreadEvent::QueueAcquired {}).await;

        // 5. broadcast running
        self.store.update_thread_status(&thread_id, ThreadStatus::Running)?;
        if broadcast_status {
            self.publish(&thread_id, ThreadEvent::StatusChange { status: ThreadStatus::Running }).await;
        }

        let mut ephemeral_subagents: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut signaled: Option<(ThreadStatus, String)> = None;
        let max_attempts = self.config.max_retries + 1;
        let mut attempt: u32 = 0;

        let outcome = loop {
            attempt += 1;
            let can_spawn = self.can_spawn(&thread)?;
            let ctx = TurnContext {
                thread_id: thread_id.clone(),
                prompt: prompt.clone(),
                images: images.clone(),
                session_id: thread.session_id.clone(),
                model: thread.model.clone(),
                permission_mode: thread.permission_mode,
                extended_thinking: thread.extended_thinking,
                can_spawn,
                is_subthread: thread.parent_id.is_some(),
                continuation: attempt > 1,
                env: HashMap::new(),
                bus: Arc::clone(&self.bus),
                rendezvous: Arc::clone(&self.rendezvous),
            };

            let attempt_result = self
                .run_one_attempt(&thread_id, &thread, ctx, &cancel_token, &mut stream_state, &assistant_id, &mut ephemeral_subagents, &mut signaled, parent_link)
                .await;

            match attempt_result {
                AttemptResult::Completed => break AttemptOutcome::Completed,
                AttemptResult::Cancelled => break AttemptOutcome::Cancelled,
                AttemptResult::TimedOut => break AttemptOutcome::TimedOut,
                AttemptResult::Crashed(message) => {
                    self.store.update_message(&assistant_id, &stream_state.content_text(), Some(stream_state.blocks()))?;
                    if let Some(session_id) = stream_state.final_session_id() {
                        self.store.update_thread_session(&thread_id, Some(session_id))?;
                    }
                    self.store.update_thread_status(&thread_id, ThreadStatus::Running)?; // touch updated_at, resets watchdog
                    if attempt < max_attempts {
                        warn!(thread_id = %thread_id, attempt, error = %message, "driver crashed, retrying with session resumption");
                        tokio::time::sleep(RETRY_DELAY).await;
                        let retry_note = self.store.add_message(
                            &thread_id,
                            MessageRole::System,
                            &format!("Automatically retrying with session resumption (attempt {}).", attempt + 1),
                            None,
                        )?;
                        self.publish(&thread_id, ThreadEvent::Message { message: retry_note }).await;
                        prompt = CONTINUATION_PROMPT.to_string();
                        images = Vec::new();
                        thread = self.store.get_thread(&thread_id)?.ok_or_else(|| ThreadHostError::not_found(format!("thread {thread_id} not found")))?;
                        continue;
                    }
                    break AttemptOutcome::Exhausted(message);
                }
            }
        };

        self.tasks.deregister(&thread_id, ticket);
        drop(permit);

        match outcome {
            AttemptOutcome::Cancelled => {
                self.store.update_message(&assistant_id, &stream_state.content_text(), Some(stream_state.blocks()))?;
                self.store.update_thread_status(&thread_id, ThreadStatus::Active)?;
                self.publish(&thread_id, ThreadEvent::Stopped {}).await;
                Ok(TurnOutcome::Stopped)
            }
            AttemptOutcome::TimedOut => {
                self.store.update_message(&assistant_id, &stream_state.content_text(), Some(stream_state.blocks()))?;
                self.store.update_thread_status(&thread_id, ThreadStatus::NeedsAttention)?;
                self.publish(&thread_id, ThreadEvent::Error { error: format!("Agent turn exceeded {}s and was aborted.", self.config.agent_timeout_secs) }).await;
                if thread.parent_id.is_some() {
                    parent_link.on_terminal(&thread, ThreadStatus::NeedsAttention, Some("turn timed out".into()), false).await;
                }
                Err(ThreadHostError::timeout(format!("thread {thread_id} turn exceeded configured timeout")))
            }
            AttemptOutcome::Exhausted(message) => {
                self.store.update_thread_status(&thread_id, ThreadStatus::NeedsAttention)?;
                self.publish(&thread_id, ThreadEvent::Error { error: message.clone() }).await;
                if thread.parent_id.is_some() {
                    parent_link.on_terminal(&thread, ThreadStatus::NeedsAttention, Some(message.clone()), false).await;
                }
                Err(ThreadHostError::driver_crash(message))
            }
            AttemptOutcome::Completed => {
                let finalize_events = stream_state.finalize();
                for event in finalize_events {
                    if let ThreadEvent::ToolResult { ref tool_use_id, is_error, ref content, .. } = event {
                        self.finish_ephemeral_subagent(&thread_id, tool_use_id, is_error, content.clone(), &mut ephemeral_subagents).await?;
                    }
                    self.publish(&thread_id, event).await;
                }
                self.store.update_message(&assistant_id, &stream_state.content_text(), Some(stream_state.blocks()))?;
                if let Some(session_id) = stream_state.final_session_id() {
                    self.store.update_thread_session(&thread_id, Some(session_id))?;
                }

                let mut classified = stream_state.classify_status();
                let has_parent = thread.parent_id.is_some();
                if has_parent && classified == ThreadStatus::Active {
                    // §4.4.3: a sub-thread that finishes without an explicit
                    // signal is treated as done for notification purposes.
                    debug!(thread_id = %thread_id, "sub-thread finished without explicit signal, treating as done");
                    classified = ThreadStatus::Done;
                }
                self.store.update_thread_status(&thread_id, classified)?;
                self.publish(&thread_id, ThreadEvent::Complete { assistant_message: stream_state.blocks().to_vec(), status: classified }).await;

                if has_parent {
                    let already_signaled = signaled.is_some_and(|(s, _)| s == classified);
                    parent_link.on_terminal(&thread, classified, None, already_signaled).await;
                }
                Ok(TurnOutcome::Completed(classified))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one_attempt(
        &self,
        thread_id: &str,
        thread: &Thread,
        ctx: TurnContext,
        cancel_token: &tokio_util::sync::CancellationToken,
        stream_state: &mut MessageStream,
        assistant_id: &str,
        ephemeral_subagents: &mut std::collections::HashSet<String>,
        signaled: &mut Option<(ThreadStatus, String)>,
        parent_link: &dyn ParentLink,
    ) -> AttemptResult {
        use tokio_stream::StreamExt;

        let mut agent_stream = self.driver.invoke(ctx);
        let timeout = self.config.agent_timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return AttemptResult::Cancelled,
                _ = &mut deadline => return AttemptResult::TimedOut,
                next = agent_stream.next() => {
                    match next {
                        None => return AttemptResult::Completed,
                        Some(Err(crash)) => return AttemptResult::Crashed(crash.message),
                        Some(Ok(event)) => {
                            self.apply_event(thread_id, thread, event, stream_state, assistant_id, ephemeral_subagents, signaled, parent_link).await;
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_event(
        &self,
        thread_id: &str,
        thread: &Thread,
        event: AgentEvent,
        stream_state: &mut MessageStream,
        assistant_id: &str,
        ephemeral_subagents: &mut std::collections::HashSet<String>,
        signaled: &mut Option<(ThreadStatus, String)>,
        parent_link: &dyn ParentLink,
    ) {
        let usage_delta = if let AgentEvent::Usage { input_tokens, output_tokens, cost_usd } = &event {
            Some((*input_tokens, *output_tokens, *cost_usd))
        } else {
            None
        };

        let outcome = stream_state.apply(event);

        if let Some((input_tokens, output_tokens, cost_usd)) = usage_delta {
            if let Err(e) = self.store.update_thread_usage(thread_id, input_tokens, output_tokens, cost_usd) {
                warn!(thread_id, error = %e, "failed to update thread usage");
            }
        }

        if let Some(request) = outcome.spawn_subagent {
            if let Some(parent) = self.store.get_thread(thread_id).ok().flatten() {
                let new_thread = NewThread {
                    title: request.title,
                    parent_id: Some(thread_id.to_string()),
                    work_dir: parent.work_dir.clone(),
                    model: Some(parent.model.clone()),
                    permission_mode: Some(parent.permission_mode),
                    extended_thinking: Some(parent.extended_thinking),
                    auto_react: Some(false),
                    allow_nested_subthreads: Some(false),
                    max_thread_depth: Some(1),
                    is_ephemeral: true,
                    id: Some(request.tool_id.clone()),
                };
                match self.store.create_thread(new_thread) {
                    Ok(_) => {
                        ephemeral_subagents.insert(request.tool_id);
                    }
                    Err(e) => warn!(thread_id, error = %e, "failed to materialise ephemeral sub-agent thread"),
                }
            }
        }

        for event in outcome.events {
            if let ThreadEvent::ToolResult { ref tool_use_id, is_error, ref content, .. } = event {
                if ephemeral_subagents.contains(tool_use_id) {
                    if let Err(e) = self.finish_ephemeral_subagent(thread_id, tool_use_id, is_error, content.clone(), ephemeral_subagents).await {
                        warn!(thread_id, error = %e, "failed to finish ephemeral sub-agent");
                    }
                }
            }
            self.publish(thread_id, event).await;
        }

        self.store.update_message(assistant_id, &stream_state.content_text(), Some(stream_state.blocks())).ok();

        if signaled.is_none() {
            if let Some((status, reason)) = stream_state.signal_status_call() {
                if thread.parent_id.is_some() {
                    if let Err(e) = parent_link.on_signal_status(thread, status, reason.clone()).await {
                        warn!(thread_id, error = %e, "failed to broadcast signal-status to parent");
                    }
                }
                *signaled = Some((status, reason));
            }
        }
    }

    async fn finish_ephemeral_subagent(
        &self,
        parent_thread_id: &str,
        tool_use_id: &str,
        is_error: bool,
        content: Option<String>,
        ephemeral_subagents: &mut std::collections::HashSet<String>,
    ) -> Result<()> {
        if !ephemeral_subagents.remove(tool_use_id) {
            return Ok(());
        }
        let status = if is_error { ThreadStatus::NeedsAttention } else { ThreadStatus::Done };
        self.store.update_thread_status(tool_use_id, status)?;
        let stop_event = ThreadEvent::SubagentStop {
            agent_type: "Task".to_string(),
            result: if is_error { None } else { content.clone() },
            error: if is_error { content } else { None },
            is_background: true,
            tool_use_id: Some(tool_use_id.to_string()),
        };
        self.publish(parent_thread_id, stop_event).await;
        Ok(())
    }
}

enum AttemptResult {
    Completed,
    Cancelled,
    TimedOut,
    Crashed(String),
}

enum AttemptOutcome {
    Completed,
    Cancelled,
    TimedOut,
    Exhausted(String),
}

#[cfg(test)]
#[path = "execution_engine_tests.rs"]
mod tests;
