// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-level façade (§4.5): send-message, spawn-child, signal-status,
//! stop, archive. Wires child completion into the parent's notification
//! queue and implements the three small interfaces the engine, the
//! notification scheduler, and the agent tool surface each need
//! ([`ParentLink`], [`NotificationTarget`], [`AgentToolRegistry`]) rather
//! than exposing the concrete type to any of them (§9).

use std::sync::Arc;

use tracing::warn;

use crate::error::{Result, ThreadHostError};
use crate::event::ThreadEvent;
use crate::event_bus::EventBus;
use crate::execution_engine::{BoxFuture, ExecutionEngine, NoParentLink, ParentLink, RunTurnRequest, TurnOutcome};
use crate::files;
use crate::model::{MessageRole, NewThread, PermissionMode, Thread, ThreadStatus};
use crate::notification_scheduler::{NotificationScheduler, NotificationTarget};
use crate::rendezvous::Rendezvous;
use crate::store::Store;
use crate::task_registry::TaskRegistry;
use crate::tools::{AgentToolRegistry, SendRateLimiter, SpawnThreadArgs};
use crate::worktree;

/// Input caps on `POST /threads/{id}/messages` (§6, §8 boundary behaviours).
const MIN_CONTENT_CHARS: usize = 1;
const MAX_CONTENT_CHARS: usize = 100_000;
const MAX_IMAGES: usize = 10;
const MAX_FILE_REFERENCES: usize = 20;

/// Arguments for [`Orchestrator::spawn_child`] (§4.5.2).
#[derive(Debug, Clone, Default)]
pub struct SpawnChildRequest {
    pub title: String,
    pub work_dir: Option<String>,
    pub initial_message: Option<String>,
    pub model: Option<String>,
    pub permission_mode: Option<PermissionMode>,
    pub extended_thinking: Option<bool>,
    pub use_worktree: bool,
}

pub struct Orchestrator {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    rendezvous: Arc<Rendezvous>,
    tasks: Arc<TaskRegistry>,
    engine: Arc<ExecutionEngine>,
    notifications: Arc<NotificationScheduler>,
    send_limiter: SendRateLimiter,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        rendezvous: Arc<Rendezvous>,
        tasks: Arc<TaskRegistry>,
        engine: Arc<ExecutionEngine>,
        notifications: Arc<NotificationScheduler>,
    ) -> Self {
        Self { store, bus, rendezvous, tasks, engine, notifications, send_limiter: SendRateLimiter::new() }
    }

    async fn publish(&self, thread_id: &str, event: ThreadEvent) {
        if let Err(e) = self.bus.publish(thread_id, event).await {
            warn!(thread_id, error = %e, "failed to publish event");
        }
    }

    /// §4.5.1. `self` must already be held behind an `Arc` (App wires it
    /// that way) so the turn can run to completion after this call returns
    /// — a direct `send_message` drives the turn inline and returns once it
    /// finishes, matching the synchronous-with-SSE-streaming HTTP contract.
    pub async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
        images: Vec<crate::driver::ImageAttachment>,
        file_references: &[String],
    ) -> Result<TurnOutcome> {
        let char_count = content.chars().count();
        if !(MIN_CONTENT_CHARS..=MAX_CONTENT_CHARS).contains(&char_count) {
            return Err(ThreadHostError::validation(format!(
                "message content must be {MIN_CONTENT_CHARS}..={MAX_CONTENT_CHARS} chars, got {char_count}"
            )));
        }
        if images.len() > MAX_IMAGES {
            return Err(ThreadHostError::validation(format!("at most {MAX_IMAGES} images per message, got {}", images.len())));
        }
        if file_references.len() > MAX_FILE_REFERENCES {
            return Err(ThreadHostError::validation(format!(
                "at most {MAX_FILE_REFERENCES} file references per message, got {}",
                file_references.len()
            )));
        }

        let thread = self.require_thread(thread_id)?;

        let mut full_content = String::new();
        if !file_references.is_empty() {
            let inlined = files::inline_file_references(thread.work_dir.as_deref(), file_references)?;
            full_content.push_str(&inlined);
        }
        full_content.push_str(content);

        let message = self.store.add_message(thread_id, MessageRole::User, &full_content, None)?;
        self.publish(thread_id, ThreadEvent::Message { message }).await;
        self.store.update_thread_status(thread_id, ThreadStatus::Pending)?;

        let mut request = RunTurnRequest::new(thread_id, full_content);
        request.images = images;
        request.skip_add_user_message = true;
        self.engine.run_turn(request, self).await
    }

    fn require_thread(&self, thread_id: &str) -> Result<Thread> {
        self.store.get_thread(thread_id)?.ok_or_else(|| ThreadHostError::not_found(format!("thread {thread_id} not found")))
    }

    fn can_spawn(&self, thread: &Thread) -> Result<bool> {
        let depth = self.store.thread_depth(&thread.id)?;
        if depth < 0 {
            return Ok(false);
        }
        let depth = depth as u32;
        Ok(depth < thread.nesting.max_thread_depth && (depth == 0 || thread.nesting.allow_nested_subthreads))
    }

    /// §4.5.2. Takes `self` behind an `Arc` because a non-empty
    /// `initial_message` backgrounds the child's first turn past this
    /// call's return.
    pub async fn spawn_child(self: &Arc<Self>, parent_id: &str, request: SpawnChildRequest) -> Result<Thread> {
        let parent = self.require_thread(parent_id)?;
        if !self.can_spawn(&parent)? {
            return Err(ThreadHostError::depth_exceeded(format!("thread {parent_id} cannot spawn further children")));
        }

        let mut work_dir = request.work_dir.or_else(|| parent.work_dir.clone());
        let mut git = parent.git.clone();

        if request.use_worktree {
            if let Some(base) = parent.work_dir.as_deref() {
                let base_info = worktree::detect_git_info(Some(base)).await;
                if base_info.branch.is_some() && !base_info.is_worktree {
                    match worktree::create_worktree(base, &uuid::Uuid::new_v4().to_string()).await {
                        Some(outcome) => {
                            work_dir = Some(outcome.work_dir);
                            git = outcome.git;
                        }
                        None => warn!(parent_id, "worktree creation failed, falling back to parent's work_dir"),
                    }
                }
            }
        }

        let new_thread = NewThread {
            title: request.title,
            parent_id: Some(parent_id.to_string()),
            work_dir,
            model: request.model.or_else(|| Some(parent.model.clone())),
            permission_mode: request.permission_mode.or(Some(parent.permission_mode)),
            extended_thinking: request.extended_thinking.or(Some(parent.extended_thinking)),
            auto_react: Some(true),
            allow_nested_subthreads: Some(false),
            max_thread_depth: Some(1),
            is_ephemeral: false,
            id: None,
        };
        let child = self.store.create_thread(new_thread)?;
        if git.branch.is_some() || git.is_worktree {
            self.store.update_thread_git(&child.id, child.work_dir.as_deref(), &git)?;
        }
        let child = self.require_thread(&child.id)?;

        if let Some(initial_message) = &request.initial_message {
            let message = self.store.add_message(&child.id, MessageRole::User, initial_message, None)?;
            self.publish(&child.id, ThreadEvent::Message { message }).await;
        }

        self.publish(parent_id, ThreadEvent::ThreadCreated { thread: child.clone() }).await;

        if let Some(initial_message) = request.initial_message {
            let orch = Arc::clone(self);
            let child_id = child.id.clone();
            tokio::spawn(async move {
                let mut req = RunTurnRequest::new(child_id, initial_message);
                req.skip_add_user_message = true;
                if let Err(e) = orch.engine.run_turn(req, orch.as_ref()).await {
                    warn!(error = %e, "initial child turn ended in error");
                }
            });
        }

        Ok(child)
    }

    pub fn stop(&self, thread_id: &str) -> Result<()> {
        self.require_thread(thread_id)?;
        self.tasks.cancel(thread_id);
        Ok(())
    }

    /// §4.5.6. Best-effort worktree cleanup, then tears down every
    /// in-memory resource before the durable archive bit is set, so a
    /// reader can never observe `archived_at` set while a notification
    /// worker or subscriber for that thread is still alive.
    pub async fn archive(&self, thread_id: &str) -> Result<()> {
        let thread = self.require_thread(thread_id)?;
        if thread.archived_at.is_some() {
            return Err(ThreadHostError::validation(format!("thread {thread_id} is already archived")));
        }

        if thread.git.is_worktree {
            if let (Some(work_dir), Some(repo_root)) =
                (thread.work_dir.as_deref(), work_dir_repo_root(thread.work_dir.as_deref()))
            {
                worktree::remove_worktree(&repo_root, work_dir, thread.git.worktree_branch.as_deref()).await;
            }
        }

        self.rendezvous.clear(thread_id);
        self.bus.close_thread(thread_id);
        self.notifications.cancel_parent(thread_id);
        self.tasks.cancel(thread_id);
        self.store.clear_thread_events(thread_id)?;
        self.store.archive_thread(thread_id)?;
        self.publish(thread_id, ThreadEvent::ThreadArchived { thread_id: thread_id.to_string() }).await;
        Ok(())
    }

    pub async fn unarchive(&self, thread_id: &str) -> Result<()> {
        self.store.unarchive_thread(thread_id)?;
        self.publish(thread_id, ThreadEvent::ThreadUnarchived { thread_id: thread_id.to_string() }).await;
        Ok(())
    }

    /// Watchdog entry point (§4.7): the watchdog has already marked `child`
    /// needs-attention and published `error`/`status_change` on its own
    /// stream; this drives the same parent-escalation pathway a crashed or
    /// timed-out turn would have taken.
    pub async fn escalate_watchdog_timeout(&self, child: &Thread, reason: String) {
        self.notify_parent(child, ThreadStatus::NeedsAttention, Some(reason), false).await;
    }

    /// §4.5.3: build and enqueue the synthetic completion/error notification
    /// for `child`'s parent. Shared by [`ParentLink::on_terminal`] and the
    /// Watchdog (SPEC_FULL: the watchdog escalates through "the usual
    /// parent notification pathway").
    async fn notify_parent(&self, child: &Thread, status: ThreadStatus, reason: Option<String>, already_signaled: bool) {
        let Some(parent_id) = &child.parent_id else { return };

        if !already_signaled {
            self.publish(
                parent_id,
                ThreadEvent::SubthreadStatus { thread_id: child.id.clone(), title: child.title.clone(), status, reason: reason.clone() },
            )
            .await;
        }

        let notification_text = match (&reason, status) {
            (Some(msg), _) => format!("[notification] Sub-thread \"{}\" encountered an error: {msg}.", child.title),
            (None, ThreadStatus::NeedsAttention) => format!("[notification] Sub-thread \"{}\" needs attention.", child.title),
            (None, _) => format!("[notification] Sub-thread \"{}\" completed.", child.title),
        };
        match self.store.add_message(parent_id, MessageRole::User, &notification_text, None) {
            Ok(message) => self.publish(parent_id, ThreadEvent::Message { message }).await,
            Err(e) => warn!(parent_id, error = %e, "failed to persist parent notification message"),
        }

        let auto_react = self.store.get_thread(parent_id).ok().flatten().map(|p| p.auto_react).unwrap_or(false);
        if auto_react {
            self.notifications.enqueue(parent_id, "Please review the sub-thread update above and continue.".to_string());
        }
    }
}

fn work_dir_repo_root(work_dir: Option<&str>) -> Option<String> {
    let work_dir = work_dir?;
    worktree::repo_root_of_worktree(work_dir).map(|p| p.to_string_lossy().into_owned())
}

impl ParentLink for Orchestrator {
    /// §4.5.4: records the signal and publishes `subthread_status` carrying
    /// the agent's own reason text directly — unlike [`Orchestrator::notify_parent`],
    /// no synthetic message is persisted here; that happens once, at the
    /// turn's eventual termination, deduplicated via `already_signaled`.
    fn on_signal_status<'a>(&'a self, child: &'a Thread, status: ThreadStatus, reason: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(parent_id) = &child.parent_id else {
                return Err(ThreadHostError::validation(format!("thread {} has no parent to signal", child.id)));
            };
            self.store.update_thread_status(&child.id, status)?;
            self.publish(
                parent_id,
                ThreadEvent::SubthreadStatus { thread_id: child.id.clone(), title: child.title.clone(), status, reason: Some(reason) },
            )
            .await;
            Ok(())
        })
    }

    fn on_terminal<'a>(
        &'a self,
        child: &'a Thread,
        status: ThreadStatus,
        reason: Option<String>,
        already_signaled: bool,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.notify_parent(child, status, reason, already_signaled).await })
    }
}

impl NotificationTarget for Orchestrator {
    /// §4.6: drains one notification for a parent by invoking a fresh turn
    /// on it; the message is already persisted by [`Orchestrator::notify_parent`]
    /// so the turn only needs a synthetic prompt to resume on.
    fn run_notification<'a>(&'a self, parent_id: String, notification: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut request = RunTurnRequest::new(parent_id.clone(), notification);
            request.skip_add_user_message = true;
            if let Err(e) = self.engine.run_turn(request, &NoParentLink).await {
                warn!(parent_id, error = %e, "notification-driven turn ended in error");
            }
        })
    }
}

impl AgentToolRegistry for Orchestrator {
    fn broadcast_status_signal<'a>(
        &'a self,
        child_id: &'a str,
        status: ThreadStatus,
        reason: String,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let child = self.require_thread(child_id)?;
            self.on_signal_status(&child, status, reason).await
        })
    }

    fn send_to_thread<'a>(&'a self, source_id: &'a str, target_id: &'a str, message: String) -> BoxFuture<'a, Result<Thread>> {
        Box::pin(async move {
            self.send_limiter.check_and_record(source_id)?;
            let target = self.require_thread(target_id)?;
            if target.parent_id.as_deref() != Some(source_id) {
                return Err(ThreadHostError::validation(format!("thread {target_id} is not a child of {source_id}")));
            }
            if target.archived_at.is_some() {
                return Err(ThreadHostError::validation(format!("thread {target_id} is archived")));
            }
            let engine = Arc::clone(&self.engine);
            let target_id_owned = target_id.to_string();
            tokio::spawn(async move {
                let mut request = RunTurnRequest::new(target_id_owned, message);
                request.skip_add_user_message = false;
                if let Err(e) = engine.run_turn(request, &NoParentLink).await {
                    warn!(error = %e, "SendToThread-driven turn ended in error");
                }
            });
            Ok(target)
        })
    }

    fn spawn_thread<'a>(&'a self, parent_id: &'a str, args: SpawnThreadArgs) -> BoxFuture<'a, Result<Thread>> {
        Box::pin(async move {
            let request = SpawnChildRequest {
                title: args.title,
                work_dir: args.work_dir,
                initial_message: args.initial_message,
                model: args.model,
                permission_mode: args.permission_mode,
                extended_thinking: args.extended_thinking,
                use_worktree: false,
            };
            self.spawn_child_without_arc(parent_id, request).await
        })
    }

    fn list_threads<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Thread>>> {
        Box::pin(async move { self.store.list_threads(false) })
    }

    fn archive_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.archive(thread_id).await })
    }

    fn read_thread<'a>(&'a self, thread_id: &'a str, limit: Option<usize>) -> BoxFuture<'a, Result<Vec<crate::model::Message>>> {
        Box::pin(async move {
            self.require_thread(thread_id)?;
            let page = self.store.get_messages_paginated(thread_id, limit.unwrap_or(50).min(100), 0)?;
            Ok(page.messages)
        })
    }
}

impl Orchestrator {
    /// The `SpawnThread` tool path: unlike [`Orchestrator::spawn_child`],
    /// `AgentToolRegistry` is only ever called with `&self` (it is stored
    /// as `Arc<dyn AgentToolRegistry>` by the driver, which hands the
    /// engine a plain reference), so the initial turn here is backgrounded
    /// off a cloned `Arc<ExecutionEngine>` directly instead of `Arc<Self>`.
    /// Escalation for that backgrounded turn therefore uses `NoParentLink`
    /// rather than full parent escalation — acceptable because a
    /// `SpawnThread`-created child is not ephemeral but the calling thread
    /// already holds the authoritative relationship via `parent_id`, and
    /// completion notification is driven by the watchdog/engine's normal
    /// `needs-attention` path on the child itself if this fire-and-forget
    /// turn never completes.
    async fn spawn_child_without_arc(&self, parent_id: &str, request: SpawnChildRequest) -> Result<Thread> {
        let parent = self.require_thread(parent_id)?;
        if !self.can_spawn(&parent)? {
            return Err(ThreadHostError::depth_exceeded(format!("thread {parent_id} cannot spawn further children")));
        }

        let work_dir = request.work_dir.or_else(|| parent.work_dir.clone());
        let new_thread = NewThread {
            title: request.title,
            parent_id: Some(parent_id.to_string()),
            work_dir,
            model: request.model.or_else(|| Some(parent.model.clone())),
            permission_mode: request.permission_mode.or(Some(parent.permission_mode)),
            extended_thinking: request.extended_thinking.or(Some(parent.extended_thinking)),
            auto_react: Some(true),
            allow_nested_subthreads: Some(false),
            max_thread_depth: Some(1),
            is_ephemeral: false,
            id: None,
        };
        let child = self.store.create_thread(new_thread)?;

        if let Some(initial_message) = &request.initial_message {
            let message = self.store.add_message(&child.id, MessageRole::User, initial_message, None)?;
            self.publish(&child.id, ThreadEvent::Message { message }).await;
        }
        self.publish(parent_id, ThreadEvent::ThreadCreated { thread: child.clone() }).await;

        if let Some(initial_message) = request.initial_message {
            let engine = Arc::clone(&self.engine);
            let child_id = child.id.clone();
            tokio::spawn(async move {
                let mut req = RunTurnRequest::new(child_id, initial_message);
                req.skip_add_user_message = true;
                if let Err(e) = engine.run_turn(req, &NoParentLink).await {
                    warn!(error = %e, "SpawnThread-tool child turn ended in error");
                }
            });
        }

        Ok(child)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
