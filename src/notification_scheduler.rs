// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-parent FIFO notification queue, drained by one lazily-started worker
//! per parent (§4.6). Never drops a notification; at most one in-flight per
//! parent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::execution_engine::BoxFuture;

/// What a parent-completion notification is delivered to. Implemented by
/// `Orchestrator`; kept as a trait here so this module never has to import
/// it and the two can be wired together after both are constructed (§9:
/// no cyclic language-level references, only an id/handle indirection).
pub trait NotificationTarget: Send + Sync {
    fn run_notification<'a>(&'a self, parent_id: String, notification: String) -> BoxFuture<'a, ()>;
}

struct Queue {
    sender: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

pub struct NotificationScheduler {
    queues: Mutex<HashMap<String, Queue>>,
    target: OnceLock<Arc<dyn NotificationTarget>>,
}

impl Default for NotificationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationScheduler {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()), target: OnceLock::new() }
    }

    /// Wire the delivery target. Must be called exactly once, before the
    /// first `enqueue`.
    pub fn wire_target(&self, target: Arc<dyn NotificationTarget>) {
        let _ = self.target.set(target);
    }

    /// Enqueue a notification for `parent_id`, starting its worker if this
    /// is the parent's first pending notification.
    pub fn enqueue(&self, parent_id: &str, notification: String) {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(queue) = queues.get(parent_id) {
            if queue.sender.send(notification).is_err() {
                warn!(parent_id, "notification worker gone, dropping silently lost queue entry");
            }
            return;
        }
        let Some(target) = self.target.get().cloned() else {
            warn!(parent_id, "notification scheduler has no wired target, dropping notification");
            return;
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let _ = sender.send(notification);
        queues.insert(parent_id.to_string(), Queue { sender, cancel: cancel.clone() });
        let parent_owned = parent_id.to_string();
        tokio::spawn(run_worker(parent_owned, receiver, cancel, target));
    }

    /// Cancel and remove `parent_id`'s queue and worker (used on archive).
    pub fn cancel_parent(&self, parent_id: &str) {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(queue) = queues.remove(parent_id) {
            queue.cancel.cancel();
        }
    }

    /// Cancel every worker. Used on shutdown.
    pub fn cancel_all(&self) {
        let queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        for queue in queues.values() {
            queue.cancel.cancel();
        }
    }

    pub fn has_pending(&self, parent_id: &str) -> bool {
        self.queues.lock().unwrap_or_else(|p| p.into_inner()).contains_key(parent_id)
    }
}

async fn run_worker(
    parent_id: String,
    mut receiver: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    target: Arc<dyn NotificationTarget>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(parent_id, "notification worker cancelled");
                break;
            }
            next = receiver.recv() => {
                match next {
                    Some(notification) => target.run_notification(parent_id.clone(), notification).await,
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "notification_scheduler_tests.rs"]
mod tests;
