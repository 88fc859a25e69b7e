// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One cancellable handle per running thread (§2, §5). Registration is
//! idempotent: registering a new handle for a thread cancels and replaces
//! whatever was previously registered before the call returns, so "at most
//! one active turn per thread" holds without a separate locking protocol.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

struct TaskHandle {
    cancel: CancellationToken,
    generation: u64,
}

/// Opaque proof of a single registration, returned by [`TaskRegistry::register`].
/// Pass it to [`TaskRegistry::deregister`] so a stale completion can never
/// evict a handle that has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTicket {
    generation: u64,
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskHandle>>,
    next_generation: Mutex<u64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cancellation token for `thread_id`, cancelling any
    /// prior registration first. Returns the new token plus a ticket
    /// identifying this exact registration.
    pub fn register(&self, thread_id: &str) -> (CancellationToken, RegistrationTicket) {
        let token = CancellationToken::new();
        let generation = {
            let mut next = self.next_generation.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            *next
        };
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(prev) = tasks.remove(thread_id) {
            prev.cancel.cancel();
        }
        tasks.insert(thread_id.to_string(), TaskHandle { cancel: token.clone(), generation });
        (token, RegistrationTicket { generation })
    }

    /// Cancel the thread's current task, if any. Idempotent.
    pub fn cancel(&self, thread_id: &str) {
        if let Some(handle) = self.tasks.lock().unwrap_or_else(|p| p.into_inner()).get(thread_id) {
            handle.cancel.cancel();
        }
    }

    /// Deregister `thread_id` once its turn has finished, so a completed
    /// run doesn't linger as a stale entry. No-op if `ticket` no longer
    /// matches the current registration (it was already replaced).
    pub fn deregister(&self, thread_id: &str, ticket: RegistrationTicket) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = tasks.get(thread_id) {
            if handle.generation == ticket.generation {
                tasks.remove(thread_id);
            }
        }
    }

    pub fn is_registered(&self, thread_id: &str) -> bool {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).contains_key(thread_id)
    }

    /// Cancel every registered task. Used on shutdown.
    pub fn cancel_all(&self) {
        let tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        for handle in tasks.values() {
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "task_registry_tests.rs"]
mod tests;
