// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive-prompt rendezvous (§4.3): at most one outstanding prompt per
//! thread. The agent coroutine installs a slot and awaits it with a timeout;
//! an external caller (the HTTP answer/plan-action endpoints) resolves it.
//!
//! A typed condition variable with a slot, rather than a coroutine/callback
//! wired through a global registry: each slot is a `tokio::sync::Notify`
//! paired with a place to stash the response, guarded by one mutex per
//! thread so installation and resolution never race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{Result, ThreadHostError};

pub const QUESTION_TIMEOUT: Duration = Duration::from_secs(300);
pub const PLAN_APPROVAL_TIMEOUT: Duration = Duration::from_secs(600);

struct Slot {
    notify: Arc<Notify>,
    response: Mutex<Option<Value>>,
}

#[derive(Default)]
pub struct Rendezvous {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a slot for `thread_id` and wait up to `timeout` for a response.
    /// Fails with `already-pending` if a slot already exists. Returns `None`
    /// on timeout. The slot is always removed before returning.
    pub async fn await_response(&self, thread_id: &str, timeout: Duration) -> Result<Option<Value>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            if slots.contains_key(thread_id) {
                return Err(ThreadHostError::already_pending(format!(
                    "thread {thread_id} already has a pending prompt"
                )));
            }
            let slot = Arc::new(Slot { notify: Arc::new(Notify::new()), response: Mutex::new(None) });
            slots.insert(thread_id.to_string(), Arc::clone(&slot));
            slot
        };

        let result = tokio::time::timeout(timeout, slot.notify.notified()).await;
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).remove(thread_id);

        match result {
            Ok(()) => Ok(slot.response.lock().unwrap_or_else(|p| p.into_inner()).take()),
            Err(_) => Ok(None),
        }
    }

    /// Resolve the pending slot for `thread_id`, if any. Logs and drops a
    /// late response with no matching slot.
    pub fn resolve(&self, thread_id: &str, response: Value) {
        let slot = self.slots.lock().unwrap_or_else(|p| p.into_inner()).get(thread_id).cloned();
        match slot {
            Some(slot) => {
                *slot.response.lock().unwrap_or_else(|p| p.into_inner()) = Some(response);
                slot.notify.notify_one();
            }
            None => warn!(thread_id, "dropping late prompt response with no pending slot"),
        }
    }

    /// Fire the signal with no response and remove the slot. Used on archive.
    pub fn clear(&self, thread_id: &str) {
        if let Some(slot) = self.slots.lock().unwrap_or_else(|p| p.into_inner()).remove(thread_id) {
            slot.notify.notify_one();
            debug!(thread_id, "cleared pending prompt slot");
        }
    }

    pub fn has_pending(&self, thread_id: &str) -> bool {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).contains_key(thread_id)
    }
}

#[cfg(test)]
#[path = "rendezvous_tests.rs"]
mod tests;
