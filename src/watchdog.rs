// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detects and recovers threads whose agent process died silently (§4.7).
//!
//! Every scan interval, every non-archived thread in status `running` whose
//! `updated_at` is older than `AGENT_TIMEOUT + 60s` is presumed stuck: its
//! status is set to `needs-attention`, an `error` then `status_change` event
//! is published, and — if it has a parent — the usual parent-notification
//! pathway runs. This is the backstop named in §7: "A thread never remains
//! in `pending` or `running` after a failure unless the process died between
//! event and status commit — the Watchdog is the net."

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::event::ThreadEvent;
use crate::event_bus::EventBus;
use crate::model::ThreadStatus;
use crate::orchestrator::Orchestrator;
use crate::store::Store;

const WATCHDOG_GRACE: std::time::Duration = std::time::Duration::from_secs(60);

pub struct Watchdog {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    orchestrator: Arc<Orchestrator>,
    config: Arc<Config>,
    cancel: CancellationToken,
}

impl Watchdog {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, orchestrator: Arc<Orchestrator>, config: Arc<Config>) -> Self {
        Self { store, bus, orchestrator, config, cancel: CancellationToken::new() }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Periodic scan loop; returns once `stop()` is called.
    pub async fn run(&self) {
        let interval = self.config.watchdog_interval();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("watchdog stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.scan_once().await;
                }
            }
        }
    }

    /// One scan pass, exposed separately so tests can drive it deterministically.
    pub async fn scan_once(&self) {
        let threads = match self.store.list_threads(false) {
            Ok(threads) => threads,
            Err(e) => {
                warn!(error = %e, "watchdog failed to list threads");
                return;
            }
        };

        let timeout_ms = self.config.agent_timeout_secs as i64 * 1000 + WATCHDOG_GRACE.as_millis() as i64;
        let now = now_ms();

        for thread in threads {
            if thread.status != ThreadStatus::Running {
                continue;
            }
            if now - thread.updated_at <= timeout_ms {
                continue;
            }

            let stuck_secs = (now - thread.updated_at) / 1000;
            warn!(thread_id = %thread.id, stuck_secs, "watchdog recovering thread stuck in running");

            if let Err(e) = self.store.update_thread_status(&thread.id, ThreadStatus::NeedsAttention) {
                warn!(thread_id = %thread.id, error = %e, "watchdog failed to update thread status");
                continue;
            }

            let message = format!(
                "Process appears to have died: thread stuck in 'running' for {stuck_secs}s, you can retry."
            );
            if let Err(e) = self.bus.publish(&thread.id, ThreadEvent::Error { error: message.clone() }).await {
                warn!(thread_id = %thread.id, error = %e, "watchdog failed to publish error event");
            }
            if let Err(e) = self
                .bus
                .publish(&thread.id, ThreadEvent::StatusChange { status: ThreadStatus::NeedsAttention })
                .await
            {
                warn!(thread_id = %thread.id, error = %e, "watchdog failed to publish status_change event");
            }

            if thread.parent_id.is_some() {
                self.orchestrator.escalate_watchdog_timeout(&thread, message).await;
            }
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
