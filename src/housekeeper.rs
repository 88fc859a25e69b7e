// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic event-log trimming (§4.8): keeps the durable `events` table from
//! growing unbounded by deleting rows older than the configured retention
//! window. Trimming never renumbers surviving rows, so reconnect replay via
//! `since_seq` stays correct for events still in range.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::store::Store;

pub struct Housekeeper {
    store: Arc<Store>,
    config: Arc<Config>,
    cancel: CancellationToken,
}

impl Housekeeper {
    pub fn new(store: Arc<Store>, config: Arc<Config>) -> Self {
        Self { store, config, cancel: CancellationToken::new() }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Periodic trim loop; returns once `stop()` is called.
    pub async fn run(&self) {
        let interval = self.config.housekeeper_interval();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("housekeeper stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.trim_once();
                }
            }
        }
    }

    /// One trim pass, exposed separately so tests can drive it deterministically.
    pub fn trim_once(&self) {
        let retention_ms = self.config.event_retention().as_millis() as i64;
        match self.store.trim_events_older_than(retention_ms) {
            Ok(0) => {}
            Ok(trimmed) => info!(trimmed, "housekeeper trimmed old events"),
            Err(e) => warn!(error = %e, "housekeeper failed to trim events"),
        }
    }
}

#[cfg(test)]
#[path = "housekeeper_tests.rs"]
mod tests;
