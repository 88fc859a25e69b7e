// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-thread pub/sub, durable through the Store, with reconnect replay (§4.2).
//!
//! Each thread gets a lazily-created `broadcast` channel. `publish` writes
//! through Store to obtain the seq-id before fanning out, so subscribers
//! always see events numbered consistently with what reconnecting clients
//! will replay. A subscriber that falls behind its bounded buffer is closed
//! rather than silently skipped ahead — the caller re-subscribes with
//! `since_seq` to pick up the gap from the durable log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Result, ThreadHostError};
use crate::event::{SeqEvent, ThreadEvent};
use crate::store::Store;

const CHANNEL_CAPACITY: usize = 512;

pub struct EventBus {
    store: Arc<Store>,
    channels: Mutex<HashMap<String, broadcast::Sender<SeqEvent>>>,
}

/// A live subscription: the synthetic `connected` event, the durable backlog
/// since the caller's last-seen seq, and a receiver for events published
/// from this point on.
pub struct Subscription {
    pub connected: ThreadEvent,
    pub backlog: Vec<SeqEvent>,
    pub receiver: broadcast::Receiver<SeqEvent>,
}

/// What a subscription consumer loop should do with a `recv()` outcome.
pub enum RecvOutcome {
    Delivered(SeqEvent),
    /// The subscriber fell behind; it must be closed (spec §4.2: overflow
    /// closes that subscriber only, it never silently skips ahead).
    Overflowed,
    Closed,
}

impl EventBus {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, channels: Mutex::new(HashMap::new()) }
    }

    fn sender_for(&self, thread_id: &str) -> broadcast::Sender<SeqEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(thread_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Persist `event` through Store, obtaining its seq-id, then fan it out
    /// to every current subscriber of `thread_id`. Non-blocking from the
    /// publisher's standpoint: a lagging subscriber never backs up the send.
    pub async fn publish(&self, thread_id: &str, event: ThreadEvent) -> Result<u64> {
        let store = Arc::clone(&self.store);
        let type_tag = event.type_tag().to_string();
        let payload = serde_json::to_string(&event)
            .map_err(|e| ThreadHostError::infrastructure(format!("failed to serialize event: {e}")))?;
        let thread_id_owned = thread_id.to_string();
        let seq = tokio::task::spawn_blocking(move || store.append_event(&thread_id_owned, &type_tag, &payload))
            .await
            .map_err(|e| ThreadHostError::infrastructure(format!("store append_event task panicked: {e}")))??;

        let seq_event = SeqEvent {
            seq,
            thread_id: thread_id.to_string(),
            event,
            created_at: now_ms(),
        };
        let sender = self.sender_for(thread_id);
        // Err(SendError) only happens with zero receivers; that's fine, the
        // event is durable and will be replayed to future subscribers.
        let _ = sender.send(seq_event);
        Ok(seq)
    }

    /// Subscribe to `thread_id`, replaying everything since `since_seq`
    /// (`None` replays the whole retained log) before live events.
    pub fn subscribe(&self, thread_id: &str, since_seq: Option<u64>) -> Result<Subscription> {
        let sender = self.sender_for(thread_id);
        let receiver = sender.subscribe();
        let rows = self.store.events_since(thread_id, since_seq.unwrap_or(0))?;
        let backlog = rows
            .into_iter()
            .filter_map(|(seq, tid, event_type, data, created_at)| {
                match serde_json::from_str::<ThreadEvent>(&data) {
                    Ok(event) => Some(SeqEvent { seq, thread_id: tid, event, created_at }),
                    Err(e) => {
                        warn!(event_type, error = %e, "dropping unparseable stored event");
                        None
                    }
                }
            })
            .collect();
        Ok(Subscription {
            connected: ThreadEvent::Connected { thread_id: thread_id.to_string() },
            backlog,
            receiver,
        })
    }

    /// Signal every current subscriber of `thread_id` to terminate and drop
    /// the channel so later subscribers start fresh.
    pub fn close_thread(&self, thread_id: &str) {
        let sender = self.sender_for(thread_id);
        let _ = sender.send(SeqEvent {
            seq: 0,
            thread_id: thread_id.to_string(),
            event: ThreadEvent::Shutdown {},
            created_at: now_ms(),
        });
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        channels.remove(thread_id);
        debug!(thread_id, "closed event bus channel");
    }
}

/// Advance a subscriber's broadcast receiver by one step, mapping lag into
/// an explicit close rather than a silent skip.
pub async fn recv_one(receiver: &mut broadcast::Receiver<SeqEvent>) -> RecvOutcome {
    match receiver.recv().await {
        Ok(event) => RecvOutcome::Delivered(event),
        Err(broadcast::error::RecvError::Lagged(_)) => RecvOutcome::Overflowed,
        Err(broadcast::error::RecvError::Closed) => RecvOutcome::Closed,
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
