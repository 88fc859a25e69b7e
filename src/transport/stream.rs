// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /threads/{id}/stream` (§4.2, §6): SSE delivery of a thread's event
//! log, replaying everything since `last_event_id` before switching to live
//! broadcast, with a 30s heartbeat comment so idle clients/proxies see the
//! connection is still alive.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::event::SeqEvent;
use crate::transport::dto::StreamQuery;
use crate::transport::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn to_sse_event(seq_event: SeqEvent) -> Event {
    let data = serde_json::to_string(&seq_event.event).unwrap_or_else(|_| "{}".to_string());
    Event::default().id(seq_event.seq.to_string()).event(seq_event.event.type_tag()).data(data)
}

pub async fn stream_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<StreamQuery>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let last_event_id = q.last_event_id.or_else(|| {
        headers.get("last-event-id").and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok())
    });

    let subscription = match state.app.bus.subscribe(&id, last_event_id) {
        Ok(subscription) => subscription,
        Err(e) => return e.into_response(),
    };

    let connected = stream::once(async move { to_sse_event(SeqEvent { seq: 0, thread_id: id.clone(), event: subscription.connected, created_at: 0 }) });
    let backlog = stream::iter(subscription.backlog.into_iter().map(to_sse_event));
    let live = BroadcastStream::new(subscription.receiver).filter_map(|result| async move {
        match result {
            Ok(seq_event) => Some(to_sse_event(seq_event)),
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });

    let events = connected.chain(backlog).chain(live).map(Ok::<_, Infallible>);
    Sse::new(events).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")).into_response()
}
