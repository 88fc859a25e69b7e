// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message CRUD plus the two rendezvous-resolving endpoints, `answer` and
//! `plan-action` (§4.3, §6). The actual prompting and blocking happens
//! inside the external [`crate::driver::AgentDriver`] via the `Rendezvous`
//! handle threaded through its `TurnContext`; these handlers only ever
//! resolve the slot the driver is waiting on.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::model::MessageRole;
use crate::transport::dto::{AnswerRequest, MessagesQuery, PlanActionKind, PlanActionRequest, PostMessageRequest, PostMessageResponse};
use crate::transport::state::AppState;

pub async fn list_messages(State(state): State<Arc<AppState>>, Path(id): Path<String>, Query(q): Query<MessagesQuery>) -> impl IntoResponse {
    match state.app.store.get_messages_paginated(&id, q.limit, q.offset) {
        Ok(page) => Json(page.messages).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Synchronous per §6: the caller streams progress from `/stream` and this
/// call only resolves once the turn is finished (or fails).
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> impl IntoResponse {
    match state.app.orchestrator.send_message(&id, &req.content, req.images, &req.file_references).await {
        Ok(_) => Json(PostMessageResponse { status: "ok" }).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_messages(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.store.clear_thread_messages(&id) {
        Ok(()) => {
            state.app.bus.publish(&id, crate::event::ThreadEvent::MessagesCleared { thread_id: id.clone() }).await.ok();
            axum::http::StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn answer(State(state): State<Arc<AppState>>, Path(id): Path<String>, Json(req): Json<AnswerRequest>) -> impl IntoResponse {
    state.app.rendezvous.resolve(&id, req.answers);
    axum::http::StatusCode::NO_CONTENT.into_response()
}

pub async fn plan_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PlanActionRequest>,
) -> impl IntoResponse {
    let action_str = match req.action {
        PlanActionKind::Proceed => "proceed",
        PlanActionKind::Modify => "modify",
        PlanActionKind::Compact => "compact",
    };
    let response = serde_json::json!({
        "action": action_str,
        "permission_mode": req.permission_mode,
    });
    state.app.rendezvous.resolve(&id, response);

    if req.action == PlanActionKind::Compact {
        if let Err(e) = state.app.store.clear_thread_messages(&id) {
            return e.into_response();
        }
        let summary = "[Context compacted by user request. Previous conversation history has been cleared.]";
        match state.app.store.add_message(&id, MessageRole::System, summary, None) {
            Ok(message) => {
                state.app.bus.publish(&id, crate::event::ThreadEvent::MessagesCleared { thread_id: id.clone() }).await.ok();
                state.app.bus.publish(&id, crate::event::ThreadEvent::Message { message }).await.ok();
            }
            Err(e) => return e.into_response(),
        }
    }

    axum::http::StatusCode::NO_CONTENT.into_response()
}
