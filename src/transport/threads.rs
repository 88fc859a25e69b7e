// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread CRUD, lifecycle, and introspection endpoints (§6): listing,
//! creation, status/config/title patches, archive/unarchive/stop, token
//! estimation, usage aggregation, and work-dir file listing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ThreadHostError;
use crate::files;
use crate::model::{NewThread, Thread};
use crate::orchestrator::SpawnChildRequest;
use crate::store;
use crate::transport::dto::{
    CreateThreadRequest, FileEntryDto, FilesQuery, FilesResponse, ListThreadsQuery, PatchConfigRequest,
    PatchStatusRequest, PatchTitleRequest, ResetAllQuery, TokensResponse, UsageResponse,
};
use crate::transport::state::AppState;

pub async fn list_threads(State(state): State<Arc<AppState>>, Query(q): Query<ListThreadsQuery>) -> impl IntoResponse {
    match state.app.store.list_threads(q.include_archived) {
        Ok(threads) => Json(threads).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.store.get_thread(&id) {
        Ok(Some(thread)) => Json(thread).into_response(),
        Ok(None) => ThreadHostError::not_found(format!("thread {id} not found")).into_response(),
        Err(e) => e.into_response(),
    }
}

/// A top-level thread is created directly against the Store; a child thread
/// (`parent_id` set) goes through [`crate::orchestrator::Orchestrator::spawn_child`]
/// so depth gating, worktree isolation, and the initial-message turn all apply.
pub async fn create_thread(State(state): State<Arc<AppState>>, Json(req): Json<CreateThreadRequest>) -> impl IntoResponse {
    if let Some(depth) = req.max_thread_depth {
        if !(1..=5).contains(&depth) {
            return ThreadHostError::validation("max_thread_depth must be in 1..=5").into_response();
        }
    }

    if let Some(parent_id) = &req.parent_id {
        let request = SpawnChildRequest {
            title: req.title,
            work_dir: req.work_dir,
            initial_message: req.initial_message,
            model: req.model,
            permission_mode: req.permission_mode,
            extended_thinking: req.extended_thinking,
            use_worktree: req.use_worktree,
        };
        return match state.app.orchestrator.spawn_child(parent_id, request).await {
            Ok(thread) => (axum::http::StatusCode::CREATED, Json(thread)).into_response(),
            Err(e) => e.into_response(),
        };
    }

    let new_thread = NewThread {
        title: req.title,
        parent_id: None,
        work_dir: req.work_dir,
        model: req.model,
        permission_mode: req.permission_mode,
        extended_thinking: req.extended_thinking,
        auto_react: Some(true),
        allow_nested_subthreads: req.allow_nested_subthreads,
        max_thread_depth: req.max_thread_depth,
        is_ephemeral: false,
        id: None,
    };
    // `use_worktree` only applies to a child spawned from an existing git
    // checkout; a bare top-level thread has nothing to isolate from.
    match state.app.store.create_thread(new_thread) {
        Ok(thread) => match start_initial_message(&state, thread, req.initial_message).await {
            Ok(thread) => (axum::http::StatusCode::CREATED, Json(thread)).into_response(),
            Err(e) => e.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

async fn start_initial_message(state: &Arc<AppState>, thread: Thread, initial_message: Option<String>) -> crate::error::Result<Thread> {
    let Some(content) = initial_message else { return Ok(thread) };
    let orchestrator = Arc::clone(&state.app.orchestrator);
    let thread_id = thread.id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.send_message(&thread_id, &content, Vec::new(), &[]).await {
            tracing::warn!(thread_id, error = %e, "initial message turn ended in error");
        }
    });
    Ok(thread)
}

pub async fn patch_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchStatusRequest>,
) -> impl IntoResponse {
    match state.app.store.update_thread_status(&id, req.status) {
        Ok(()) => {
            state.app.bus.publish(&id, crate::event::ThreadEvent::StatusChange { status: req.status }).await.ok();
            axum::http::StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn patch_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchConfigRequest>,
) -> impl IntoResponse {
    let patch_json = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    match state.app.store.update_thread_config(&id, req) {
        Ok(()) => {
            state.app.bus.publish(&id, crate::event::ThreadEvent::ConfigChange { field: "config".to_string(), value: patch_json }).await.ok();
            axum::http::StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn patch_title(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchTitleRequest>,
) -> impl IntoResponse {
    match state.app.store.update_thread_title(&id, &req.title) {
        Ok(()) => {
            state.app.bus.publish(&id, crate::event::ThreadEvent::TitleChange { title: req.title }).await.ok();
            axum::http::StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn archive_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.orchestrator.archive(&id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn unarchive_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.orchestrator.unarchive(&id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn stop_thread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.orchestrator.stop(&id) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn tokens(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.store.get_messages_paginated(&id, 100, 0) {
        Ok(page) => Json(TokensResponse { estimated_tokens: store::estimate_thread_tokens(&page.messages) }).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn usage(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.app.store.thread_usage_with_children(&id) {
        Ok(usage) => Json(UsageResponse { usage }).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_files(State(state): State<Arc<AppState>>, Path(id): Path<String>, Query(q): Query<FilesQuery>) -> impl IntoResponse {
    let thread = match state.app.store.get_thread(&id) {
        Ok(Some(thread)) => thread,
        Ok(None) => return ThreadHostError::not_found(format!("thread {id} not found")).into_response(),
        Err(e) => return e.into_response(),
    };
    let Some(work_dir) = thread.work_dir else {
        return Json(FilesResponse { files: Vec::new() }).into_response();
    };
    let limit = q.limit.min(100);
    let query = q.query;
    match tokio::task::spawn_blocking(move || files::list_files(&work_dir, query.as_deref(), limit)).await {
        Ok(Ok(entries)) => {
            let files = entries.into_iter().map(|e| FileEntryDto { path: e.path, is_dir: e.is_dir }).collect();
            Json(FilesResponse { files }).into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(_) => ThreadHostError::infrastructure("file listing task panicked").into_response(),
    }
}

/// `DELETE /threads/all?confirm=true` (§6): wipes every thread, message, and
/// event. Refuses without the explicit `confirm` flag to guard against an
/// accidental call.
pub async fn reset_all(State(state): State<Arc<AppState>>, Query(q): Query<ResetAllQuery>) -> impl IntoResponse {
    if !q.confirm {
        return ThreadHostError::validation("reset requires confirm=true").into_response();
    }
    let threads = match state.app.store.list_threads(true) {
        Ok(threads) => threads,
        Err(e) => return e.into_response(),
    };
    match state.app.store.reset_all_threads() {
        Ok(()) => {
            for thread in threads {
                state.app.bus.close_thread(&thread.id);
            }
            axum::http::StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}
