// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxiliary, thread-independent endpoints (§6): liveness, metrics, process
//! stats, wall-clock time, working directory helpers for the UI's launch
//! dialog, and best-effort git detection.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ThreadHostError;
use crate::model::ThreadStatus;
use crate::transport::dto::{
    BrowseQuery, BrowseResponse, CwdResponse, DirectorySuggestionsQuery, DirectoriesResponse, FileEntryDto, GitInfoResponse, HealthResponse,
    StatsResponse, TimeResponse,
};
use crate::transport::state::AppState;
use crate::worktree;

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Plain-text Prometheus-style exposition of a handful of gauges; the
/// control plane has no ambition to be a full metrics backend (§6 lists no
/// metrics library, and none of the teacher stack's dependents pull one in).
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let threads = state.app.store.list_threads(false).unwrap_or_default();
    let running = threads.iter().filter(|t| t.status == ThreadStatus::Running).count();
    let body = format!(
        "# HELP threadhost_threads_total Number of non-archived threads.\n\
         # TYPE threadhost_threads_total gauge\n\
         threadhost_threads_total {}\n\
         # HELP threadhost_running_agents Number of threads currently running an agent.\n\
         # TYPE threadhost_running_agents gauge\n\
         threadhost_running_agents {}\n",
        threads.len(),
        running,
    );
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let threads = state.app.store.list_threads(false).unwrap_or_default();
    let active_agent_count = threads.iter().filter(|t| matches!(t.status, ThreadStatus::Running | ThreadStatus::Pending)).count();
    Json(StatsResponse {
        thread_count: threads.len(),
        active_agent_count,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn time() -> impl IntoResponse {
    let unix_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
    Json(TimeResponse { unix_ms })
}

pub async fn cwd() -> impl IntoResponse {
    match std::env::current_dir() {
        Ok(path) => Json(CwdResponse { cwd: path.to_string_lossy().into_owned() }).into_response(),
        Err(e) => ThreadHostError::infrastructure(e.to_string()).into_response(),
    }
}

/// List immediate subdirectories of `path` (defaulting to the process cwd),
/// for a launch dialog's directory picker.
pub async fn browse(Query(q): Query<BrowseQuery>) -> impl IntoResponse {
    let path = q.path.unwrap_or_else(|| ".".to_string());
    let read_dir = match std::fs::read_dir(&path) {
        Ok(entries) => entries,
        Err(e) => return ThreadHostError::validation(format!("cannot browse {path}: {e}")).into_response(),
    };
    let mut entries = Vec::new();
    for entry in read_dir.flatten() {
        let is_dir = entry.path().is_dir();
        entries.push(FileEntryDto { path: entry.file_name().to_string_lossy().into_owned(), is_dir });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Json(BrowseResponse { path, entries }).into_response()
}

/// Distinct work directories recently used by any thread, most-recent first
/// (SPEC_FULL supplement: populates the new-thread dialog's recents list).
pub async fn directories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.app.store.recent_work_dirs(20) {
        Ok(directories) => Json(DirectoriesResponse { directories }).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn directories_suggestions(State(state): State<Arc<AppState>>, Query(q): Query<DirectorySuggestionsQuery>) -> impl IntoResponse {
    let directories = match state.app.store.recent_work_dirs(50) {
        Ok(directories) => directories,
        Err(e) => return e.into_response(),
    };
    let filtered = match q.query.map(|s| s.to_lowercase()) {
        Some(query) => directories.into_iter().filter(|d| d.to_lowercase().contains(&query)).take(20).collect(),
        None => directories.into_iter().take(20).collect(),
    };
    Json(DirectoriesResponse { directories: filtered }).into_response()
}

pub async fn git_info(Query(q): Query<BrowseQuery>) -> impl IntoResponse {
    let work_dir = q.path.unwrap_or_else(|| ".".to_string());
    let git = worktree::detect_git_info(Some(&work_dir)).await;
    Json(GitInfoResponse { branch: git.branch, repo: git.repo, is_worktree: git.is_worktree })
}
