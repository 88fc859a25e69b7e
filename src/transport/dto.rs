// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response bodies for the control HTTP surface (§6). Field casing
//! matches the rest of the wire protocol (events, stored rows): snake_case.

use serde::{Deserialize, Serialize};

use crate::driver::ImageAttachment;
use crate::model::{PermissionMode, Usage};

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub extended_thinking: Option<bool>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default)]
    pub use_worktree: bool,
    #[serde(default)]
    pub allow_nested_subthreads: Option<bool>,
    #[serde(default)]
    pub max_thread_depth: Option<u32>,
    #[serde(default)]
    pub initial_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_messages_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_messages_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub file_references: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PatchStatusRequest {
    pub status: crate::model::ThreadStatus,
}

pub type PatchConfigRequest = crate::model::ThreadConfigPatch;

#[derive(Debug, Deserialize)]
pub struct PatchTitleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answers: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PlanActionRequest {
    pub action: PlanActionKind,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanActionKind {
    Proceed,
    Modify,
    Compact,
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_files_limit")]
    pub limit: usize,
}

fn default_files_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileEntryDto>,
}

#[derive(Debug, Serialize)]
pub struct FileEntryDto {
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub estimated_tokens: usize,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub last_event_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResetAllQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub path: String,
    pub entries: Vec<FileEntryDto>,
}

#[derive(Debug, Deserialize)]
pub struct DirectorySuggestionsQuery {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectoriesResponse {
    pub directories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GitInfoResponse {
    pub branch: Option<String>,
    pub repo: Option<String>,
    pub is_worktree: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub thread_count: usize,
    pub active_agent_count: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub unix_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct CwdResponse {
    pub cwd: String,
}
