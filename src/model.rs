// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared by the Store, EventBus, and Orchestrator: threads,
//! messages, and the content-block shape of a streaming assistant message.

use serde::{Deserialize, Serialize};

/// Maximum chain length to a root via parent IDs before a thread is
/// considered cyclic (guard only; real hierarchies stay far shallower).
pub const MAX_THREAD_DEPTH_GUARD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadStatus {
    Active,
    Pending,
    Running,
    NeedsAttention,
    Done,
    NewMessage,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::NeedsAttention => "needs-attention",
            Self::Done => "done",
            Self::NewMessage => "new-message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "needs-attention" => Some(Self::NeedsAttention),
            "done" => Some(Self::Done),
            "new-message" => Some(Self::NewMessage),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Bypass,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "accept-edits",
            Self::Bypass => "bypass",
            Self::Plan => "plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "accept-edits" => Some(Self::AcceptEdits),
            "bypass" => Some(Self::Bypass),
            "plan" => Some(Self::Plan),
            _ => None,
        }
    }
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::AcceptEdits
    }
}

/// Git metadata attached to a thread's working directory, best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitMetadata {
    /// Branch name, or `(shorthash)` when HEAD is detached.
    pub branch: Option<String>,
    pub repo: Option<String>,
    pub is_worktree: bool,
    pub worktree_branch: Option<String>,
}

/// Cumulative token/cost accounting for a thread.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: f64,
}

impl Usage {
    pub fn add(&mut self, input_delta: u64, output_delta: u64, cost_delta: f64) {
        self.input_tokens += input_delta;
        self.output_tokens += output_delta;
        self.total_cost_usd += cost_delta;
    }

    pub fn combine(&self, other: &Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            total_cost_usd: self.total_cost_usd + other.total_cost_usd,
        }
    }
}

/// Nesting policy controlling whether a thread may spawn children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NestingPolicy {
    pub allow_nested_subthreads: bool,
    pub max_thread_depth: u32,
}

impl Default for NestingPolicy {
    fn default() -> Self {
        Self { allow_nested_subthreads: false, max_thread_depth: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub work_dir: Option<String>,
    /// Agent session token, used for resumption. Null after `clear_thread_messages`.
    pub session_id: Option<String>,
    pub model: String,
    pub permission_mode: PermissionMode,
    pub extended_thinking: bool,
    pub auto_react: bool,
    pub git: GitMetadata,
    pub is_ephemeral: bool,
    pub nesting: NestingPolicy,
    pub usage: Usage,
    pub status: ThreadStatus,
    pub archived_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields accepted by `create_thread`; unset fields take documented defaults.
#[derive(Debug, Clone, Default)]
pub struct NewThread {
    pub title: String,
    pub parent_id: Option<String>,
    pub work_dir: Option<String>,
    pub model: Option<String>,
    pub permission_mode: Option<PermissionMode>,
    pub extended_thinking: Option<bool>,
    pub auto_react: Option<bool>,
    pub allow_nested_subthreads: Option<bool>,
    pub max_thread_depth: Option<u32>,
    pub is_ephemeral: bool,
    /// Caller-supplied id, used for ephemeral Task-subagent threads whose id
    /// must equal the originating tool_use id.
    pub id: Option<String>,
}

pub const DEFAULT_MODEL: &str = "claude-opus-4-5";

/// Partial update applied by `update_thread_config`; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadConfigPatch {
    pub model: Option<String>,
    pub permission_mode: Option<PermissionMode>,
    pub extended_thinking: Option<bool>,
    pub auto_react: Option<bool>,
    pub work_dir: Option<String>,
    pub allow_nested_subthreads: Option<bool>,
    pub max_thread_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Structured block payload for assistant messages, opaque JSON elsewhere.
    pub content_blocks: Option<Vec<ContentBlock>>,
    pub created_at: i64,
}

/// A single heterogeneous block inside a streaming assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { content: String },
    Thinking { content: String, signature: Option<String> },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
        is_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// A single page of a paginated message listing, counted from the end.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: usize,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
