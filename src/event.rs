// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed, tagged event set published on a thread's stream (§4.2).
//!
//! Modelled as a discriminated union rather than dynamic dispatch or
//! duck-typed agent events: parsing is table-driven via serde's internal
//! tag, and unknown tags are logged and dropped by callers that deserialize
//! from storage.

use serde::{Deserialize, Serialize};

use crate::model::{ContentBlock, Message, Thread, ThreadStatus, Usage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEvent {
    Connected { thread_id: String },
    TextDelta { content: String },
    Thinking {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
    },
    ToolInput { id: String, input: serde_json::Value },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    StatusChange { status: ThreadStatus },
    ConfigChange { field: String, value: serde_json::Value },
    TitleChange { title: String },
    Message { message: Message },
    Complete { assistant_message: Vec<ContentBlock>, status: ThreadStatus },
    Error { error: String },
    Usage { usage: Usage, total_cost_usd: f64 },
    Question { questions: Vec<QuestionSpec> },
    PlanApproval {
        plan_content: String,
        allowed_prompts: Vec<String>,
        push_to_remote: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<bool>,
    },
    PlanAction {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permission_mode: Option<String>,
    },
    SubthreadStatus {
        thread_id: String,
        title: String,
        status: ThreadStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    SubagentStart { thread_id: String, title: String, subagent_type: String },
    SubagentStop {
        agent_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        is_background: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
    },
    ThreadCreated { thread: Thread },
    ThreadArchived { thread_id: String },
    ThreadUnarchived { thread_id: String },
    MessagesCleared { thread_id: String },
    AllThreadsReset {},
    Stopped {},
    QueueWaiting { message: String },
    QueueAcquired {},
    Shutdown {},
}

impl ThreadEvent {
    /// The `type` tag as it appears on the wire / as the SSE `event:` name.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::TextDelta { .. } => "text_delta",
            Self::Thinking { .. } => "thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolInput { .. } => "tool_input",
            Self::ToolResult { .. } => "tool_result",
            Self::StatusChange { .. } => "status_change",
            Self::ConfigChange { .. } => "config_change",
            Self::TitleChange { .. } => "title_change",
            Self::Message { .. } => "message",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Usage { .. } => "usage",
            Self::Question { .. } => "question",
            Self::PlanApproval { .. } => "plan_approval",
            Self::PlanAction { .. } => "plan_action",
            Self::SubthreadStatus { .. } => "subthread_status",
            Self::SubagentStart { .. } => "subagent_start",
            Self::SubagentStop { .. } => "subagent_stop",
            Self::ThreadCreated { .. } => "thread_created",
            Self::ThreadArchived { .. } => "thread_archived",
            Self::ThreadUnarchived { .. } => "thread_unarchived",
            Self::MessagesCleared { .. } => "messages_cleared",
            Self::AllThreadsReset {} => "all_threads_reset",
            Self::Stopped {} => "stopped",
            Self::QueueWaiting { .. } => "queue_waiting",
            Self::QueueAcquired {} => "queue_acquired",
            Self::Shutdown {} => "shutdown",
        }
    }
}

/// An event as delivered to a subscriber: the durable seq-id plus the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeqEvent {
    pub seq: u64,
    pub thread_id: String,
    pub event: ThreadEvent,
    pub created_at: i64,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
