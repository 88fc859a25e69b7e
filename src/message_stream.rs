// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregates one turn's `AgentEvent`s into a `ContentBlock` list, the event
//! broadcasts the engine publishes for each, and the final status/session
//! classification (§4.4.1-4.4.3).

use std::collections::VecDeque;

use regex::Regex;
use std::sync::OnceLock;

use crate::driver::AgentEvent;
use crate::event::{QuestionSpec, ThreadEvent};
use crate::model::{ContentBlock, ThreadStatus};

const TASK_SUBAGENT_TOOL: &str = "Task";
const SIGNAL_STATUS_TOOL: &str = "SignalStatus";
const TITLE_MAX_CHARS: usize = 60;

/// Truncate a sub-agent description to the 60-char title budget (§4.4.1).
fn truncate_title(description: &str) -> String {
    if description.chars().count() <= TITLE_MAX_CHARS {
        description.to_string()
    } else {
        description.chars().take(TITLE_MAX_CHARS).collect()
    }
}

fn spawn_marker_re() -> &'static Result<Regex, regex::Error> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--SPAWN_DATA:([a-f0-9-]+)-->"))
}

/// Extract the trailing spawn marker's UUID from a tool-result's textual content.
pub fn extract_spawn_marker(content: &str) -> Option<String> {
    let re = spawn_marker_re().as_ref().ok()?;
    re.captures(content).map(|c| c[1].to_string())
}

/// Request to materialise an ephemeral sub-agent thread, id equal to the
/// originating tool_use id (§4.4.1).
#[derive(Debug, Clone)]
pub struct SpawnSubagentRequest {
    pub tool_id: String,
    pub title: String,
}

/// Events to publish, plus any side-effect the engine must additionally
/// perform (materialising an ephemeral Task-subagent thread).
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub events: Vec<ThreadEvent>,
    pub spawn_subagent: Option<SpawnSubagentRequest>,
}

pub struct MessageStream {
    blocks: Vec<ContentBlock>,
    pending_tool_ids: VecDeque<String>,
    final_status: Option<String>,
    final_session_id: Option<String>,
}

impl MessageStream {
    pub fn new() -> Self {
        Self { blocks: Vec::new(), pending_tool_ids: VecDeque::new(), final_status: None, final_session_id: None }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn final_session_id(&self) -> Option<&str> {
        self.final_session_id.as_deref()
    }

    /// Concatenation of all text blocks, falling back to a placeholder when
    /// the turn produced no visible text.
    pub fn content_text(&self) -> String {
        let joined: String = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            "No response generated".to_string()
        } else {
            joined
        }
    }

    fn complete_pending_tool(&mut self, tool_use_id: &str, is_error: bool, content: Option<String>) -> ThreadEvent {
        let mut extracted_thread_id = None;
        for block in self.blocks.iter_mut() {
            if let ContentBlock::ToolUse { id, is_complete, is_error: block_error, .. } = block {
                if id == tool_use_id {
                    *is_complete = true;
                    *block_error = Some(is_error);
                    if let Some(ref c) = content {
                        extracted_thread_id = extract_spawn_marker(c);
                    }
                    break;
                }
            }
        }
        ThreadEvent::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            is_error,
            content,
            thread_id: extracted_thread_id,
        }
    }

    /// Apply one inbound driver event, returning the event(s) to publish.
    pub fn apply(&mut self, event: AgentEvent) -> ApplyOutcome {
        match event {
            AgentEvent::Text { content } => {
                match self.blocks.last_mut() {
                    Some(ContentBlock::Text { content: existing }) => existing.push_str(&content),
                    _ => self.blocks.push(ContentBlock::Text { content: content.clone() }),
                }
                ApplyOutcome { events: vec![ThreadEvent::TextDelta { content }], ..Default::default() }
            }
            AgentEvent::Thinking { content, signature } => {
                match self.blocks.last_mut() {
                    Some(ContentBlock::Thinking { content: existing, signature: existing_sig }) => {
                        existing.push_str(&content);
                        if signature.as_deref().is_some_and(|s| !s.is_empty()) {
                            *existing_sig = signature.clone();
                        }
                    }
                    _ => self.blocks.push(ContentBlock::Thinking { content: content.clone(), signature: signature.clone() }),
                }
                ApplyOutcome { events: vec![ThreadEvent::Thinking { content, signature }], ..Default::default() }
            }
            AgentEvent::ToolUse { id, name, input } => {
                self.pending_tool_ids.push_back(id.clone());
                self.blocks.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone().unwrap_or(serde_json::Value::Null),
                    is_complete: false,
                    is_error: None,
                });
                let description = input.as_ref().and_then(|v| v.get("description")).and_then(|v| v.as_str()).map(str::to_string);
                let mut outcome = ApplyOutcome {
                    events: vec![ThreadEvent::ToolUse { id: id.clone(), name: name.clone(), input }],
                    spawn_subagent: None,
                };
                if name == TASK_SUBAGENT_TOOL {
                    let title = truncate_title(description.as_deref().unwrap_or("Sub-agent task"));
                    outcome.events.push(ThreadEvent::SubagentStart { thread_id: id.clone(), title: title.clone(), subagent_type: name });
                    outcome.spawn_subagent = Some(SpawnSubagentRequest { tool_id: id, title });
                }
                outcome
            }
            AgentEvent::ToolInput { id, input } => {
                for block in self.blocks.iter_mut() {
                    if let ContentBlock::ToolUse { id: block_id, input: block_input, .. } = block {
                        if *block_id == id {
                            *block_input = input.clone();
                            break;
                        }
                    }
                }
                ApplyOutcome { events: vec![ThreadEvent::ToolInput { id, input }], ..Default::default() }
            }
            AgentEvent::ToolResult { tool_use_id, is_error, content } => {
                let resolved_id = match tool_use_id {
                    Some(id) if self.pending_tool_ids.contains(&id) => {
                        self.pending_tool_ids.retain(|p| p != &id);
                        id
                    }
                    Some(id) => id,
                    None => self.pending_tool_ids.pop_front().unwrap_or_default(),
                };
                let event = self.complete_pending_tool(&resolved_id, is_error, content);
                ApplyOutcome { events: vec![event], ..Default::default() }
            }
            AgentEvent::Error { message } => ApplyOutcome { events: vec![ThreadEvent::Error { error: message }], ..Default::default() },
            AgentEvent::Usage { input_tokens, output_tokens, cost_usd } => ApplyOutcome {
                events: vec![ThreadEvent::Usage {
                    usage: crate::model::Usage { input_tokens, output_tokens, total_cost_usd: cost_usd },
                    total_cost_usd: cost_usd,
                }],
                ..Default::default()
            },
            AgentEvent::Status { status, session_id } => {
                self.final_status = Some(status);
                if session_id.is_some() {
                    self.final_session_id = session_id;
                }
                ApplyOutcome::default()
            }
        }
    }

    /// Complete any still-pending tool-use blocks in FIFO order (§4.4.2).
    pub fn finalize(&mut self) -> Vec<ThreadEvent> {
        let mut events = Vec::new();
        while let Some(id) = self.pending_tool_ids.pop_front() {
            events.push(self.complete_pending_tool(&id, false, None));
        }
        events
    }

    /// Determine the turn's final status (§4.4.3): SignalStatus tool call
    /// takes priority over literal `[BLOCKED]`/`[DONE]` text markers.
    pub fn classify_status(&self) -> ThreadStatus {
        for block in &self.blocks {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == SIGNAL_STATUS_TOOL {
                    if let Some(status) = input.get("status").and_then(|v| v.as_str()) {
                        return match status {
                            "done" => ThreadStatus::Done,
                            "blocked" => ThreadStatus::NeedsAttention,
                            _ => ThreadStatus::Active,
                        };
                    }
                }
            }
        }
        let text = self.content_text();
        if text.contains("[BLOCKED]") {
            ThreadStatus::NeedsAttention
        } else if text.contains("[DONE]") {
            ThreadStatus::Done
        } else {
            ThreadStatus::Active
        }
    }

    /// If a `SignalStatus` tool call with a recognised status is present,
    /// return it for the engine to broadcast live (§4.5.4). Checked after
    /// every applied event so the broadcast happens as soon as the call
    /// appears, not only at turn end.
    pub fn signal_status_call(&self) -> Option<(ThreadStatus, String)> {
        for block in &self.blocks {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == SIGNAL_STATUS_TOOL {
                    let status = input.get("status").and_then(|v| v.as_str())?;
                    let reason = input.get("reason").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    return match status {
                        "done" => Some((ThreadStatus::Done, reason)),
                        "blocked" => Some((ThreadStatus::NeedsAttention, reason)),
                        _ => None,
                    };
                }
            }
        }
        None
    }

    /// Serialisable question list for a `question` event, from a driver-side
    /// elicitation (kept separate from the generic `AgentEvent` set since
    /// questions arrive through the Rendezvous path, not the main stream).
    pub fn to_question_spec(questions: &[(String, Vec<String>)]) -> Vec<QuestionSpec> {
        questions.iter().map(|(q, o)| QuestionSpec { question: q.clone(), options: o.clone() }).collect()
    }
}

impl Default for MessageStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "message_stream_tests.rs"]
mod tests;
