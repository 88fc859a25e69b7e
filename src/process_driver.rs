// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A concrete, swappable [`AgentDriver`] (§1: "we assume a streaming agent
//! driver that yields typed events" — the SDK integration itself stays out
//! of scope). This implementation spawns a configured external command once
//! per turn and exchanges newline-delimited JSON on its stdio: one
//! `TurnRequest` line in, then one [`AgentEvent`] per line out until the
//! process exits.
//!
//! Grounded the way the teacher selects and launches an agent subprocess
//! per configured agent type (`crates/cli/src/driver/claude.rs`,
//! `crates/cli/src/config.rs`'s `--agent-type`), and the way another pack
//! example shells out to a CLI and parses its JSON stdout
//! (`zeroclaw-labs-zeroclaw/src/providers/claude_cli.rs`).

use std::collections::HashMap;
use std::process::Stdio;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::warn;

use crate::driver::{AgentDriver, AgentEvent, AgentEventStream, DriverCrash, ImageAttachment, TurnContext};

/// The line written to the child's stdin at the start of a turn.
#[derive(Debug, Serialize)]
struct TurnRequest {
    thread_id: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    model: String,
    permission_mode: String,
    extended_thinking: bool,
    can_spawn: bool,
    is_subthread: bool,
    continuation: bool,
    images: Vec<ImageAttachment>,
    env: HashMap<String, String>,
}

impl From<&TurnContext> for TurnRequest {
    fn from(ctx: &TurnContext) -> Self {
        Self {
            thread_id: ctx.thread_id.clone(),
            prompt: ctx.prompt.clone(),
            session_id: ctx.session_id.clone(),
            model: ctx.model.clone(),
            permission_mode: ctx.permission_mode.as_str().to_string(),
            extended_thinking: ctx.extended_thinking,
            can_spawn: ctx.can_spawn,
            is_subthread: ctx.is_subthread,
            continuation: ctx.continuation,
            images: ctx.images.clone(),
            env: ctx.env.clone(),
        }
    }
}

/// Spawns `command` fresh for every turn. No session affinity beyond the
/// `session_id` carried in the request payload — the external process is
/// responsible for resuming whatever state that token names.
pub struct ProcessAgentDriver {
    command: String,
}

impl ProcessAgentDriver {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

enum DriverState {
    Pending { command: String, request: TurnRequest },
    Streaming { child: Child, lines: Lines<BufReader<ChildStdout>> },
    Finished,
}

async fn advance(state: DriverState) -> Option<(Result<AgentEvent, DriverCrash>, DriverState)> {
    match state {
        DriverState::Pending { command, request } => match spawn_and_write(&command, &request).await {
            Ok((child, lines)) => read_next(child, lines).await,
            Err(crash) => Some((Err(crash), DriverState::Finished)),
        },
        DriverState::Streaming { child, lines } => read_next(child, lines).await,
        DriverState::Finished => None,
    }
}

async fn spawn_and_write(command: &str, request: &TurnRequest) -> Result<(Child, Lines<BufReader<ChildStdout>>), DriverCrash> {
    let mut child = Command::new(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DriverCrash { message: format!("failed to spawn agent driver '{command}': {e}") })?;

    let payload = serde_json::to_vec(request).map_err(|e| DriverCrash { message: format!("failed to encode turn request: {e}") })?;
    let mut stdin = child.stdin.take().ok_or_else(|| DriverCrash { message: "agent driver stdin not captured".to_string() })?;
    stdin.write_all(&payload).await.map_err(|e| DriverCrash { message: format!("failed to write turn request: {e}") })?;
    stdin.write_all(b"\n").await.map_err(|e| DriverCrash { message: format!("failed to write turn request: {e}") })?;
    drop(stdin);

    let stdout = child.stdout.take().ok_or_else(|| DriverCrash { message: "agent driver stdout not captured".to_string() })?;
    let lines = BufReader::new(stdout).lines();
    Ok((child, lines))
}

async fn read_next(mut child: Child, mut lines: Lines<BufReader<ChildStdout>>) -> Option<(Result<AgentEvent, DriverCrash>, DriverState)> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AgentEvent>(&line) {
                    Ok(event) => return Some((Ok(event), DriverState::Streaming { child, lines })),
                    Err(e) => {
                        warn!(line, error = %e, "dropping unparseable agent driver line");
                        continue;
                    }
                }
            }
            Ok(None) => {
                return match child.wait().await {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some((
                        Err(DriverCrash { message: format!("agent driver process exited with {status}") }),
                        DriverState::Finished,
                    )),
                    Err(e) => Some((Err(DriverCrash { message: format!("failed to wait on agent driver process: {e}") }), DriverState::Finished)),
                };
            }
            Err(e) => return Some((Err(DriverCrash { message: format!("failed reading agent driver stdout: {e}") }), DriverState::Finished)),
        }
    }
}

impl AgentDriver for ProcessAgentDriver {
    fn invoke(&self, ctx: TurnContext) -> AgentEventStream {
        let command = self.command.clone();
        let request = TurnRequest::from(&ctx);
        let initial = DriverState::Pending { command, request };
        Box::pin(futures_util::stream::unfold(initial, advance))
    }
}

// Only exercised indirectly (spawning a real process is exercised by the
// `ExecutionEngine`/`Orchestrator` suites against `FakeDriver`); this type's
// own unit coverage is the request-encoding shape.
#[cfg(test)]
#[path = "process_driver_tests.rs"]
mod tests;
