// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable persistence of threads, messages, and events (§4.1).
//!
//! Backed by a single SQLite connection guarded by a blocking mutex. Methods
//! here are synchronous and called directly from the async path: each call
//! is a short, local SQLite statement, not worth an executor hop on its own.
//! [`crate::event_bus::EventBus::publish`], the hottest and most contended
//! caller, offloads its write onto the blocking thread pool via
//! `spawn_blocking` instead (§5) so a burst of concurrent publishes never
//! queues up behind the executor. The Store is the single mutable source of
//! truth: in-memory caches elsewhere (event fan-out, pending prompts, task
//! handles) never outlive the process and are never consulted in place of it.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json;
use uuid::Uuid;

use crate::error::{Result, ThreadHostError};
use crate::model::*;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    parent_id TEXT REFERENCES threads(id),
    work_dir TEXT,
    session_id TEXT,
    model TEXT NOT NULL DEFAULT 'claude-opus-4-5',
    extended_thinking INTEGER NOT NULL DEFAULT 1,
    permission_mode TEXT NOT NULL DEFAULT 'accept-edits',
    git_branch TEXT,
    git_repo TEXT,
    is_worktree INTEGER NOT NULL DEFAULT 0,
    worktree_branch TEXT,
    auto_react INTEGER NOT NULL DEFAULT 1,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost_usd REAL NOT NULL DEFAULT 0.0,
    is_ephemeral INTEGER NOT NULL DEFAULT 0,
    allow_nested_subthreads INTEGER NOT NULL DEFAULT 0,
    max_thread_depth INTEGER NOT NULL DEFAULT 1,
    archived_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_parent ON threads(parent_id);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    content_blocks TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);

CREATE TABLE IF NOT EXISTS events (
    seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_thread_seq ON events(thread_id, seq_id);
"#;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if necessary) the SQLite database at `path` and ensure schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ThreadHostError::infrastructure(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
        let status: String = row.get("status")?;
        let permission_mode: String = row.get("permission_mode")?;
        Ok(Thread {
            id: row.get("id")?,
            title: row.get("title")?,
            parent_id: row.get("parent_id")?,
            work_dir: row.get("work_dir")?,
            session_id: row.get("session_id")?,
            model: row.get("model")?,
            permission_mode: PermissionMode::parse(&permission_mode).unwrap_or_default(),
            extended_thinking: row.get::<_, i64>("extended_thinking")? != 0,
            auto_react: row.get::<_, i64>("auto_react")? != 0,
            git: GitMetadata {
                branch: row.get("git_branch")?,
                repo: row.get("git_repo")?,
                is_worktree: row.get::<_, i64>("is_worktree")? != 0,
                worktree_branch: row.get("worktree_branch")?,
            },
            is_ephemeral: row.get::<_, i64>("is_ephemeral")? != 0,
            nesting: NestingPolicy {
                allow_nested_subthreads: row.get::<_, i64>("allow_nested_subthreads")? != 0,
                max_thread_depth: row.get::<_, i64>("max_thread_depth")? as u32,
            },
            usage: Usage {
                input_tokens: row.get::<_, i64>("input_tokens")? as u64,
                output_tokens: row.get::<_, i64>("output_tokens")? as u64,
                total_cost_usd: row.get("total_cost_usd")?,
            },
            status: ThreadStatus::parse(&status).unwrap_or(ThreadStatus::Active),
            archived_at: row.get("archived_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create_thread(&self, fields: NewThread) -> Result<Thread> {
        if fields.title.is_empty() || fields.title.chars().count() > 255 {
            return Err(ThreadHostError::validation("title must be 1..255 characters"));
        }
        let permission_mode = fields.permission_mode.unwrap_or_default();
        let id = fields.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = now_ms();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO threads (id, title, status, parent_id, work_dir, session_id, model,
                extended_thinking, permission_mode, auto_react, is_ephemeral,
                allow_nested_subthreads, max_thread_depth, created_at, updated_at)
             VALUES (?1, ?2, 'active', ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                fields.title,
                fields.parent_id,
                fields.work_dir,
                fields.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                fields.extended_thinking.unwrap_or(true) as i64,
                permission_mode.as_str(),
                fields.auto_react.unwrap_or(true) as i64,
                fields.is_ephemeral as i64,
                fields.allow_nested_subthreads.unwrap_or(false) as i64,
                fields.max_thread_depth.unwrap_or(1) as i64,
                now,
            ],
        )?;
        drop(conn);
        self.get_thread(&id)?.ok_or_else(|| ThreadHostError::infrastructure("thread vanished after insert"))
    }

    pub fn get_thread(&self, id: &str) -> Result<Option<Thread>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM threads WHERE id = ?1", params![id], Self::row_to_thread)
            .optional()
            .map_err(Into::into)
    }

    fn require_thread(&self, id: &str) -> Result<Thread> {
        self.get_thread(id)?.ok_or_else(|| ThreadHostError::not_found(format!("thread {id} not found")))
    }

    pub fn list_threads(&self, include_archived: bool) -> Result<Vec<Thread>> {
        let conn = self.lock();
        let sql = if include_archived {
            "SELECT * FROM threads ORDER BY created_at DESC"
        } else {
            "SELECT * FROM threads WHERE archived_at IS NULL ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::row_to_thread)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_thread_status(&self, id: &str, status: ThreadStatus) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_ms(), id],
        )?;
        Ok(())
    }

    pub fn update_thread_session(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET session_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![token, now_ms(), id],
        )?;
        Ok(())
    }

    /// Record detected or worktree-assigned git metadata, and (for a worktree
    /// child) the work_dir redirected into the new worktree path.
    pub fn update_thread_git(&self, id: &str, work_dir: Option<&str>, git: &GitMetadata) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET work_dir = COALESCE(?1, work_dir), git_branch = ?2, git_repo = ?3,
                is_worktree = ?4, worktree_branch = ?5, updated_at = ?6 WHERE id = ?7",
            params![work_dir, git.branch, git.repo, git.is_worktree as i64, git.worktree_branch, now_ms(), id],
        )?;
        Ok(())
    }

    pub fn update_thread_config(&self, id: &str, patch: ThreadConfigPatch) -> Result<()> {
        let thread = self.require_thread(id)?;
        let model = patch.model.unwrap_or(thread.model);
        let permission_mode = patch.permission_mode.unwrap_or(thread.permission_mode);
        let extended_thinking = patch.extended_thinking.unwrap_or(thread.extended_thinking);
        let auto_react = patch.auto_react.unwrap_or(thread.auto_react);
        let work_dir = patch.work_dir.or(thread.work_dir);
        let allow_nested = patch.allow_nested_subthreads.unwrap_or(thread.nesting.allow_nested_subthreads);
        let max_depth = patch.max_thread_depth.unwrap_or(thread.nesting.max_thread_depth);
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET model = ?1, permission_mode = ?2, extended_thinking = ?3,
                auto_react = ?4, work_dir = ?5, allow_nested_subthreads = ?6,
                max_thread_depth = ?7, updated_at = ?8 WHERE id = ?9",
            params![
                model,
                permission_mode.as_str(),
                extended_thinking as i64,
                auto_react as i64,
                work_dir,
                allow_nested as i64,
                max_depth as i64,
                now_ms(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn update_thread_title(&self, id: &str, title: &str) -> Result<()> {
        if title.is_empty() || title.chars().count() > 255 {
            return Err(ThreadHostError::validation("title must be 1..255 characters"));
        }
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now_ms(), id],
        )?;
        Ok(())
    }

    pub fn update_thread_usage(&self, id: &str, delta_in: u64, delta_out: u64, delta_cost: f64) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET input_tokens = input_tokens + ?1, output_tokens = output_tokens + ?2,
                total_cost_usd = total_cost_usd + ?3, updated_at = ?4 WHERE id = ?5",
            params![delta_in as i64, delta_out as i64, delta_cost, now_ms(), id],
        )?;
        Ok(())
    }

    pub fn add_message(&self, thread_id: &str, role: MessageRole, content: &str, blocks: Option<&[ContentBlock]>) -> Result<Message> {
        if content.is_empty() {
            return Err(ThreadHostError::validation("message content must not be empty"));
        }
        self.require_thread(thread_id)?;
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        let blocks_json = blocks.map(|b| serde_json::to_string(b)).transpose().map_err(|e| ThreadHostError::infrastructure(e.to_string()))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO messages (id, thread_id, role, content, content_blocks, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, thread_id, role.as_str(), content, blocks_json, now],
        )?;
        Ok(Message { id, thread_id: thread_id.to_string(), role, content: content.to_string(), content_blocks: blocks.map(|b| b.to_vec()), created_at: now })
    }

    pub fn update_message(&self, id: &str, content: &str, blocks: Option<&[ContentBlock]>) -> Result<()> {
        let blocks_json = blocks.map(|b| serde_json::to_string(b)).transpose().map_err(|e| ThreadHostError::infrastructure(e.to_string()))?;
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE messages SET content = ?1, content_blocks = ?2 WHERE id = ?3",
            params![content, blocks_json, id],
        )?;
        if changed == 0 {
            return Err(ThreadHostError::not_found(format!("message {id} not found")));
        }
        Ok(())
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let role: String = row.get("role")?;
        let blocks_json: Option<String> = row.get("content_blocks")?;
        let content_blocks = blocks_json.and_then(|s| serde_json::from_str(&s).ok());
        Ok(Message {
            id: row.get("id")?,
            thread_id: row.get("thread_id")?,
            role: MessageRole::parse(&role).unwrap_or(MessageRole::User),
            content: row.get("content")?,
            content_blocks,
            created_at: row.get("created_at")?,
        })
    }

    /// Paginated, chronological-ascending; `offset` counts from the end of the list.
    pub fn get_messages_paginated(&self, thread_id: &str, limit: usize, offset_from_end: usize) -> Result<MessagePage> {
        let limit = limit.min(100);
        let conn = self.lock();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |r| r.get(0),
        )?;
        let total = total as usize;
        let end_index = total.saturating_sub(offset_from_end);
        let start_index = end_index.saturating_sub(limit);
        let take = end_index - start_index;
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE thread_id = ?1 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![thread_id, take as i64, start_index as i64], Self::row_to_message)?;
        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(MessagePage { messages, total })
    }

    pub fn archive_thread(&self, id: &str) -> Result<()> {
        let thread = self.require_thread(id)?;
        if thread.archived_at.is_some() {
            return Err(ThreadHostError::validation("thread already archived"));
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET archived_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now_ms(), id],
        )?;
        Ok(())
    }

    pub fn unarchive_thread(&self, id: &str) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE threads SET archived_at = NULL, updated_at = ?1 WHERE id = ?2",
            params![now_ms(), id],
        )?;
        Ok(())
    }

    /// Clear a thread's messages and reset its session token so the next turn starts fresh.
    pub fn clear_thread_messages(&self, id: &str) -> Result<()> {
        self.require_thread(id)?;
        let conn = self.lock();
        conn.execute("DELETE FROM messages WHERE thread_id = ?1", params![id])?;
        conn.execute(
            "UPDATE threads SET session_id = NULL, updated_at = ?1 WHERE id = ?2",
            params![now_ms(), id],
        )?;
        Ok(())
    }

    pub fn reset_all_threads(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM messages", [])?;
        conn.execute("DELETE FROM events", [])?;
        conn.execute("DELETE FROM threads", [])?;
        Ok(())
    }

    /// Append an event, returning its monotonic per-thread seq-id. Serialised
    /// per thread by the single connection mutex: readers never see gaps.
    pub fn append_event(&self, thread_id: &str, event_type: &str, payload: &str) -> Result<u64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (thread_id, event_type, data, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![thread_id, event_type, payload, now_ms()],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    fn row_to_seq_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u64, String, String, String, i64)> {
        Ok((
            row.get::<_, i64>("seq_id")? as u64,
            row.get("thread_id")?,
            row.get("event_type")?,
            row.get("data")?,
            row.get("created_at")?,
        ))
    }

    /// Raw rows (seq, thread_id, event_type, data json, created_at) ordered ascending.
    pub fn events_since(&self, thread_id: &str, last_seq: u64) -> Result<Vec<(u64, String, String, String, i64)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE thread_id = ?1 AND seq_id > ?2 ORDER BY seq_id ASC",
        )?;
        let rows = stmt.query_map(params![thread_id, last_seq as i64], Self::row_to_seq_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn latest_seq(&self, thread_id: &str) -> Result<u64> {
        let conn = self.lock();
        let seq: Option<i64> = conn.query_row(
            "SELECT MAX(seq_id) FROM events WHERE thread_id = ?1",
            params![thread_id],
            |r| r.get(0),
        )?;
        Ok(seq.unwrap_or(0) as u64)
    }

    pub fn clear_thread_events(&self, thread_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM events WHERE thread_id = ?1", params![thread_id])?;
        Ok(())
    }

    /// Trim events older than `age_ms`. Never renumbers remaining rows.
    pub fn trim_events_older_than(&self, age_ms: i64) -> Result<usize> {
        let cutoff = now_ms() - age_ms;
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM events WHERE created_at < ?1", params![cutoff])?;
        Ok(deleted)
    }

    /// Walk the parent chain, guarding against cycles beyond `MAX_THREAD_DEPTH_GUARD`
    /// hops. Returns -1 if the guard is exceeded.
    pub fn thread_depth(&self, id: &str) -> Result<i64> {
        let conn = self.lock();
        let mut current = id.to_string();
        for depth in 0..=MAX_THREAD_DEPTH_GUARD {
            let parent: Option<String> = conn
                .query_row("SELECT parent_id FROM threads WHERE id = ?1", params![current], |r| r.get(0))
                .optional()?
                .flatten();
            match parent {
                Some(p) => current = p,
                None => return Ok(depth as i64),
            }
        }
        Ok(-1)
    }

    /// Distinct non-null work directories, most-recently-used first (§ supplement).
    pub fn recent_work_dirs(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT work_dir, MAX(created_at) AS last_used FROM threads
             WHERE work_dir IS NOT NULL GROUP BY work_dir ORDER BY last_used DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |r| r.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Sum of a thread's own usage with every descendant thread's usage
    /// (§ supplement: usage aggregation across children).
    pub fn thread_usage_with_children(&self, id: &str) -> Result<Usage> {
        let thread = self.require_thread(id)?;
        let mut total = thread.usage;
        let mut frontier = vec![id.to_string()];
        let conn = self.lock();
        while let Some(parent) = frontier.pop() {
            let mut stmt = conn.prepare("SELECT id, input_tokens, output_tokens, total_cost_usd FROM threads WHERE parent_id = ?1")?;
            let children = stmt.query_map(params![parent], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64, r.get::<_, i64>(2)? as u64, r.get::<_, f64>(3)?))
            })?;
            for child in children {
                let (child_id, input_tokens, output_tokens, total_cost_usd) = child?;
                total.add(input_tokens, output_tokens, total_cost_usd);
                frontier.push(child_id);
            }
        }
        Ok(total)
    }

    /// Test-only backdoor for simulating a thread that has sat untouched
    /// since `updated_at`, without sleeping in real time.
    #[cfg(test)]
    pub fn set_updated_at_for_test(&self, thread_id: &str, updated_at: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute("UPDATE threads SET updated_at = ?1 WHERE id = ?2", params![updated_at, thread_id])?;
        Ok(())
    }
}

/// Heuristic, advisory-only token estimator (chars/4). Never used to override
/// driver-reported `usage` events.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

pub fn estimate_thread_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
