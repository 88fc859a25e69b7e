// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `@file` reference inlining (§4.5.1) and `.gitignore`-aware file listing
//! (§6 `GET /threads/{id}/files`, SPEC_FULL supplement #6).
//!
//! Both are synchronous filesystem operations; callers on the async path
//! run them through `tokio::task::spawn_blocking`, the same offload the
//! Store's doc comment describes for its own I/O.

use std::path::{Path, PathBuf};

use crate::error::{Result, ThreadHostError};

/// Total budget for inlined file content, across all references in one
/// message (§4.5.1, §8 boundary behaviours).
pub const MAX_INLINE_CHARS: usize = 100_000;
const TRUNCATION_MARKER: &str = "\n\n[... truncated, file context limit reached ...]\n";

/// Directory and file-name patterns never surfaced by `list_files`,
/// regardless of `.gitignore` (SPEC_FULL supplement #6).
const BUILTIN_IGNORE_DIRS: &[&str] =
    &[".git", "node_modules", "__pycache__", ".venv", ".mainthread", "target", ".next"];
const BUILTIN_IGNORE_SUFFIXES: &[&str] = &[".pyc", ".DS_Store"];

/// Resolve `file_references` against `work_dir`, sandboxing each path to
/// stay inside it, and concatenate their contents as explicit file blocks
/// to prepend to the user's message. A path that escapes `work_dir`
/// (`..`, an absolute path outside it, or a symlink that resolves outside
/// it) is rejected outright rather than silently skipped.
pub fn inline_file_references(work_dir: Option<&str>, file_references: &[String]) -> Result<String> {
    if file_references.is_empty() {
        return Ok(String::new());
    }
    let Some(work_dir) = work_dir else {
        return Err(ThreadHostError::validation("file references require a thread work_dir"));
    };
    let root = canonical_dir(work_dir)?;

    let mut rendered = String::new();
    let mut budget = MAX_INLINE_CHARS;
    for reference in file_references {
        let resolved = sandbox_path(&root, reference)?;
        let contents = std::fs::read_to_string(&resolved)
            .map_err(|e| ThreadHostError::validation(format!("cannot read {reference}: {e}")))?;

        let block_header = format!("--- File: {reference} ---\n");
        let block_footer = "\n--- End File ---\n";
        let available = budget.saturating_sub(block_header.len() + block_footer.len());
        let (body, truncated) = if contents.len() > available {
            (truncate_at_char_boundary(&contents, available), true)
        } else {
            (contents, false)
        };
        rendered.push_str(&block_header);
        rendered.push_str(&body);
        if truncated {
            rendered.push_str(TRUNCATION_MARKER);
        }
        rendered.push_str(block_footer);
        budget = budget.saturating_sub(block_header.len() + body.len() + block_footer.len());
        if budget == 0 {
            break;
        }
    }
    Ok(rendered)
}

fn truncate_at_char_boundary(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn canonical_dir(work_dir: &str) -> Result<PathBuf> {
    std::fs::canonicalize(work_dir).map_err(|e| ThreadHostError::validation(format!("invalid work_dir {work_dir}: {e}")))
}

/// Join `relative` onto `root` and verify the canonicalised result stays
/// inside `root`, rejecting `..` escapes and symlinks that cross out.
fn sandbox_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = root.join(relative.trim_start_matches('/'));
    let canonical = std::fs::canonicalize(&candidate)
        .map_err(|e| ThreadHostError::validation(format!("cannot resolve {relative}: {e}")))?;
    if !canonical.starts_with(root) {
        return Err(ThreadHostError::validation(format!("{relative} escapes the thread's work_dir")));
    }
    Ok(canonical)
}

/// One entry in a `list_files` result.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
}

/// List files under `work_dir` matching `query` (a case-insensitive
/// substring of the relative path), honouring a top-level `.gitignore`
/// plus the built-in ignore set, capped at `limit` entries.
pub fn list_files(work_dir: &str, query: Option<&str>, limit: usize) -> Result<Vec<FileEntry>> {
    let root = canonical_dir(work_dir)?;
    let gitignore = load_gitignore_patterns(&root);
    let query = query.map(str::to_lowercase);

    let mut results = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        if results.len() >= limit {
            break;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            if results.len() >= limit {
                break;
            }
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if is_builtin_ignored(&file_name) {
                continue;
            }
            let relative = path.strip_prefix(&root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            if is_gitignored(&gitignore, &relative) {
                continue;
            }

            let is_dir = path.is_dir();
            if let Some(q) = &query {
                if !relative.to_lowercase().contains(q.as_str()) {
                    if is_dir {
                        stack.push(path);
                    }
                    continue;
                }
            }
            results.push(FileEntry { path: relative, is_dir });
            if is_dir {
                stack.push(path);
            }
        }
    }
    results.truncate(limit);
    Ok(results)
}

fn is_builtin_ignored(file_name: &str) -> bool {
    BUILTIN_IGNORE_DIRS.contains(&file_name) || BUILTIN_IGNORE_SUFFIXES.iter().any(|suf| file_name.ends_with(suf))
}

/// Load the top-level `.gitignore`'s non-comment, non-blank lines. Full
/// gitignore semantics (negation, nested files, `**`) are out of scope
/// (SPEC_FULL supplement #6); this is a simple substring/prefix exclusion
/// list sufficient for the basic listing contract.
fn load_gitignore_patterns(root: &Path) -> Vec<String> {
    let Ok(contents) = std::fs::read_to_string(root.join(".gitignore")) else { return Vec::new() };
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_end_matches('/').to_string())
        .collect()
}

fn is_gitignored(patterns: &[String], relative_path: &str) -> bool {
    patterns.iter().any(|pattern| {
        relative_path == pattern || relative_path.starts_with(&format!("{pattern}/")) || relative_path.contains(pattern.as_str())
    })
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
