// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git detection and per-child worktree isolation (§4.5.2, §4.5.6).
//!
//! A child thread spawned from a parent whose `work_dir` is a git repo on a
//! named branch (and is not itself already a worktree) gets its own worktree
//! at `{repo}/.mainthread/worktrees/{id-prefix}` on branch
//! `mainthread/{id-prefix}`, so the child's agent can make commits without
//! colliding with the parent's checkout. Failure always falls back to the
//! parent's `work_dir` with a logged warning; a thread never fails to spawn
//! because a worktree could not be created.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::model::GitMetadata;

const WORKTREES_SUBDIR: &str = ".mainthread/worktrees";
const BRANCH_PREFIX: &str = "mainthread";
const MAX_SUFFIX: u32 = 9;

/// Outcome of attempting to isolate a child thread into its own worktree.
#[derive(Debug, Clone)]
pub struct WorktreeOutcome {
    pub work_dir: String,
    pub git: GitMetadata,
}

async fn run_git(args: &[&str], cwd: &str) -> (bool, String) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;
    match output {
        Ok(out) => {
            let text = if out.status.success() {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            } else {
                String::from_utf8_lossy(&out.stderr).trim().to_string()
            };
            (out.status.success(), text)
        }
        Err(e) => {
            warn!(cwd, error = %e, args = ?args, "git command failed to launch");
            (false, String::new())
        }
    }
}

/// Detect whether `work_dir` is inside a git repository, and if so its
/// branch, repo name, and whether it is itself already a worktree checkout.
/// Best-effort: any failure (not a repo, detached HEAD, `git` missing)
/// yields an all-`None`/`false` result rather than an error.
pub async fn detect_git_info(work_dir: Option<&str>) -> GitMetadata {
    let Some(work_dir) = work_dir else { return GitMetadata::default() };
    if !Path::new(work_dir).exists() {
        return GitMetadata::default();
    }

    let (is_repo, _) = run_git(&["rev-parse", "--is-inside-work-tree"], work_dir).await;
    if !is_repo {
        return GitMetadata::default();
    }

    let (branch_ok, branch_out) = run_git(&["symbolic-ref", "--short", "HEAD"], work_dir).await;
    let branch = if branch_ok && !branch_out.is_empty() {
        Some(branch_out)
    } else {
        let (short_ok, short_out) = run_git(&["rev-parse", "--short", "HEAD"], work_dir).await;
        (short_ok && !short_out.is_empty()).then(|| format!("({short_out})"))
    };

    let (_, common) = run_git(&["rev-parse", "--path-format=absolute", "--git-common-dir"], work_dir).await;
    let (_, git_dir) = run_git(&["rev-parse", "--path-format=absolute", "--git-dir"], work_dir).await;
    let is_worktree = !common.is_empty() && !git_dir.is_empty() && common != git_dir;

    let (_, toplevel) = run_git(&["rev-parse", "--show-toplevel"], work_dir).await;
    let repo = (!toplevel.is_empty())
        .then(|| Path::new(&toplevel).file_name().map(|n| n.to_string_lossy().into_owned()))
        .flatten();

    GitMetadata { branch, repo, is_worktree, worktree_branch: None }
}

/// Create an isolated worktree for a child thread under `base_work_dir`
/// (the parent's `work_dir`, already confirmed to be a non-worktree git
/// checkout on a named branch). `thread_id` names the branch and directory.
///
/// On any failure, returns `Ok(None)`: callers fall back to running the
/// child directly in `base_work_dir`.
pub async fn create_worktree(base_work_dir: &str, thread_id: &str) -> Option<WorktreeOutcome> {
    let (is_repo, _) = run_git(&["rev-parse", "--is-inside-work-tree"], base_work_dir).await;
    if !is_repo {
        return None;
    }

    let id_prefix: String = thread_id.chars().take(8).collect();
    let mut dir_name = id_prefix.clone();
    let mut branch_name = format!("{BRANCH_PREFIX}/{id_prefix}");

    let (exists, _) = run_git(&["rev-parse", "--verify", &format!("refs/heads/{branch_name}")], base_work_dir).await;
    if exists {
        let mut found = false;
        for suffix in 2..=MAX_SUFFIX {
            let alt_branch = format!("{BRANCH_PREFIX}/{id_prefix}-{suffix}");
            let (taken, _) = run_git(&["rev-parse", "--verify", &format!("refs/heads/{alt_branch}")], base_work_dir).await;
            if !taken {
                branch_name = alt_branch;
                dir_name = format!("{id_prefix}-{suffix}");
                found = true;
                break;
            }
        }
        if !found {
            warn!(base_work_dir, "no available worktree branch name after 9 attempts");
            return None;
        }
    }

    let worktree_dir = Path::new(base_work_dir).join(WORKTREES_SUBDIR).join(&dir_name);
    if let Some(parent) = worktree_dir.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(error = %e, "failed to create worktree parent directory");
            return None;
        }
    }

    let worktree_path = worktree_dir.to_string_lossy().into_owned();
    let (created, output) =
        run_git(&["worktree", "add", "-b", &branch_name, &worktree_path], base_work_dir).await;
    if !created {
        warn!(base_work_dir, branch_name, output, "git worktree add failed");
        return None;
    }

    info!(worktree_path, branch_name, "created git worktree for child thread");
    Some(WorktreeOutcome {
        work_dir: worktree_path,
        git: GitMetadata { branch: Some(branch_name.clone()), repo: None, is_worktree: true, worktree_branch: Some(branch_name) },
    })
}

/// Best-effort teardown of a thread's worktree: remove it, prune stale
/// worktree references, and try to delete its branch. Never fails loudly;
/// a thread archive always proceeds regardless of cleanup outcome.
pub async fn remove_worktree(repo_root: &str, worktree_path: &str, branch_name: Option<&str>) {
    if !Path::new(worktree_path).exists() {
        return;
    }

    let (removed, output) = run_git(&["worktree", "remove", worktree_path, "--force"], repo_root).await;
    if !removed {
        warn!(worktree_path, output, "git worktree remove failed, deleting directory manually");
        if let Err(e) = tokio::fs::remove_dir_all(worktree_path).await {
            warn!(worktree_path, error = %e, "manual worktree directory removal failed");
        }
    }

    run_git(&["worktree", "prune"], repo_root).await;

    if let Some(branch) = branch_name {
        let (deleted, _) = run_git(&["branch", "-d", branch], repo_root).await;
        if !deleted {
            run_git(&["branch", "-D", branch], repo_root).await;
        }
    }
}

/// Repo root for a worktree created by [`create_worktree`]: three path
/// components above `{repo}/.mainthread/worktrees/{id}`.
pub fn repo_root_of_worktree(worktree_path: &str) -> Option<PathBuf> {
    Path::new(worktree_path).parent()?.parent()?.parent().map(Path::to_path_buf)
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
