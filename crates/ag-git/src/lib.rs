//! Git state introspection for a run's working directory: point-in-time
//! snapshots, file-change listings, and stash-based checkpoint/restore.
//!
//! Grounded on `original_source/agentling/session/git_tracker.py`. Every
//! subprocess call swallows its own failure (missing `git`, not a repo,
//! detached HEAD, ...) and degrades to an empty/default result rather than
//! propagating an error — git introspection is best-effort context, never
//! load-bearing for a run's success.

use std::path::PathBuf;

use ag_types::{FileChange, FileChangeType, GitSnapshot};
use tokio::process::Command;
use uuid::Uuid;

pub struct GitTracker {
    working_dir: PathBuf,
    run_id: Uuid,
    is_git_repo: Option<bool>,
    last_state: Option<GitSnapshot>,
}

impl GitTracker {
    pub fn new(working_dir: PathBuf, run_id: Uuid) -> Self {
        Self {
            working_dir,
            run_id,
            is_git_repo: None,
            last_state: None,
        }
    }

    pub async fn is_git_repo(&mut self) -> bool {
        if let Some(cached) = self.is_git_repo {
            return cached;
        }
        let is_repo = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&self.working_dir)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        self.is_git_repo = Some(is_repo);
        is_repo
    }

    /// Captures commit/branch/dirty/staged/untracked state. `diff_stat` on
    /// the very first snapshot comes from the same `status` gather as
    /// everything else; on every later snapshot it is recomputed fresh so
    /// it reflects only what changed since the tracker started watching,
    /// not a stale value from before the previous snapshot's changes.
    pub async fn snapshot(&mut self) -> GitSnapshot {
        if !self.is_git_repo().await {
            let snap = GitSnapshot::not_a_repo(self.run_id);
            self.last_state = Some(snap.clone());
            return snap;
        }

        let state = self.get_state().await;
        let diff_stat = if self.last_state.is_some() {
            self.get_diff_stat().await
        } else {
            state.diff_stat.clone()
        };

        let snapshot = GitSnapshot {
            diff_stat,
            ..state
        };
        self.last_state = Some(snapshot.clone());
        snapshot
    }

    pub async fn get_file_changes(&self) -> Vec<FileChange> {
        if !self.is_git_repo.unwrap_or(false) {
            return Vec::new();
        }
        let numstat = self.run_git(&["diff", "--numstat"]).await;
        let mut changes: Vec<FileChange> = numstat
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\t');
                let added = parts.next()?;
                let removed = parts.next()?;
                let path = parts.next()?.to_string();
                Some(FileChange {
                    path,
                    change_type: FileChangeType::Modified,
                    lines_added: added.parse().unwrap_or(0),
                    lines_removed: removed.parse().unwrap_or(0),
                    old_path: None,
                })
            })
            .collect();

        let untracked = self
            .run_git(&["ls-files", "--others", "--exclude-standard"])
            .await;
        changes.extend(untracked.lines().filter(|l| !l.trim().is_empty()).map(|path| {
            FileChange {
                path: path.to_string(),
                change_type: FileChangeType::Added,
                lines_added: 0,
                lines_removed: 0,
                old_path: None,
            }
        }));
        changes
    }

    pub async fn get_file_diff(&self, filepath: &str) -> String {
        if !self.is_git_repo.unwrap_or(false) {
            return String::new();
        }
        self.run_git(&["diff", "--", filepath]).await
    }

    /// `git stash push`. Returns `None` if not a repo or there was nothing
    /// to stash.
    pub async fn create_checkpoint(&self, message: &str) -> Option<String> {
        if !self.is_git_repo.unwrap_or(false) {
            return None;
        }
        let output = self.run_git(&["stash", "push", "-m", message]).await;
        if output.contains("No local changes") {
            None
        } else {
            Some(output)
        }
    }

    /// `git stash pop`. Returns whether it looked like it succeeded (no
    /// "error" substring in git's own output).
    pub async fn restore_checkpoint(&self) -> bool {
        if !self.is_git_repo.unwrap_or(false) {
            return false;
        }
        let output = self.run_git(&["stash", "pop"]).await;
        !output.to_lowercase().contains("error")
    }

    async fn get_state(&self) -> GitSnapshot {
        let (commit_hash, branch, porcelain, diff_stat) = tokio::join!(
            self.run_git(&["rev-parse", "HEAD"]),
            self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"]),
            self.run_git(&["status", "--porcelain"]),
            self.get_diff_stat(),
        );

        let mut staged = Vec::new();
        let mut dirty = Vec::new();
        let mut untracked = Vec::new();
        for line in porcelain.lines() {
            if line.len() < 3 {
                continue;
            }
            let status_code = &line[0..2];
            let path = &line[3..];
            let index_col = status_code.as_bytes()[0];
            let worktree_col = status_code.as_bytes()[1];
            if status_code == "??" {
                untracked.push(path.to_string());
                continue;
            }
            if index_col != b' ' && index_col != b'?' {
                staged.push(path.to_string());
            }
            if worktree_col != b' ' && worktree_col != b'?' {
                dirty.push(path.to_string());
            }
        }

        GitSnapshot {
            id: Uuid::new_v4(),
            run_id: self.run_id,
            event_id: None,
            commit_hash,
            branch,
            dirty_files: dirty,
            staged_files: staged,
            untracked_files: untracked,
            diff_stat,
            is_git_repo: true,
            created_at: chrono::Utc::now(),
        }
    }

    async fn get_diff_stat(&self) -> String {
        self.run_git(&["diff", "--stat"]).await
    }

    async fn run_git(&self, args: &[&str]) -> String {
        Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        run(&["add", "a.txt"]);
        run(&["commit", "-q", "-m", "init"]);
        dir
    }

    #[tokio::test]
    async fn non_repo_reports_is_git_repo_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = GitTracker::new(dir.path().to_path_buf(), Uuid::new_v4());
        assert!(!tracker.is_git_repo().await);
        let snap = tracker.snapshot().await;
        assert!(!snap.is_git_repo);
    }

    #[tokio::test]
    async fn snapshot_reports_dirty_and_untracked_files_separately() {
        let dir = init_repo().await;
        std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "new\n").unwrap();

        let mut tracker = GitTracker::new(dir.path().to_path_buf(), Uuid::new_v4());
        let snap = tracker.snapshot().await;

        assert!(snap.is_git_repo);
        assert!(snap.dirty_files.iter().any(|f| f == "a.txt"));
        assert!(snap.untracked_files.iter().any(|f| f == "b.txt"));
        assert!(!snap.dirty_files.contains(&"b.txt".to_string()));
    }

    #[tokio::test]
    async fn checkpoint_round_trip_restores_dirty_file() {
        let dir = init_repo().await;
        std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();

        let mut tracker = GitTracker::new(dir.path().to_path_buf(), Uuid::new_v4());
        tracker.is_git_repo().await;
        let checkpoint = tracker.create_checkpoint("test checkpoint").await;
        assert!(checkpoint.is_some());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "hello\n"
        );

        assert!(tracker.restore_checkpoint().await);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "changed\n"
        );
    }
}
