//! [`ProcessGit`] — a [`crate::Git`] implementation backed by the `git` CLI.
//!
//! Spawn `git`, capture stdout/stderr, map a non-zero exit to a descriptive
//! error. No git library is linked; every operation here is a thin wrapper
//! over a single porcelain or plumbing invocation.

use std::path::Path;
use std::process::{Command, Output};

use tracing::instrument;

use crate::error::{looks_like_merge_conflict, GitError};
use crate::MergeOutcome;

/// `git` CLI-backed implementation of [`crate::Git`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessGit;

impl ProcessGit {
    /// Construct a new CLI-backed git driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .output()
            .map_err(|source| GitError::Spawn {
                command: args.join(" "),
                source,
            })
    }

    fn run_ok(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(repo, args)?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

impl crate::Git for ProcessGit {
    #[instrument(skip(self))]
    fn clone_repo(&self, source: &Path, dest: &Path) -> Result<(), GitError> {
        let source_str = source.to_string_lossy().into_owned();
        let dest_str = dest.to_string_lossy().into_owned();
        let output = Command::new("git")
            .args(["clone", "--origin", "origin", &source_str, &dest_str])
            .output()
            .map_err(|source| GitError::Spawn {
                command: "clone".to_owned(),
                source,
            })?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: "clone".to_owned(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run_ok(repo, &["checkout", branch]).map(|_| ())
    }

    fn create_branch(&self, repo: &Path, branch: &str, from: &str) -> Result<(), GitError> {
        self.run_ok(repo, &["checkout", "-b", branch, from]).map(|_| ())
    }

    fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, GitError> {
        let output = self.run(
            repo,
            &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )?;
        Ok(output.status.success())
    }

    fn current_branch(&self, repo: &Path) -> Result<String, GitError> {
        self.run_ok(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn is_clean(&self, repo: &Path, ignore_globs: &[String]) -> Result<bool, GitError> {
        let raw = self.run_ok(repo, &["status", "--porcelain"])?;
        let dirty = raw.lines().any(|line| {
            let path = line.get(3..).unwrap_or("").trim();
            !ignore_globs
                .iter()
                .any(|pattern| glob_match(pattern, path))
        });
        Ok(!dirty)
    }

    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, GitError> {
        let output = self.run(repo, &["remote", "get-url", remote])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_owned(),
        ))
    }

    fn rev_parse(&self, repo: &Path, rev: &str) -> Result<String, GitError> {
        let oid = self.run_ok(repo, &["rev-parse", rev])?;
        if oid.len() != 40 || !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GitError::UnexpectedOutput {
                command: format!("rev-parse {rev}"),
                raw: oid,
            });
        }
        Ok(oid)
    }

    #[instrument(skip(self))]
    fn merge_no_ff(
        &self,
        repo: &Path,
        branch: &str,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let output = self.run(repo, &["merge", "--no-ff", "-m", message, branch])?;
        if output.status.success() {
            let oid = self.rev_parse(repo, "HEAD")?;
            return Ok(MergeOutcome::Merged(oid));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let detail = format!("{stdout}\n{stderr}");

        if !looks_like_merge_conflict(&detail) {
            return Err(GitError::CommandFailed {
                command: format!("merge --no-ff {branch}"),
                exit_code: output.status.code(),
                stderr,
            });
        }

        let files = self.conflicted_files(repo)?;
        // Never leave a repo mid-merge for a caller to discover later.
        let _ = self.run(repo, &["merge", "--abort"]);
        Ok(MergeOutcome::Conflict { files, detail })
    }

    fn discard_changes(&self, repo: &Path) -> Result<(), GitError> {
        self.run_ok(repo, &["checkout", "--", "."]).map(|_| ())
    }

    fn diff_name_only(&self, repo: &Path, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        let raw = self.run_ok(repo, &["diff", "--name-only", &format!("{from}..{to}")])?;
        Ok(raw.lines().map(str::to_owned).filter(|s| !s.is_empty()).collect())
    }

    fn add_info_exclude(&self, repo: &Path, pattern: &str) -> Result<(), GitError> {
        let exclude_path = repo.join(".git").join("info").join("exclude");
        let existing = std::fs::read_to_string(&exclude_path).unwrap_or_default();
        if existing.lines().any(|line| line.trim() == pattern) {
            return Ok(());
        }
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(pattern);
        updated.push('\n');
        std::fs::write(&exclude_path, updated).map_err(|source| GitError::Spawn {
            command: "add_info_exclude".to_owned(),
            source,
        })
    }
}

impl ProcessGit {
    fn conflicted_files(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        let raw = self.run_ok(repo, &["diff", "--name-only", "--diff-filter=U"])?;
        Ok(raw.lines().map(str::to_owned).filter(|s| !s.is_empty()).collect())
    }
}

/// Minimal glob match for the `ignore_globs` check in [`ProcessGit::is_clean`]:
/// supports a single trailing `**` or `*` wildcard, which is all the
/// `.task-orchestrator/**`-style patterns the orchestrator needs.
fn glob_match(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path == prefix || path.starts_with(&format!("{prefix}/"));
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    path == pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_double_star_prefix() {
        assert!(glob_match(".task-orchestrator/**", ".task-orchestrator/worker-state.json"));
        assert!(glob_match(".task-orchestrator/**", ".task-orchestrator"));
        assert!(!glob_match(".task-orchestrator/**", "src/main.rs"));
    }

    #[test]
    fn glob_match_exact() {
        assert!(glob_match("Cargo.lock", "Cargo.lock"));
        assert!(!glob_match("Cargo.lock", "Cargo.toml"));
    }

    #[test]
    fn detects_merge_conflict_phrasing() {
        assert!(looks_like_merge_conflict("Automatic merge failed; fix conflicts"));
        assert!(looks_like_merge_conflict("CONFLICT (content): Merge conflict in a.rs"));
        assert!(!looks_like_merge_conflict("fatal: not a git repository"));
    }
}
