//! The [`Git`] trait — the single abstraction boundary between mycelium and
//! git.
//!
//! All orchestrator crates talk to git exclusively through this trait so the
//! worker loop, workspace manager, and merge/integration pipeline can be
//! exercised against an in-memory fake without shelling out. The default
//! implementation ([`process::ProcessGit`]) shells out to the `git` binary
//! via `std::process::Command` rather than linking a git library.

pub mod error;
pub mod process;

pub use error::GitError;
pub use process::ProcessGit;

use std::path::Path;

/// Outcome of a single branch merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The branch merged cleanly; carries the new HEAD commit OID.
    Merged(String),
    /// The merge produced conflicts; the in-progress merge has already been
    /// aborted by the implementation before this is returned.
    Conflict {
        /// Conflicted file paths, relative to the repo root.
        files: Vec<String>,
        /// Raw output captured from the failed merge, for diagnostics.
        detail: String,
    },
}

/// Git operations needed by the orchestrator, expressed as a narrow,
/// object-safe trait so tests can substitute a fake.
///
/// Method set is intentionally small: git plumbing is treated as an
/// external collaborator, so this only covers what the workspace manager
/// and merge/integration actually call.
pub trait Git: Send + Sync {
    /// Clone `source` into `dest`, which must not already exist.
    fn clone_repo(&self, source: &Path, dest: &Path) -> Result<(), GitError>;

    /// Check out an existing local branch.
    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Create `branch` from `from` and check it out.
    fn create_branch(&self, repo: &Path, branch: &str, from: &str) -> Result<(), GitError>;

    /// Return `true` if `branch` exists locally.
    fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, GitError>;

    /// Return the currently checked-out branch name.
    fn current_branch(&self, repo: &Path) -> Result<String, GitError>;

    /// Return `true` if the working tree has no staged or unstaged changes,
    /// ignoring paths matched by `ignore_globs` (e.g. `.task-orchestrator/**`).
    fn is_clean(&self, repo: &Path, ignore_globs: &[String]) -> Result<bool, GitError>;

    /// Resolve `remote`'s fetch URL, or `None` if the remote is not configured.
    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, GitError>;

    /// Resolve a revision spec (branch, tag, `HEAD`, ...) to a full OID.
    fn rev_parse(&self, repo: &Path, rev: &str) -> Result<String, GitError>;

    /// Merge `branch` into the currently checked-out branch with `--no-ff`.
    ///
    /// On conflict, the implementation runs `git merge --abort` before
    /// returning [`MergeOutcome::Conflict`] — callers never observe a repo
    /// left mid-merge.
    fn merge_no_ff(&self, repo: &Path, branch: &str, message: &str) -> Result<MergeOutcome, GitError>;

    /// Discard all pending edits in the working tree (`git checkout -- .`).
    fn discard_changes(&self, repo: &Path) -> Result<(), GitError>;

    /// List files that differ between two revisions (`git diff --name-only`).
    fn diff_name_only(&self, repo: &Path, from: &str, to: &str) -> Result<Vec<String>, GitError>;

    /// Append a pattern to `.git/info/exclude` if not already present.
    fn add_info_exclude(&self, repo: &Path, pattern: &str) -> Result<(), GitError>;
}
