//! Error type for the [`crate::Git`] abstraction.
//!
//! Every variant carries enough context for a caller to decide what to do
//! next without having to re-run `git` by hand to find out what happened.

use std::fmt;
use std::path::PathBuf;

/// Errors produced by a [`crate::Git`] implementation.
#[derive(Debug)]
pub enum GitError {
    /// The `git` binary could not be spawned at all.
    Spawn {
        /// The git subcommand that failed to spawn (e.g. `"clone"`).
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// `git` ran and exited non-zero.
    CommandFailed {
        /// The git subcommand that was run (e.g. `"git merge --no-ff"`).
        command: String,
        /// Process exit code, if the process wasn't killed by a signal.
        exit_code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// Output from `git` could not be parsed as expected (e.g. a malformed OID).
    UnexpectedOutput {
        /// The git subcommand whose output was malformed.
        command: String,
        /// The raw output that failed to parse.
        raw: String,
    },

    /// A path that was expected to be a git repository is not one.
    NotARepo {
        /// The path that was checked.
        path: PathBuf,
    },

    /// A merge attempt produced a conflict. Not a failure in itself — callers
    /// decide whether to treat this as terminal (the caller already aborted
    /// the in-progress merge by the time this is returned).
    MergeConflict {
        /// Files with conflict markers, as reported by `git status --porcelain`.
        files: Vec<String>,
    },
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(
                    f,
                    "failed to spawn `git {command}`: {source}\n  To fix: verify git is installed and on PATH."
                )
            }
            Self::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                write!(f, "`git {command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::UnexpectedOutput { command, raw } => {
                write!(f, "`git {command}` returned unexpected output: {raw:?}")
            }
            Self::NotARepo { path } => {
                write!(
                    f,
                    "{} is not a git repository\n  To fix: remove the directory and let the workspace manager re-clone it.",
                    path.display()
                )
            }
            Self::MergeConflict { files } => {
                write!(f, "merge conflict in {} file(s): {}", files.len(), files.join(", "))
            }
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Recognize the substrings git/jj-style tools use to signal a merge
/// conflict so callers can distinguish "conflict" from "other failure"
/// without depending on locale-specific exact phrasing.
#[must_use]
pub fn looks_like_merge_conflict(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    lowered.contains("automatic merge failed") || lowered.contains("merge conflict")
}
