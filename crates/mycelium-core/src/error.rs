//! Unified error taxonomy for the orchestrator.
//!
//! One variant per named error class, each carrying enough detail for its
//! `Display` impl to print an actionable message (often with a "To fix:"
//! hint) without the caller digging through a backtrace.

use std::fmt;
use std::path::PathBuf;

use crate::ids::{RunId, TaskId};

/// A typed, user-facing error produced anywhere in the orchestrator.
///
/// Every variant maps 1:1 to a named error class.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration at load time.
    Config {
        /// Path to the offending config file.
        path: PathBuf,
        /// What's wrong with it.
        detail: String,
    },

    /// Workspace/git/worker problem for a specific task.
    Task {
        /// The task whose pipeline failed.
        task_id: TaskId,
        /// What went wrong.
        detail: String,
    },

    /// No task could be placed into a batch by the scheduler.
    SchedulerPlacementFailed {
        /// Per-task lock debug lines, one per ready task.
        debug_lines: Vec<String>,
    },

    /// A validator in `block` mode reported failure.
    ValidatorBlock {
        /// The validator name.
        validator: String,
        /// Its summary of why the task is blocked.
        summary: String,
    },

    /// A budget breach in `block` mode.
    BudgetBreach {
        /// `"task"` or `"run"`.
        scope: String,
        /// `"tokens"` or `"cost"`.
        kind: String,
        /// The configured limit that was crossed.
        limit: f64,
        /// The observed value at breach time.
        observed: f64,
    },

    /// The configured container runtime is unavailable.
    Docker {
        /// Underlying detail from the runtime.
        detail: String,
    },

    /// A git operation failed and could not be classified as a conflict.
    Git {
        /// stdout+stderr from the failing git invocation.
        detail: String,
    },

    /// The run-state file is corrupted beyond automatic recovery.
    CorruptRunState {
        /// The run this state belongs to.
        run_id: RunId,
        /// Parse/validation detail.
        detail: String,
    },

    /// Wraps an I/O error with the operation that triggered it.
    Io {
        /// What we were trying to do.
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { path, detail } => write!(
                f,
                "configuration error in '{}': {detail}\n  To fix: edit the config file and correct the issue.",
                path.display()
            ),
            Self::Task { task_id, detail } => write!(
                f,
                "task '{task_id}' failed: {detail}"
            ),
            Self::SchedulerPlacementFailed { debug_lines } => {
                writeln!(f, "scheduler could not place any ready task into a batch:")?;
                for line in debug_lines {
                    writeln!(f, "  {line}")?;
                }
                write!(f, "  To fix: check for a lock conflict that blocks every ready task.")
            }
            Self::ValidatorBlock { validator, summary } => write!(
                f,
                "{validator} validator blocked merge: {summary}"
            ),
            Self::BudgetBreach { scope, kind, limit, observed } => write!(
                f,
                "{scope}-scoped {kind} budget breached: {observed} > {limit}\n  To fix: raise the budget or reduce agent churn, then resume the run."
            ),
            Self::Docker { detail } => write!(
                f,
                "workspace runtime unavailable: {detail}\n  To fix: pass --local-worker to skip containerized execution."
            ),
            Self::Git { detail } => write!(f, "git operation failed: {detail}"),
            Self::CorruptRunState { run_id, detail } => write!(
                f,
                "run-state for '{run_id}' is corrupted: {detail}\n  To fix: run `mycelium resume --run-id {run_id}` to attempt recovery, or `mycelium clean` to discard it."
            ),
            Self::Io { context, source } => write!(f, "I/O error while {context}: {source}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl OrchestratorError {
    /// Wrap an I/O error with a short description of the attempted operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_block_message_names_validator_and_summary() {
        let err = OrchestratorError::ValidatorBlock {
            validator: "Architecture".to_owned(),
            summary: "introduces a cyclic dependency".to_owned(),
        };
        assert_eq!(
            format!("{err}"),
            "Architecture validator blocked merge: introduces a cyclic dependency"
        );
    }

    #[test]
    fn corrupt_run_state_hints_resume_or_clean() {
        let err = OrchestratorError::CorruptRunState {
            run_id: RunId::new("20260101-000000").unwrap(),
            detail: "missing field `tasks`".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("mycelium resume"));
        assert!(msg.contains("mycelium clean"));
    }
}
