//! Paths & IDs.
//!
//! Paths are derived, never stored: every function here is a pure
//! computation from `myceliumHome`/`project`/`runId`/`taskId`/`taskSlug`.
//! All writers that consume these paths create parent directories as
//! needed; nothing here touches the filesystem itself.

use std::path::{Path, PathBuf};

use crate::ids::{ProjectName, RunId, TaskId};

/// Process-wide configuration for where mycelium stores its state.
///
/// Injected explicitly (a paths context), never read from a global, so
/// test suites can point it at a scratch directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MyceliumHome(PathBuf);

impl MyceliumHome {
    /// Wrap a root directory as the mycelium home.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self(root.into())
    }

    /// Resolve the default home: `$MYCELIUM_HOME`, or `.mycelium` under the
    /// given repo root.
    #[must_use]
    pub fn resolve(repo_root: &Path) -> Self {
        match std::env::var_os("MYCELIUM_HOME") {
            Some(v) if !v.is_empty() => Self(PathBuf::from(v)),
            _ => Self(repo_root.join(".mycelium")),
        }
    }

    /// Borrow the root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn run_state_dir(&self, project: &ProjectName) -> PathBuf {
        self.0.join("state").join(project.as_str())
    }

    #[must_use]
    pub fn run_state_path(&self, project: &ProjectName, run_id: &RunId) -> PathBuf {
        self.run_state_dir(project)
            .join(format!("run-{run_id}.json"))
    }

    #[must_use]
    pub fn run_history_index_path(&self, project: &ProjectName) -> PathBuf {
        self.run_state_dir(project).join("index.json")
    }

    #[must_use]
    pub fn run_logs_dir(&self, project: &ProjectName, run_id: &RunId) -> PathBuf {
        self.0
            .join("logs")
            .join(project.as_str())
            .join(format!("run-{run_id}"))
    }

    #[must_use]
    pub fn orchestrator_log_path(&self, project: &ProjectName, run_id: &RunId) -> PathBuf {
        self.run_logs_dir(project, run_id).join("orchestrator.jsonl")
    }

    #[must_use]
    pub fn task_logs_dir(
        &self,
        project: &ProjectName,
        run_id: &RunId,
        task_id: &TaskId,
        task_slug: &str,
    ) -> PathBuf {
        self.run_logs_dir(project, run_id)
            .join("tasks")
            .join(format!("{task_id}-{task_slug}"))
    }

    #[must_use]
    pub fn task_events_log(
        &self,
        project: &ProjectName,
        run_id: &RunId,
        task_id: &TaskId,
        task_slug: &str,
    ) -> PathBuf {
        self.task_logs_dir(project, run_id, task_id, task_slug)
            .join("events.jsonl")
    }

    #[must_use]
    pub fn task_workspace_dir(
        &self,
        project: &ProjectName,
        run_id: &RunId,
        task_id: &TaskId,
    ) -> PathBuf {
        self.workspaces_root(project, run_id).join(task_id.as_str())
    }

    /// Parent of every task's workspace directory for one run. The engine's
    /// batch loop joins `task_id` onto this itself; kept in sync with
    /// [`Self::task_workspace_dir`].
    #[must_use]
    pub fn workspaces_root(&self, project: &ProjectName, run_id: &RunId) -> PathBuf {
        self.0
            .join("workspaces")
            .join(project.as_str())
            .join(format!("run-{run_id}"))
    }
}

/// Ensure the parent directory of `path` exists.
///
/// # Errors
/// Propagates the underlying [`std::io::Error`] from `create_dir_all`.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
