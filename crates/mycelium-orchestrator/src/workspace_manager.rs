//! Workspace Manager: per-task git clones and recovery.

use std::path::{Path, PathBuf};

use mycelium_git::Git;

/// Internal runtime files mycelium itself writes into a workspace; these
/// never count against the clean-tree check.
fn ignored_globs() -> Vec<String> {
    vec![".task-orchestrator/**".to_owned()]
}

/// Result of materializing a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceHandle {
    pub workspace_path: PathBuf,
    pub created: bool,
    pub recovered: bool,
}

/// A workspace-provisioning failure, always carrying a fix hint (remove the
/// stale workspace, or start a new run).
#[derive(Debug)]
pub enum WorkspaceError {
    Git(mycelium_git::GitError),
    DirtyWorkingTree { path: PathBuf },
    OriginMismatch { expected: PathBuf, found: String },
    MainBranchMissing { branch: String },
    NotARepo { path: PathBuf },
}

impl std::fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git(e) => write!(f, "{e}"),
            Self::DirtyWorkingTree { path } => write!(
                f,
                "workspace at '{}' has uncommitted changes\n  To fix: remove the workspace directory or start a new run id.",
                path.display()
            ),
            Self::OriginMismatch { expected, found } => write!(
                f,
                "workspace origin does not match repo path (expected '{}', found '{found}')\n  To fix: remove the workspace directory or start a new run id.",
                expected.display()
            ),
            Self::MainBranchMissing { branch } => write!(
                f,
                "main branch '{branch}' does not exist in the workspace\n  To fix: remove the workspace directory or start a new run id."
            ),
            Self::NotARepo { path } => write!(
                f,
                "'{}' exists but is not a git repository\n  To fix: remove the workspace directory or start a new run id.",
                path.display()
            ),
        }
    }
}

impl std::error::Error for WorkspaceError {}

impl From<mycelium_git::GitError> for WorkspaceError {
    fn from(e: mycelium_git::GitError) -> Self {
        Self::Git(e)
    }
}

pub struct WorkspaceManager<'a> {
    git: &'a dyn Git,
    recover_dirty_workspace: bool,
}

impl<'a> WorkspaceManager<'a> {
    #[must_use]
    pub fn new(git: &'a dyn Git, recover_dirty_workspace: bool) -> Self {
        Self { git, recover_dirty_workspace }
    }

    /// Materialize or recover the workspace at `workspace_path` for
    /// `(repo_path, main_branch, task_branch)`.
    ///
    /// # Errors
    /// See [`WorkspaceError`] variants.
    pub fn provision(
        &self,
        workspace_path: &Path,
        repo_path: &Path,
        main_branch: &str,
        task_branch: &str,
    ) -> Result<WorkspaceHandle, WorkspaceError> {
        if !workspace_path.exists() {
            self.git.clone_repo(repo_path, workspace_path)?;
            self.git.checkout(workspace_path, main_branch)?;
            self.git.create_branch(workspace_path, task_branch, main_branch)?;
            self.git.add_info_exclude(workspace_path, ".task-orchestrator/**")?;
            return Ok(WorkspaceHandle {
                workspace_path: workspace_path.to_path_buf(),
                created: true,
                recovered: false,
            });
        }

        self.verify_existing(workspace_path, repo_path, main_branch)?;

        let mut recovered = false;
        if !self.git.branch_exists(workspace_path, task_branch)? {
            self.git.create_branch(workspace_path, task_branch, main_branch)?;
        }
        self.git.checkout(workspace_path, task_branch)?;

        if self.recover_dirty_workspace && !self.git.is_clean(workspace_path, &ignored_globs())? {
            self.git.discard_changes(workspace_path)?;
            recovered = true;
        }

        Ok(WorkspaceHandle {
            workspace_path: workspace_path.to_path_buf(),
            created: false,
            recovered,
        })
    }

    fn verify_existing(
        &self,
        workspace_path: &Path,
        repo_path: &Path,
        main_branch: &str,
    ) -> Result<(), WorkspaceError> {
        if !workspace_path.join(".git").exists() {
            return Err(WorkspaceError::NotARepo { path: workspace_path.to_path_buf() });
        }
        if !self.recover_dirty_workspace && !self.git.is_clean(workspace_path, &ignored_globs())? {
            return Err(WorkspaceError::DirtyWorkingTree { path: workspace_path.to_path_buf() });
        }

        let origin = self
            .git
            .remote_url(workspace_path, "origin")?
            .ok_or_else(|| WorkspaceError::OriginMismatch {
                expected: canonicalize_lossy(repo_path),
                found: "<no origin configured>".to_owned(),
            })?;
        let expected = canonicalize_lossy(repo_path);
        let found = canonicalize_lossy(Path::new(&origin));
        if expected != found {
            return Err(WorkspaceError::OriginMismatch { expected, found: origin });
        }

        if !self.git.branch_exists(workspace_path, main_branch)? {
            return Err(WorkspaceError::MainBranchMissing { branch: main_branch.to_owned() });
        }
        Ok(())
    }
}

fn canonicalize_lossy(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
