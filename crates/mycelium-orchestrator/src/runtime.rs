//! External collaborator: the container runtime.
//!
//! Workspaces may optionally run inside a container; its lifecycle and log
//! streaming are out of scope here, consumed only through this trait.

/// A running container handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerId(pub String);

/// Errors from the workspace runtime.
#[derive(Debug)]
pub struct RuntimeError(pub String);

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "workspace runtime unavailable: {}\n  To fix: pass --local-worker to skip containerized execution.",
            self.0
        )
    }
}

impl std::error::Error for RuntimeError {}

/// Optional container lifecycle for a task workspace.
pub trait WorkspaceRuntime: Send + Sync {
    /// Start a container bound to `workspace_path`, returning its id.
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the runtime is unavailable or the
    /// container fails to start.
    fn start(&self, workspace_path: &std::path::Path) -> Result<ContainerId, RuntimeError>;

    /// Stop and remove a container.
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the stop call fails.
    fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError>;
}

/// A `WorkspaceRuntime` that runs every task directly on the host — the
/// `--local-worker` path, and the default for scenario tests.
pub struct LocalWorkspaceRuntime;

impl WorkspaceRuntime for LocalWorkspaceRuntime {
    fn start(&self, _workspace_path: &std::path::Path) -> Result<ContainerId, RuntimeError> {
        Ok(ContainerId("local".to_owned()))
    }

    fn stop(&self, _container_id: &ContainerId) -> Result<(), RuntimeError> {
        Ok(())
    }
}
