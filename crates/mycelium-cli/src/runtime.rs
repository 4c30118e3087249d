//! CLI-level async runtime concerns: Ctrl-C cancellation for `run`/`resume`,
//! and picking/preflighting a [`WorkspaceRuntime`] for `--no-docker`.
//!
//! Distinct from `mycelium_orchestrator::runtime`, which is the trait
//! `engine::run_batch` would consume per task if container isolation were
//! wired into the pipeline; today the engine runs every task on the host
//! directly, so this module's `select_workspace_runtime` only does a
//! one-time availability check before the run starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mycelium_orchestrator::runtime::{ContainerId, LocalWorkspaceRuntime, RuntimeError, WorkspaceRuntime};

/// A flag flipped by a background task on the first Ctrl-C; the main loop
/// polls it between batches rather than being torn down mid-batch.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Spawn a task that sets the flag on the first SIGINT/SIGTERM-style
    /// Ctrl-C. Must be called from within a tokio runtime.
    #[must_use]
    pub fn install() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let task_flag = flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                task_flag.store(true, Ordering::SeqCst);
            }
        });
        Self { flag }
    }

    #[must_use]
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Runs every task directly on the host via `docker run`/`docker stop`,
/// used only as a one-time preflight (see module docs) — no task actually
/// runs inside the container it starts here.
pub struct DockerWorkspaceRuntime;

impl WorkspaceRuntime for DockerWorkspaceRuntime {
    fn start(&self, workspace_path: &std::path::Path) -> Result<ContainerId, RuntimeError> {
        let output = std::process::Command::new("docker")
            .args(["run", "-d", "--rm", "-v"])
            .arg(format!("{}:/workspace", workspace_path.display()))
            .args(["busybox", "true"])
            .output()
            .map_err(|e| RuntimeError(format!("failed to spawn docker: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(ContainerId(id))
    }

    fn stop(&self, container_id: &ContainerId) -> Result<(), RuntimeError> {
        let output = std::process::Command::new("docker")
            .args(["rm", "-f", &container_id.0])
            .output()
            .map_err(|e| RuntimeError(format!("failed to spawn docker: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }
}

/// Pick the workspace runtime for `--no-docker`/`--local-worker`, running a
/// one-time `docker` availability preflight (start then stop a scratch
/// container) unless the local-only path was requested.
///
/// # Errors
/// Returns [`RuntimeError`] if Docker was requested but isn't reachable.
pub fn select_workspace_runtime(
    local_worker: bool,
    workspaces_root: &std::path::Path,
) -> Result<Box<dyn WorkspaceRuntime>, RuntimeError> {
    if local_worker {
        return Ok(Box::new(LocalWorkspaceRuntime));
    }
    let docker = DockerWorkspaceRuntime;
    let container = docker.start(workspaces_root)?;
    docker.stop(&container)?;
    Ok(Box::new(docker))
}
