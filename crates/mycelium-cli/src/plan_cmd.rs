//! `mycelium plan`: decompose an implementation plan into task manifests
//! and write them into the project's tasks root in kanban layout.

use std::path::{Path, PathBuf};

use mycelium_core::config::OrchestratorConfig;
use mycelium_core::manifest::TaskManifest;
use mycelium_orchestrator::planner::{PlanError, Planner};

use crate::task_dirs::{read_task_dir, write_task_dir};

#[derive(Debug)]
pub enum PlanCmdError {
    Io(std::io::Error),
    Plan(PlanError),
}

impl std::fmt::Display for PlanCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Plan(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PlanCmdError {}

impl From<std::io::Error> for PlanCmdError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Outcome of one `plan` invocation, for the CLI to report.
#[derive(Debug)]
pub struct PlanReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Decompose `plan_text` (read from `input`) via `planner`, then write a
/// `backlog/<task-id>/{manifest.json,spec.md}` directory per task under
/// `tasks_root`. A task whose fingerprint matches what's already on disk is
/// left untouched — replanning the same input twice is a no-op.
///
/// # Errors
/// Returns [`PlanCmdError::Io`] on a filesystem failure reading the plan
/// input or writing a task directory, or [`PlanCmdError::Plan`] if the
/// planner could not decompose the input.
pub fn run(
    planner: &dyn Planner,
    config: &OrchestratorConfig,
    input: &Path,
    tasks_root: &Path,
) -> Result<PlanReport, PlanCmdError> {
    let plan_text = std::fs::read_to_string(input)?;
    let manifests = planner.plan(&plan_text).map_err(PlanCmdError::Plan)?;

    let mut written = Vec::new();
    let mut unchanged = Vec::new();

    for manifest in manifests {
        let spec = task_spec_text(&manifest);
        let dir = tasks_root.join("backlog").join(manifest.id.as_str());

        if let Ok(existing) = read_task_dir(&dir) {
            if existing.fingerprint() == mycelium_core::manifest::fingerprint(&manifest, &spec) {
                unchanged.push(manifest.id.as_str().to_owned());
                continue;
            }
        }

        write_task_dir(&dir, &manifest, &spec)?;
        written.push(manifest.id.as_str().to_owned());
    }

    let _ = config;
    Ok(PlanReport { written, unchanged })
}

/// The per-task spec text handed to the agent: the manifest's own
/// description, since [`Planner`] returns manifests only, not a separate
/// per-task prose slice.
fn task_spec_text(manifest: &TaskManifest) -> String {
    if manifest.description.is_empty() {
        manifest.name.clone()
    } else {
        manifest.description.clone()
    }
}

#[must_use]
pub fn default_tasks_root(repo_root: &Path, config: &OrchestratorConfig) -> PathBuf {
    repo_root.join(&config.project.tasks_root)
}
