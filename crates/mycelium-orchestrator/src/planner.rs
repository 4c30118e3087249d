//! External collaborator: the LLM planner.
//!
//! The orchestrator consumes task manifests through this trait only; how
//! prose becomes a `Vec<TaskManifest>` is someone else's concern — the
//! same arm's-length relationship every other external collaborator in
//! this crate (`Git`, `AgentRunner`, `Validator`) has with its real
//! implementation.

use mycelium_core::manifest::TaskManifest;

/// A planning error surfaced to the CLI as an opaque detail string; the
/// planner owns its own richer error type on the other side of this trait.
#[derive(Debug)]
pub struct PlanError(pub String);

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "planning failed: {}", self.0)
    }
}

impl std::error::Error for PlanError {}

/// Turns a human-authored implementation plan into task manifests.
pub trait Planner: Send + Sync {
    /// Decompose `plan_text` into an ordered set of task manifests.
    ///
    /// # Errors
    /// Returns [`PlanError`] if the plan could not be decomposed.
    fn plan(&self, plan_text: &str) -> Result<Vec<TaskManifest>, PlanError>;
}

/// A `Planner` that returns a fixed, pre-baked manifest set — used by
/// scenario tests and dry-run tooling where decomposition is scripted
/// rather than LLM-driven.
pub struct FixedPlanner {
    manifests: Vec<TaskManifest>,
}

impl FixedPlanner {
    #[must_use]
    pub fn new(manifests: Vec<TaskManifest>) -> Self {
        Self { manifests }
    }
}

impl Planner for FixedPlanner {
    fn plan(&self, _plan_text: &str) -> Result<Vec<TaskManifest>, PlanError> {
        Ok(self.manifests.clone())
    }
}
