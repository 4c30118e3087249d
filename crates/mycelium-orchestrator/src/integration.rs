//! Merge & Integration.
//!
//! Fix-forward conflict handling: a conflicting branch is abandoned for
//! this batch (its task stays `validated`) rather than quarantined into a
//! separate worktree — the orchestrator gives it another shot next batch
//! iteration instead of attempting automatic conflict resolution.

use mycelium_core::ids::TaskId;
use mycelium_git::{Git, GitError, MergeOutcome};

/// One task branch waiting to be merged into the integration branch.
#[derive(Clone, Debug)]
pub struct ValidatedBranch {
    pub task_id: TaskId,
    pub branch: String,
}

/// A branch whose merge produced conflicts.
#[derive(Clone, Debug)]
pub struct MergeConflict {
    pub task_id: TaskId,
    pub files: Vec<String>,
    pub detail: String,
}

/// Overall batch merge status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrationStatus {
    Merged,
    Skipped,
}

#[derive(Clone, Debug)]
pub struct IntegrationResult {
    pub status: IntegrationStatus,
    pub merged: Vec<TaskId>,
    pub conflicts: Vec<MergeConflict>,
    pub merge_commit: Option<String>,
}

/// Run an integration doctor command against the current worktree.
pub trait IntegrationDoctor: Send + Sync {
    /// Returns `true` if the doctor passed.
    fn run(&self, repo: &std::path::Path) -> bool;
}

/// A scripted doctor for tests.
pub struct FixedDoctor(pub bool);

impl IntegrationDoctor for FixedDoctor {
    fn run(&self, _repo: &std::path::Path) -> bool {
        self.0
    }
}

/// Merge every validated branch for a batch into `main_branch`, then run
/// the integration doctor once if anything merged.
///
/// # Errors
/// Propagates a [`GitError`] from `checkout` (merge failures are
/// classified into [`MergeConflict`]s rather than returned as errors).
pub fn merge_batch(
    git: &dyn Git,
    doctor: &dyn IntegrationDoctor,
    repo: &std::path::Path,
    main_branch: &str,
    branches: &[ValidatedBranch],
) -> Result<IntegrationResult, GitError> {
    git.checkout(repo, main_branch)?;

    let mut merged = Vec::new();
    let mut conflicts = Vec::new();

    for branch in branches {
        let message = format!("Merge task {} ({})", branch.task_id, branch.branch);
        match git.merge_no_ff(repo, &branch.branch, &message)? {
            MergeOutcome::Merged(_) => merged.push(branch.task_id.clone()),
            MergeOutcome::Conflict { files, detail } => {
                conflicts.push(MergeConflict {
                    task_id: branch.task_id.clone(),
                    files,
                    detail,
                });
            }
        }
    }

    if merged.is_empty() {
        return Ok(IntegrationResult {
            status: IntegrationStatus::Skipped,
            merged,
            conflicts,
            merge_commit: None,
        });
    }

    if !doctor.run(repo) {
        return Ok(IntegrationResult {
            status: IntegrationStatus::Skipped,
            merged: Vec::new(),
            conflicts,
            merge_commit: None,
        });
    }

    let merge_commit = git.rev_parse(repo, "HEAD")?;
    Ok(IntegrationResult {
        status: IntegrationStatus::Merged,
        merged,
        conflicts,
        merge_commit: Some(merge_commit),
    })
}
