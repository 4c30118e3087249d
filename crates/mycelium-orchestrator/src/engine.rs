//! Orchestrator Engine: the parent main loop.
//!
//! Intra-batch parallelism uses `std::thread::scope` rather than
//! `tokio::spawn`/`JoinSet`: every external-collaborator trait here
//! (`Git`, `AgentRunner`, `CommandRunner`, `GraphModel`) is synchronous by
//! design, and scoped threads let each per-task pipeline borrow those trait
//! objects directly without promoting them to `Arc<dyn _>` + `'static`.
//! `tokio` remains the CLI-level async runtime (signal handling, the
//! `resume` command's entry point); see DESIGN.md.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mycelium_core::budget::TaskUsage;
use mycelium_core::config::OrchestratorConfig;
use mycelium_core::events::{Event, EventLog};
use mycelium_core::ids::{BatchId, TaskId};
use mycelium_core::manifest::TaskManifest;
use mycelium_core::scope::ScopeEvaluation;
use mycelium_core::state::{Batch, BatchStatus, RunState, TaskStatus};
use mycelium_git::Git;

use crate::agent::AgentRunner;
use crate::command::CommandRunner;
use crate::graph::GraphModel;
use crate::integration::{merge_batch, FixedDoctor, IntegrationDoctor, IntegrationStatus, ValidatedBranch};
use crate::scheduler_input::ready_tasks;
use crate::validator::{run_pipeline, ValidatorInput, ValidatorSlot};
use crate::worker::{WorkerLoop, WorkerOutcome, WorkerTask};
use crate::workspace_manager::WorkspaceManager;

/// Everything the engine needs that isn't plain data.
pub struct Collaborators<'a> {
    pub git: &'a dyn Git,
    pub agent: &'a dyn AgentRunner,
    pub graph: &'a dyn GraphModel,
    pub runner: &'a dyn CommandRunner,
    pub doctor: &'a dyn IntegrationDoctor,
    pub validators: &'a [ValidatorSlot],
}

/// Result of running one task's full pipeline (workspace → worker loop).
enum PipelineResult {
    Validated { branch: String, usage: TaskUsage, thread_id: Option<String> },
    Failed { last_error: String, usage: TaskUsage },
    RescopeRequired { evaluation: ScopeEvaluation, usage: TaskUsage },
    AutoRescoped { manifest: TaskManifest, usage: TaskUsage },
}

fn task_branch_name(task_id: &TaskId) -> String {
    format!("mycelium/{task_id}")
}

/// Pick the doctor command for one task's pipeline via the checkset policy:
/// a per-component command chain when every touched component has one
/// configured and the touched-component count is within
/// `max_components_for_scoped`, otherwise the project's manifest-declared
/// doctor command (no scoped commands configured) or the validators'
/// `fallback_command` (too many components touched).
fn resolve_doctor_command(manifest: &TaskManifest, config: &OrchestratorConfig, graph: &dyn GraphModel) -> String {
    if config.validators.component_commands.is_empty() {
        return manifest.verify.doctor.clone();
    }
    let touched_components: Vec<String> =
        manifest.locks.writes.iter().flat_map(|c| graph.derived_write_components(c)).collect();
    let component_commands: std::collections::HashMap<String, String> =
        config.validators.component_commands.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    mycelium_core::scope::select_doctor_command(
        &touched_components,
        &component_commands,
        config.validators.max_components_for_scoped,
        &config.validators.fallback_command,
        false,
    )
}

fn run_task_pipeline(
    collaborators: &Collaborators<'_>,
    config: &OrchestratorConfig,
    manifest: &TaskManifest,
    spec_text: &str,
    repo_path: &Path,
    workspace_path: &Path,
) -> PipelineResult {
    let workspace_manager = WorkspaceManager::new(collaborators.git, config.worker.recover_dirty_workspace);
    let branch = task_branch_name(&manifest.id);

    if let Err(e) = workspace_manager.provision(workspace_path, repo_path, &config.project.main_branch, &branch) {
        return PipelineResult::Failed { last_error: e.to_string(), usage: TaskUsage::default() };
    }

    let scope_config = config.scope;
    let doctor_cmd = resolve_doctor_command(manifest, config, collaborators.graph);
    let task = WorkerTask {
        task_id: manifest.id.clone(),
        spec: spec_text,
        doctor_cmd,
        lint_cmd: config.worker.lint_cmd.clone(),
        bootstrap_cmds: config.worker.bootstrap_cmds.clone(),
        fast_command: config.worker.fast_command.clone(),
        max_retries: config.worker.max_retries,
        doctor_prompt_limit: config.worker.doctor_prompt_limit,
    };
    let worker = WorkerLoop::new(
        collaborators.agent,
        collaborators.graph,
        collaborators.runner,
        &scope_config,
        config.budgets.cost_per_1k,
    );

    match worker.run(&task, manifest.clone(), workspace_path) {
        WorkerOutcome::Validated { thread_id, usage, .. } => {
            PipelineResult::Validated { branch, usage, thread_id }
        }
        WorkerOutcome::Failed { last_error, usage, .. } => PipelineResult::Failed { last_error, usage },
        WorkerOutcome::RescopeRequired { evaluation, usage, .. } => {
            PipelineResult::RescopeRequired { evaluation, usage }
        }
        WorkerOutcome::AutoRescoped { manifest, usage, .. } => PipelineResult::AutoRescoped { manifest, usage },
    }
}

/// Build the doctor the engine uses for integration, defaulting to one
/// that runs `config.worker.fast_command` or always passes when no
/// validator-doctor command is configured. Production call sites should
/// supply their own [`IntegrationDoctor`] via [`Collaborators`]; this
/// helper exists for call sites content with the always-pass fixture.
#[must_use]
pub fn default_doctor() -> impl IntegrationDoctor {
    FixedDoctor(true)
}

/// Advance one batch of the main loop.
///
/// Returns `Ok((true, rescoped))` if the run has more work to do, or
/// `Ok((false, rescoped))` if the run is complete (no pending or running
/// tasks remain). `rescoped` lists the tasks whose manifest was mutated by
/// an auto-rescope this batch — the caller is responsible for persisting
/// the updated entry from `manifests` to that task's on-disk directory, so
/// the rescope survives a restart.
///
/// # Errors
/// Returns [`mycelium_core::error::OrchestratorError::SchedulerPlacementFailed`]
/// on a scheduling deadlock.
pub fn run_batch(
    collaborators: &Collaborators<'_>,
    config: &OrchestratorConfig,
    state: &mut RunState,
    manifests: &mut BTreeMap<TaskId, TaskManifest>,
    task_specs: &BTreeMap<TaskId, String>,
    event_log: &EventLog,
    workspaces_root: &Path,
    now: DateTime<Utc>,
) -> Result<(bool, Vec<TaskId>), mycelium_core::error::OrchestratorError> {
    let pending_or_running = state
        .tasks
        .values()
        .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running));
    if !pending_or_running {
        return Ok((false, Vec::new()));
    }

    let ready = ready_tasks(state, manifests);
    if ready.is_empty() {
        let running_exists = state.tasks.values().any(|t| t.status == TaskStatus::Running);
        if !running_exists {
            state.status = mycelium_core::state::RunStatus::Failed;
            return Err(mycelium_core::error::OrchestratorError::SchedulerPlacementFailed {
                debug_lines: vec!["no ready task and no running task: deadlock".to_owned()],
            });
        }
        return Ok((true, Vec::new()));
    }

    let batch_task_ids = mycelium_core::scheduler::build_greedy_batch(&ready, config.scheduler.max_parallel)
        .map_err(|e| mycelium_core::error::OrchestratorError::SchedulerPlacementFailed { debug_lines: e.debug_lines })?;

    if batch_task_ids.is_empty() {
        let running_exists = state.tasks.values().any(|t| t.status == TaskStatus::Running);
        if !running_exists {
            state.status = mycelium_core::state::RunStatus::Failed;
            return Err(mycelium_core::error::OrchestratorError::SchedulerPlacementFailed {
                debug_lines: vec!["greedy batch placed zero tasks from a non-empty ready set".to_owned()],
            });
        }
        return Ok((true, Vec::new()));
    }

    let batch_id = BatchId::new(format!("batch-{}", state.batches.len() + 1))
        .expect("batch counter always produces a valid slug");

    event_log
        .append(&Event::new(now, "batch.start", serde_json::json!({
            "batch_id": batch_id.as_str(),
            "tasks": batch_task_ids.iter().map(TaskId::as_str).collect::<Vec<_>>(),
        })))
        .map_err(|e| mycelium_core::error::OrchestratorError::io("appending batch.start event", std::io::Error::other(e.to_string())))?;

    state.batches.push(Batch {
        batch_id: batch_id.clone(),
        status: BatchStatus::Running,
        tasks: batch_task_ids.clone(),
        started_at: Some(now),
        completed_at: None,
        merge_commit: None,
        integration_doctor_passed: None,
        locks: None,
    });

    for task_id in &batch_task_ids {
        state.mark_task_running(task_id, batch_id.clone(), now).map_err(|e| {
            mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() }
        })?;
    }

    let repo_path = state.repo_path.clone();
    let results: Vec<(TaskId, PipelineResult)> = std::thread::scope(|scope| {
        let handles: Vec<_> = batch_task_ids
            .iter()
            .map(|task_id| {
                let manifest = manifests[task_id].clone();
                let spec_text = task_specs.get(task_id).cloned().unwrap_or_default();
                let workspace_path: PathBuf = workspaces_root.join(task_id.as_str());
                let repo_path = repo_path.clone();
                scope.spawn(move || {
                    let result =
                        run_task_pipeline(collaborators, config, &manifest, &spec_text, &repo_path, &workspace_path);
                    (manifest.id.clone(), result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("task pipeline thread panicked")).collect()
    });

    let mut validated_branches = Vec::new();
    let mut rescoped = Vec::new();
    for (task_id, result) in results {
        let usage = match &result {
            PipelineResult::Validated { usage, .. }
            | PipelineResult::Failed { usage, .. }
            | PipelineResult::RescopeRequired { usage, .. }
            | PipelineResult::AutoRescoped { usage, .. } => usage.clone(),
        };
        let (before, after) = apply_usage(state, &task_id, &usage);
        let breach = budget_breach(&config.budgets, before, after);

        if let Some((mode, reason)) = breach {
            if mode == mycelium_core::budget::BudgetMode::Block {
                state
                    .transition_task(&task_id, TaskStatus::NeedsHumanReview, now, false)
                    .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
                if let Some(t) = state.tasks.get_mut(&task_id) {
                    t.last_error = Some(reason);
                }
                continue;
            }
        }

        match result {
            PipelineResult::Validated { branch, thread_id, .. } => {
                state
                    .transition_task(&task_id, TaskStatus::Validated, now, false)
                    .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
                if let Some(t) = state.tasks.get_mut(&task_id) {
                    t.branch = Some(branch.clone());
                    t.thread_id = thread_id;
                }
                validated_branches.push((task_id, branch));
            }
            PipelineResult::Failed { last_error, .. } => {
                state
                    .transition_task(&task_id, TaskStatus::Failed, now, false)
                    .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
                if let Some(t) = state.tasks.get_mut(&task_id) {
                    t.last_error = Some(last_error);
                }
            }
            PipelineResult::RescopeRequired { evaluation, .. } => {
                state
                    .transition_task(&task_id, TaskStatus::RescopeRequired, now, false)
                    .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
                if let Some(t) = state.tasks.get_mut(&task_id) {
                    t.last_error = Some(evaluation.reason);
                }
            }
            PipelineResult::AutoRescoped { manifest, .. } => {
                manifests.insert(task_id.clone(), manifest);
                state
                    .transition_task(&task_id, TaskStatus::Pending, now, true)
                    .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
                rescoped.push(task_id.clone());
            }
        }
    }

    // Validator pipeline: run per validated task, applying block reasons.
    let mut post_validator_branches = Vec::new();
    for (task_id, branch) in validated_branches {
        let outcome = run_pipeline(
            collaborators.validators,
            &ValidatorInput {
                task_id: task_id.as_str(),
                diff_summary: "",
                workspace: &workspaces_root.join(task_id.as_str()),
            },
        );
        if let Some(reason) = outcome.block_reason {
            state
                .transition_task(&task_id, TaskStatus::NeedsHumanReview, now, false)
                .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
            if let Some(t) = state.tasks.get_mut(&task_id) {
                t.last_error = Some(reason);
            }
            continue;
        }
        post_validator_branches.push(ValidatedBranch { task_id, branch });
    }

    // Merge & integration.
    let post_validator_len = post_validator_branches.len();
    let integration = merge_batch(
        collaborators.git,
        collaborators.doctor,
        &repo_path,
        &config.project.main_branch,
        &post_validator_branches,
    )
    .map_err(|e| mycelium_core::error::OrchestratorError::Git { detail: e.to_string() })?;

    if integration.status == IntegrationStatus::Merged {
        for task_id in &integration.merged {
            state
                .transition_task(task_id, TaskStatus::Complete, now, false)
                .map_err(|e| mycelium_core::error::OrchestratorError::Task { task_id: task_id.clone(), detail: e.to_string() })?;
        }
    }

    if let Some(batch) = state.batches.iter_mut().find(|b| b.batch_id == batch_id) {
        // Complete only if everything that reached validation actually merged
        // and the integration doctor passed; a doctor failure clears
        // `merged` back to empty (see `merge_batch`), which must not be
        // mistaken for the trivial "nothing to merge" case.
        let all_merged = integration.conflicts.is_empty()
            && (integration.status == IntegrationStatus::Merged || post_validator_len == 0);
        batch.status = if all_merged {
            BatchStatus::Complete
        } else {
            BatchStatus::Failed
        };
        batch.completed_at = Some(now);
        batch.merge_commit = integration.merge_commit.clone();
        batch.integration_doctor_passed = Some(integration.status == IntegrationStatus::Merged);
    }

    event_log
        .append(&Event::new(now, "batch.complete", serde_json::json!({
            "batch_id": batch_id.as_str(),
            "merged": integration.merged.iter().map(TaskId::as_str).collect::<Vec<_>>(),
            "conflicts": integration.conflicts.iter().map(|c| c.task_id.as_str()).collect::<Vec<_>>(),
        })))
        .map_err(|e| mycelium_core::error::OrchestratorError::io("appending batch.complete event", std::io::Error::other(e.to_string())))?;

    Ok((true, rescoped))
}

/// A task-scoped and run-scoped tally snapshot, for before/after budget
/// crossing checks.
#[derive(Clone, Copy, Debug)]
struct UsageSnapshot {
    task_tokens: f64,
    task_cost: f64,
    run_tokens: f64,
    run_cost: f64,
}

/// Fold `usage` into both the task's and the run's running tallies,
/// returning the before/after snapshots so the caller can check budgets.
fn apply_usage(state: &mut RunState, task_id: &TaskId, usage: &TaskUsage) -> (UsageSnapshot, UsageSnapshot) {
    let before = UsageSnapshot {
        task_tokens: state.tasks.get(task_id).map_or(0.0, |t| t.tokens_used as f64),
        task_cost: state.tasks.get(task_id).map_or(0.0, |t| t.estimated_cost),
        run_tokens: state.tokens_used as f64,
        run_cost: state.estimated_cost,
    };

    if let Some(t) = state.tasks.get_mut(task_id) {
        t.tokens_used += usage.tokens_used;
        t.estimated_cost += usage.estimated_cost;
    }
    state.tokens_used += usage.tokens_used;
    state.estimated_cost += usage.estimated_cost;

    let after = UsageSnapshot {
        task_tokens: state.tasks.get(task_id).map_or(0.0, |t| t.tokens_used as f64),
        task_cost: state.tasks.get(task_id).map_or(0.0, |t| t.estimated_cost),
        run_tokens: state.tokens_used as f64,
        run_cost: state.estimated_cost,
    };
    (before, after)
}

/// Check every configured budget limit against the relevant
/// before/after pair, returning the most severe crossing (`Block` wins
/// over `Warn`) with a human-readable reason.
fn budget_breach(
    budgets: &mycelium_core::config::BudgetConfig,
    before: UsageSnapshot,
    after: UsageSnapshot,
) -> Option<(mycelium_core::budget::BudgetMode, String)> {
    use mycelium_core::budget::{check_budget, BudgetKind, BudgetLimit, BudgetMode, BudgetScope};

    let mut winner: Option<(BudgetMode, String)> = None;
    for entry in &budgets.limits {
        let limit = BudgetLimit { scope: entry.scope, kind: entry.kind, mode: entry.mode, limit: entry.limit };
        let (before_v, after_v) = match (entry.scope, entry.kind) {
            (BudgetScope::Task, BudgetKind::Tokens) => (before.task_tokens, after.task_tokens),
            (BudgetScope::Task, BudgetKind::Cost) => (before.task_cost, after.task_cost),
            (BudgetScope::Run, BudgetKind::Tokens) => (before.run_tokens, after.run_tokens),
            (BudgetScope::Run, BudgetKind::Cost) => (before.run_cost, after.run_cost),
        };
        let check = check_budget(&limit, before_v, after_v);
        if !check.breached {
            continue;
        }
        let reason = format!(
            "{:?} budget breached ({:?}/{:?}): observed {:.4} > limit {:.4}",
            entry.mode, entry.scope, entry.kind, check.observed, check.limit
        );
        let is_more_severe = match &winner {
            None => true,
            Some((mode, _)) => entry.mode == BudgetMode::Block && *mode != BudgetMode::Block,
        };
        if is_more_severe {
            winner = Some((entry.mode, reason));
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ScriptedAgent, TurnOutcome};
    use crate::command::ScriptedCommandRunner;
    use crate::graph::FlatGraphModel;
    use mycelium_core::ids::{ProjectName, RunId};
    use mycelium_core::manifest::{Files, Locks, TddMode, Verify};
    use mycelium_git::{GitError, MergeOutcome};
    use std::path::Path;
    use std::sync::Mutex;

    struct FakeGit;
    impl Git for FakeGit {
        fn clone_repo(&self, _s: &Path, dest: &Path) -> Result<(), GitError> {
            std::fs::create_dir_all(dest.join(".git"))?;
            Ok(())
        }
        fn checkout(&self, _r: &Path, _b: &str) -> Result<(), GitError> { Ok(()) }
        fn create_branch(&self, _r: &Path, _b: &str, _f: &str) -> Result<(), GitError> { Ok(()) }
        fn branch_exists(&self, _r: &Path, _b: &str) -> Result<bool, GitError> { Ok(true) }
        fn current_branch(&self, _r: &Path) -> Result<String, GitError> { Ok("main".to_owned()) }
        fn is_clean(&self, _r: &Path, _g: &[String]) -> Result<bool, GitError> { Ok(true) }
        fn remote_url(&self, _r: &Path, _remote: &str) -> Result<Option<String>, GitError> { Ok(None) }
        fn rev_parse(&self, _r: &Path, _rev: &str) -> Result<String, GitError> { Ok("sha".to_owned()) }
        fn merge_no_ff(&self, _r: &Path, _b: &str, _m: &str) -> Result<MergeOutcome, GitError> {
            Ok(MergeOutcome::Merged("sha".to_owned()))
        }
        fn discard_changes(&self, _r: &Path) -> Result<(), GitError> { Ok(()) }
        fn diff_name_only(&self, _r: &Path, _f: &str, _t: &str) -> Result<Vec<String>, GitError> { Ok(vec![]) }
        fn add_info_exclude(&self, _r: &Path, _p: &str) -> Result<(), GitError> { Ok(()) }
    }

    fn manifest(id: &str, writes: &[&str]) -> TaskManifest {
        TaskManifest {
            id: TaskId::new(id).unwrap(),
            name: format!("Task {id}"),
            description: "do the thing".to_owned(),
            estimated_minutes: 10,
            dependencies: vec![],
            locks: Locks { reads: vec![], writes: writes.iter().map(|s| (*s).to_owned()).collect() },
            files: Files::default(),
            affected_tests: vec![],
            test_paths: vec![],
            tdd_mode: TddMode::Off,
            verify: Verify { doctor: "cargo test".to_owned() },
        }
    }

    #[test]
    fn resolve_doctor_command_falls_back_to_manifest_doctor_with_no_checkset_configured() {
        let manifest = manifest("task-001", &["component:auth"]);
        let config = OrchestratorConfig::default();
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        assert_eq!(resolve_doctor_command(&manifest, &config, &graph), "cargo test");
    }

    #[test]
    fn resolve_doctor_command_joins_scoped_commands_when_configured() {
        let manifest = manifest("task-001", &["component:auth", "component:billing"]);
        let mut config = OrchestratorConfig::default();
        config.validators.component_commands.insert("component:auth".to_owned(), "cargo test -p auth".to_owned());
        config.validators.component_commands.insert("component:billing".to_owned(), "cargo test -p billing".to_owned());
        config.validators.max_components_for_scoped = 4;
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        assert_eq!(
            resolve_doctor_command(&manifest, &config, &graph),
            "cargo test -p auth && cargo test -p billing"
        );
    }

    #[test]
    fn resolve_doctor_command_falls_back_beyond_threshold() {
        let manifest = manifest("task-001", &["component:auth", "component:billing"]);
        let mut config = OrchestratorConfig::default();
        config.validators.component_commands.insert("component:auth".to_owned(), "cargo test -p auth".to_owned());
        config.validators.component_commands.insert("component:billing".to_owned(), "cargo test -p billing".to_owned());
        config.validators.max_components_for_scoped = 1;
        config.validators.fallback_command = "cargo test --workspace".to_owned();
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        assert_eq!(resolve_doctor_command(&manifest, &config, &graph), "cargo test --workspace");
    }

    fn turn_outcome() -> TurnOutcome {
        TurnOutcome {
            thread_id: "thread-1".to_owned(),
            thread_resumed: false,
            changed_files: vec![],
            tokens: mycelium_core::budget::TurnTokens::default(),
            codex_events: vec![],
        }
    }

    #[test]
    fn two_independent_tasks_merge_into_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let workspaces_root = dir.path().join("workspaces");
        let events_path = dir.path().join("events.jsonl");
        let event_log = EventLog::new(&events_path);

        let git = FakeGit;
        let agent = ScriptedAgent::new(vec![turn_outcome(), turn_outcome()]);
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        let runner = ScriptedCommandRunner::new(vec![ScriptedCommandRunner::ok(), ScriptedCommandRunner::ok()]);
        let doctor = FixedDoctor(true);
        let validators: Vec<ValidatorSlot> = vec![];
        let collaborators = Collaborators { git: &git, agent: &agent, graph: &graph, runner: &runner, doctor: &doctor, validators: &validators };

        let mut config = OrchestratorConfig::default();
        config.scope.enforcement = mycelium_core::scope::ManifestEnforcement::Off;

        let m1 = manifest("task-001", &["component:a"]);
        let m2 = manifest("task-002", &["component:b"]);
        let mut manifests: BTreeMap<TaskId, TaskManifest> = BTreeMap::new();
        manifests.insert(m1.id.clone(), m1.clone());
        manifests.insert(m2.id.clone(), m2.clone());
        let task_specs: BTreeMap<TaskId, String> = BTreeMap::new();

        let now = DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z").unwrap().with_timezone(&Utc);
        let mut state = RunState::new(
            RunId::from_timestamp(now),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![m1.id.clone(), m2.id.clone()],
            now,
        );

        let (has_more, _rescoped) = run_batch(&collaborators, &config, &mut state, &mut manifests, &task_specs, &event_log, &workspaces_root, now).unwrap();
        assert!(!has_more);
        assert_eq!(state.tasks[&m1.id].status, TaskStatus::Complete);
        assert_eq!(state.tasks[&m2.id].status, TaskStatus::Complete);
        assert_eq!(state.batches.len(), 1);
        assert_eq!(state.batches[0].tasks.len(), 2);
    }

    #[test]
    fn lock_conflict_splits_into_two_batches() {
        let dir = tempfile::tempdir().unwrap();
        let workspaces_root = dir.path().join("workspaces");
        let events_path = dir.path().join("events.jsonl");
        let event_log = EventLog::new(&events_path);

        let git = FakeGit;
        let agent = ScriptedAgent::new(vec![turn_outcome(), turn_outcome(), turn_outcome()]);
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        let runner = ScriptedCommandRunner::new(vec![
            ScriptedCommandRunner::ok(),
            ScriptedCommandRunner::ok(),
            ScriptedCommandRunner::ok(),
        ]);
        let doctor = FixedDoctor(true);
        let validators: Vec<ValidatorSlot> = vec![];
        let collaborators = Collaborators { git: &git, agent: &agent, graph: &graph, runner: &runner, doctor: &doctor, validators: &validators };

        let mut config = OrchestratorConfig::default();
        config.scope.enforcement = mycelium_core::scope::ManifestEnforcement::Off;

        let m1 = manifest("task-001", &["component:a"]);
        let m2 = manifest("task-002", &["component:a"]);
        let m3 = manifest("task-003", &["component:b"]);
        let mut manifests: BTreeMap<TaskId, TaskManifest> = BTreeMap::new();
        for m in [&m1, &m2, &m3] {
            manifests.insert(m.id.clone(), m.clone());
        }
        let task_specs: BTreeMap<TaskId, String> = BTreeMap::new();

        let now = DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z").unwrap().with_timezone(&Utc);
        let mut state = RunState::new(
            RunId::from_timestamp(now),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![m1.id.clone(), m2.id.clone(), m3.id.clone()],
            now,
        );

        let (has_more, _rescoped) = run_batch(&collaborators, &config, &mut state, &mut manifests, &task_specs, &event_log, &workspaces_root, now).unwrap();
        assert!(has_more);
        assert_eq!(state.batches[0].tasks.len(), 2);
        assert_eq!(state.tasks[&m2.id].status, TaskStatus::Pending);

        let (has_more, _rescoped) = run_batch(&collaborators, &config, &mut state, &mut manifests, &task_specs, &event_log, &workspaces_root, now).unwrap();
        assert!(!has_more);
        assert_eq!(state.batches.len(), 2);
        assert_eq!(state.tasks[&m2.id].status, TaskStatus::Complete);
    }

    #[test]
    fn failing_integration_doctor_marks_batch_failed_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let workspaces_root = dir.path().join("workspaces");
        let events_path = dir.path().join("events.jsonl");
        let event_log = EventLog::new(&events_path);

        let git = FakeGit;
        let agent = ScriptedAgent::new(vec![turn_outcome()]);
        let graph = FlatGraphModel::new(mycelium_core::scope::OwnershipIndex::new());
        let runner = ScriptedCommandRunner::new(vec![ScriptedCommandRunner::ok()]);
        let doctor = FixedDoctor(false);
        let validators: Vec<ValidatorSlot> = vec![];
        let collaborators = Collaborators { git: &git, agent: &agent, graph: &graph, runner: &runner, doctor: &doctor, validators: &validators };

        let mut config = OrchestratorConfig::default();
        config.scope.enforcement = mycelium_core::scope::ManifestEnforcement::Off;

        let m1 = manifest("task-001", &["component:a"]);
        let mut manifests: BTreeMap<TaskId, TaskManifest> = BTreeMap::new();
        manifests.insert(m1.id.clone(), m1.clone());
        let task_specs: BTreeMap<TaskId, String> = BTreeMap::new();

        let now = DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z").unwrap().with_timezone(&Utc);
        let mut state = RunState::new(
            RunId::from_timestamp(now),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![m1.id.clone()],
            now,
        );

        run_batch(&collaborators, &config, &mut state, &mut manifests, &task_specs, &event_log, &workspaces_root, now).unwrap();
        assert_eq!(state.tasks[&m1.id].status, TaskStatus::Validated);
        assert_eq!(state.batches[0].status, BatchStatus::Failed);
    }
}
