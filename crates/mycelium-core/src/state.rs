//! Run-State Store: atomic persistence and staleness recovery.
//!
//! Validate, write to a sibling `.tmp` file, `fsync`, then `rename` over the
//! canonical path. A reader never observes a half-written state file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventLog};
use crate::ids::{BatchId, ProjectName, RunId, TaskId};

/// Default staleness threshold for a `running` run with a stale heartbeat
///.
pub const DEFAULT_STALENESS_THRESHOLD_MINUTES: i64 = 10;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Complete,
    Failed,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Validated,
    Complete,
    Failed,
    NeedsHumanReview,
    NeedsRescope,
    RescopeRequired,
    Skipped,
}

impl TaskStatus {
    fn is_terminal_completed_at(self) -> bool {
        matches!(
            self,
            Self::Complete
                | Self::Failed
                | Self::NeedsHumanReview
                | Self::NeedsRescope
                | Self::RescopeRequired
                | Self::Validated
        )
    }
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub tasks: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_doctor_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locks: Option<Vec<String>>,
}

/// A single recorded validator outcome for a task attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator: String,
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
}

/// Token/cost usage recorded for one worker attempt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttemptUsage {
    pub attempt: u32,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub estimated_cost: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkpoint_commits: Vec<String>,
    #[serde(default)]
    pub validator_results: Vec<ValidatorResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_review: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub usage_by_attempt: Vec<AttemptUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl TaskState {
    /// A freshly-planned task, not yet scheduled.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            batch_id: None,
            branch: None,
            workspace: None,
            logs_dir: None,
            container_id: None,
            started_at: None,
            completed_at: None,
            checkpoint_commits: Vec::new(),
            validator_results: Vec::new(),
            human_review: None,
            tokens_used: 0,
            estimated_cost: 0.0,
            usage_by_attempt: Vec::new(),
            last_error: None,
            thread_id: None,
        }
    }
}

/// Optional snapshot of the control-plane graph used to plan this run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlPlaneSnapshot {
    pub base_sha: String,
    pub graph_fingerprint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub project: ProjectName,
    pub repo_path: PathBuf,
    pub main_branch: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub batches: Vec<Batch>,
    pub tasks: BTreeMap<TaskId, TaskState>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneSnapshot>,
}

impl RunState {
    /// Create a freshly-started run state with all tasks pending.
    #[must_use]
    pub fn new(
        run_id: RunId,
        project: ProjectName,
        repo_path: PathBuf,
        main_branch: impl Into<String>,
        task_ids: impl IntoIterator<Item = TaskId>,
        now: DateTime<Utc>,
    ) -> Self {
        let tasks = task_ids
            .into_iter()
            .map(|id| (id, TaskState::pending()))
            .collect();
        Self {
            run_id,
            project,
            repo_path,
            main_branch: main_branch.into(),
            started_at: now,
            updated_at: now,
            status: RunStatus::Running,
            batches: Vec::new(),
            tasks,
            tokens_used: 0,
            estimated_cost: 0.0,
            control_plane: None,
        }
    }

    /// Apply `markTaskRunning`: increment attempts, record batch
    /// membership, transition to `running`.
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the task is missing or not currently
    /// `pending`.
    pub fn mark_task_running(
        &mut self,
        task_id: &TaskId,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TransitionError::UnknownTask(task_id.clone()))?;
        if task.status != TaskStatus::Pending {
            return Err(TransitionError::Illegal {
                task_id: task_id.clone(),
                from: task.status,
                to: TaskStatus::Running,
            });
        }
        task.attempts += 1;
        task.batch_id = Some(batch_id);
        task.status = TaskStatus::Running;
        task.started_at.get_or_insert(now);
        Ok(())
    }

    /// Apply a general task transition, enforcing the legal-move table.
    /// Operator overrides (`any(!running) -> {pending, skipped, complete,
    /// failed}`) bypass the forward-only rules.
    ///
    /// # Errors
    /// Returns [`TransitionError::Illegal`] if the move is not permitted.
    pub fn transition_task(
        &mut self,
        task_id: &TaskId,
        to: TaskStatus,
        now: DateTime<Utc>,
        operator_override: bool,
    ) -> Result<(), TransitionError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TransitionError::UnknownTask(task_id.clone()))?;
        let from = task.status;

        let legal = if operator_override {
            from != TaskStatus::Running
                && matches!(
                    to,
                    TaskStatus::Pending
                        | TaskStatus::Skipped
                        | TaskStatus::Complete
                        | TaskStatus::Failed
                )
        } else {
            is_forward_transition_legal(from, to)
        };

        if !legal {
            return Err(TransitionError::Illegal {
                task_id: task_id.clone(),
                from,
                to,
            });
        }

        task.status = to;
        if to.is_terminal_completed_at() {
            task.completed_at.get_or_insert(now);
        }
        Ok(())
    }

    /// Staleness recovery: demote a stuck `running` run to `paused`,
    /// reset its running tasks and batches, and return whether recovery
    /// happened (so the caller can decide whether to emit
    /// `run.stale_recovery`).
    pub fn recover_if_stale(&mut self, now: DateTime<Utc>, threshold_minutes: i64) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        let stale = now - self.updated_at > Duration::minutes(threshold_minutes);
        if !stale {
            return false;
        }
        self.status = RunStatus::Paused;
        self.reset_running_tasks("Stale recovery: run had not progressed recently.", now);
        true
    }

    /// `resetRunningTasks`: every `running` task becomes `pending`
    /// with workspace/branch/container state cleared; every `running` batch
    /// becomes `failed`. Idempotent: calling this twice on an already-reset
    /// state is a no-op.
    pub fn reset_running_tasks(&mut self, reason: &str, now: DateTime<Utc>) {
        for task in self.tasks.values_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                task.batch_id = None;
                task.branch = None;
                task.workspace = None;
                task.container_id = None;
                task.logs_dir = None;
                task.validator_results.clear();
                task.last_error = Some(reason.to_owned());
            }
        }
        for batch in &mut self.batches {
            if batch.status == BatchStatus::Running {
                batch.status = BatchStatus::Failed;
                batch.completed_at.get_or_insert(now);
            }
        }
    }
}

fn is_forward_transition_legal(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::{
        Complete, Failed, NeedsHumanReview, NeedsRescope, Pending, RescopeRequired, Running,
        Validated,
    };
    match (from, to) {
        (Pending, Running) => true,
        (Running, Validated) => true,
        (Running, Failed | NeedsRescope | RescopeRequired) => true,
        (Validated, Complete) => true,
        (Validated | Running | Complete, NeedsHumanReview) => true,
        _ => false,
    }
}

/// A rejected task-state transition.
#[derive(Debug)]
pub enum TransitionError {
    UnknownTask(TaskId),
    Illegal {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTask(id) => write!(f, "no such task '{id}' in run state"),
            Self::Illegal { task_id, from, to } => write!(
                f,
                "illegal transition for task '{task_id}': {from:?} -> {to:?}"
            ),
        }
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Atomic store
// ---------------------------------------------------------------------------

/// Errors from loading or saving a [`RunState`].
#[derive(Debug)]
pub enum StateStoreError {
    NotFound(PathBuf),
    Corrupt { path: PathBuf, detail: String },
    Io(std::io::Error),
}

impl std::fmt::Display for StateStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "run state not found: {}", p.display()),
            Self::Corrupt { path, detail } => write!(
                f,
                "run-state for '{}' is corrupted: {detail}\n  To fix: run `mycelium resume` to attempt recovery, or `mycelium clean` to discard it.",
                path.display()
            ),
            Self::Io(e) => write!(f, "I/O error accessing run state: {e}"),
        }
    }
}

impl std::error::Error for StateStoreError {}

impl From<std::io::Error> for StateStoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Crash-safe persistence for [`RunState`].
pub struct StateStore;

impl StateStore {
    /// Write `state` to `path` via write-temp → fsync → rename. Sets
    /// `updated_at` to `now` before serializing.
    ///
    /// # Errors
    /// Propagates I/O failures from the temp-write, fsync, or rename steps.
    pub fn save(path: &Path, state: &mut RunState, now: DateTime<Utc>) -> Result<(), StateStoreError> {
        state.updated_at = now;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_name = format!(
            "{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
            uuid::Uuid::new_v4()
        );
        let tmp_path = path.with_file_name(tmp_name);

        let json = serde_json::to_string_pretty(state).map_err(|e| StateStoreError::Corrupt {
            path: path.to_path_buf(),
            detail: format!("failed to serialize run state: {e}"),
        })?;

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load and schema-validate a run state from `path`, applying staleness
    /// recovery if needed. Returns the loaded state plus whether recovery
    /// was applied (the caller emits `run.stale_recovery` and persists).
    ///
    /// # Errors
    /// [`StateStoreError::NotFound`] if `path` doesn't exist;
    /// [`StateStoreError::Corrupt`] on a schema-validation failure.
    pub fn load(
        path: &Path,
        now: DateTime<Utc>,
        staleness_threshold_minutes: i64,
    ) -> Result<(RunState, bool), StateStoreError> {
        if !path.exists() {
            return Err(StateStoreError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let mut state: RunState = serde_json::from_str(&raw).map_err(|e| StateStoreError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let recovered = state.recover_if_stale(now, staleness_threshold_minutes);
        Ok((state, recovered))
    }

    /// Load a run state and, if staleness recovery applied, persist the
    /// recovered state and append a `run.stale_recovery` event.
    ///
    /// # Errors
    /// Propagates [`StateStoreError`] from the underlying load/save, or
    /// wraps an event-log append failure as [`StateStoreError::Io`].
    pub fn load_and_recover(
        path: &Path,
        event_log: &EventLog,
        now: DateTime<Utc>,
        staleness_threshold_minutes: i64,
    ) -> Result<RunState, StateStoreError> {
        let (mut state, recovered) = Self::load(path, now, staleness_threshold_minutes)?;
        if recovered {
            let event = Event::new(now, "run.stale_recovery", serde_json::json!({
                "run_id": state.run_id.as_str(),
            }));
            event_log
                .append(&event)
                .map_err(|e| StateStoreError::Io(std::io::Error::other(e.to_string())))?;
            Self::save(path, &mut state, now)?;
        }
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Run history index
// ---------------------------------------------------------------------------

/// One row of the per-project `index.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub run_id: RunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub repo_path: PathBuf,
    pub task_count: usize,
}

/// Load the run history index, sorted by `updated_at` descending and
/// deduped by `run_id` (last write wins).
///
/// # Errors
/// Propagates I/O and JSON-parse failures.
pub fn load_history_index(path: &Path) -> Result<Vec<RunHistoryEntry>, StateStoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let entries: Vec<RunHistoryEntry> =
        serde_json::from_str(&raw).map_err(|e| StateStoreError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    Ok(sorted_deduped(entries))
}

/// Insert or update `entry` in the index at `path`, writing it back
/// atomically via the same temp-rename discipline as [`StateStore::save`].
///
/// # Errors
/// Propagates I/O failures.
pub fn upsert_history_index(path: &Path, entry: RunHistoryEntry) -> Result<(), StateStoreError> {
    let mut entries = load_history_index(path)?;
    entries.retain(|e| e.run_id != entry.run_id);
    entries.push(entry);
    let entries = sorted_deduped(entries);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_file_name(format!(
        "{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("index.json"),
        uuid::Uuid::new_v4()
    ));
    let json = serde_json::to_string_pretty(&entries).map_err(|e| StateStoreError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sorted_deduped(mut entries: Vec<RunHistoryEntry>) -> Vec<RunHistoryEntry> {
    let mut seen = std::collections::HashSet::new();
    entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    entries.retain(|e| seen.insert(e.run_id.clone()));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn task_id(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn sample_state() -> RunState {
        RunState::new(
            RunId::new("20260727-120000").unwrap(),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![task_id("task-001"), task_id("task-002")],
            now(),
        )
    }

    #[test]
    fn mark_task_running_increments_attempts() {
        let mut state = sample_state();
        let batch = BatchId::new("batch-1").unwrap();
        state
            .mark_task_running(&task_id("task-001"), batch.clone(), now())
            .unwrap();
        let t = &state.tasks[&task_id("task-001")];
        assert_eq!(t.attempts, 1);
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(t.batch_id, Some(batch));
    }

    #[test]
    fn mark_task_running_rejects_non_pending() {
        let mut state = sample_state();
        let batch = BatchId::new("batch-1").unwrap();
        state
            .mark_task_running(&task_id("task-001"), batch.clone(), now())
            .unwrap();
        let err = state
            .mark_task_running(&task_id("task-001"), batch, now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn legal_transition_table_forward_path() {
        let mut state = sample_state();
        let batch = BatchId::new("batch-1").unwrap();
        let id = task_id("task-001");
        state.mark_task_running(&id, batch, now()).unwrap();
        state
            .transition_task(&id, TaskStatus::Validated, now(), false)
            .unwrap();
        state
            .transition_task(&id, TaskStatus::Complete, now(), false)
            .unwrap();
        assert_eq!(state.tasks[&id].status, TaskStatus::Complete);
        assert!(state.tasks[&id].completed_at.is_some());
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut state = sample_state();
        let id = task_id("task-001");
        let err = state
            .transition_task(&id, TaskStatus::Complete, now(), false)
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn operator_override_allows_non_running_to_pending() {
        let mut state = sample_state();
        let id = task_id("task-001");
        state
            .transition_task(&id, TaskStatus::Skipped, now(), true)
            .unwrap();
        state
            .transition_task(&id, TaskStatus::Pending, now(), true)
            .unwrap();
        assert_eq!(state.tasks[&id].status, TaskStatus::Pending);
    }

    #[test]
    fn operator_override_rejects_from_running() {
        let mut state = sample_state();
        let batch = BatchId::new("batch-1").unwrap();
        let id = task_id("task-001");
        state.mark_task_running(&id, batch, now()).unwrap();
        let err = state
            .transition_task(&id, TaskStatus::Skipped, now(), true)
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn stale_recovery_demotes_and_resets() {
        let mut state = sample_state();
        let batch_id = BatchId::new("batch-1").unwrap();
        state
            .mark_task_running(&task_id("task-001"), batch_id.clone(), now())
            .unwrap();
        state.batches.push(Batch {
            batch_id,
            status: BatchStatus::Running,
            tasks: vec![task_id("task-001")],
            started_at: Some(now()),
            completed_at: None,
            merge_commit: None,
            integration_doctor_passed: None,
            locks: None,
        });
        state.updated_at = now() - Duration::minutes(30);

        let later = now();
        let recovered = state.recover_if_stale(later, DEFAULT_STALENESS_THRESHOLD_MINUTES);
        assert!(recovered);
        assert_eq!(state.status, RunStatus::Paused);
        let t = &state.tasks[&task_id("task-001")];
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.workspace.is_none());
        assert!(t.last_error.as_deref().unwrap().contains("Stale recovery"));
        assert_eq!(state.batches[0].status, BatchStatus::Failed);
    }

    #[test]
    fn stale_recovery_is_idempotent() {
        let mut state = sample_state();
        state.updated_at = now() - Duration::minutes(30);
        let later = now();
        assert!(state.recover_if_stale(later, DEFAULT_STALENESS_THRESHOLD_MINUTES));
        let snapshot = serde_json::to_string(&state).unwrap();
        assert!(!state.recover_if_stale(later, DEFAULT_STALENESS_THRESHOLD_MINUTES));
        assert_eq!(serde_json::to_string(&state).unwrap(), snapshot);
    }

    #[test]
    fn recover_if_stale_no_op_when_not_running() {
        let mut state = sample_state();
        state.status = RunStatus::Paused;
        state.updated_at = now() - Duration::minutes(30);
        assert!(!state.recover_if_stale(now(), DEFAULT_STALENESS_THRESHOLD_MINUTES));
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-20260727-120000.json");
        let mut state = sample_state();
        StateStore::save(&path, &mut state, now()).unwrap();

        let (loaded, recovered) = StateStore::load(&path, now(), DEFAULT_STALENESS_THRESHOLD_MINUTES).unwrap();
        assert!(!recovered);
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.tasks.len(), 2);
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-20260727-120000.json");
        let mut state = sample_state();
        StateStore::save(&path, &mut state, now()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_missing_file_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = StateStore::load(&path, now(), DEFAULT_STALENESS_THRESHOLD_MINUTES).unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[test]
    fn load_corrupt_file_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-x.json");
        fs::write(&path, b"not json").unwrap();
        let err = StateStore::load(&path, now(), DEFAULT_STALENESS_THRESHOLD_MINUTES).unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt { .. }));
    }

    #[test]
    fn history_index_sorted_desc_and_deduped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        upsert_history_index(&path, RunHistoryEntry {
            run_id: RunId::new("20260101-000000").unwrap(),
            status: RunStatus::Complete,
            started_at: now() - Duration::days(1),
            updated_at: now() - Duration::days(1),
            repo_path: PathBuf::from("/repo"),
            task_count: 3,
        }).unwrap();
        upsert_history_index(&path, RunHistoryEntry {
            run_id: RunId::new("20260727-120000").unwrap(),
            status: RunStatus::Running,
            started_at: now(),
            updated_at: now(),
            repo_path: PathBuf::from("/repo"),
            task_count: 5,
        }).unwrap();
        // Update the first entry again; it should not duplicate.
        upsert_history_index(&path, RunHistoryEntry {
            run_id: RunId::new("20260101-000000").unwrap(),
            status: RunStatus::Failed,
            started_at: now() - Duration::days(1),
            updated_at: now() - Duration::hours(1),
            repo_path: PathBuf::from("/repo"),
            task_count: 3,
        }).unwrap();

        let entries = load_history_index(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].run_id, RunId::new("20260727-120000").unwrap());
        assert_eq!(entries[1].status, RunStatus::Failed);
    }
}
