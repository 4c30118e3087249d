//! `mycelium run` / `mycelium resume`: wire configuration, persisted state,
//! and the real collaborator adapters together and drive the main loop
//! (`mycelium_orchestrator::engine::run_batch`) to completion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use mycelium_core::config::OrchestratorConfig;
use mycelium_core::events::{Event, EventLog};
use mycelium_core::ids::{ProjectName, RunId, TaskId};
use mycelium_core::manifest::TaskManifest;
use mycelium_core::paths::MyceliumHome;
use mycelium_core::state::{RunHistoryEntry, RunState, RunStatus, StateStore};
use mycelium_git::ProcessGit;
use mycelium_orchestrator::command::ProcessCommandRunner;
use mycelium_orchestrator::engine::{run_batch, Collaborators};
use mycelium_orchestrator::validator::ValidatorSlot;

use crate::adapters::{build_graph_model, build_validator_slots, ShellAgentRunner, ShellDoctor};
use crate::runtime::ShutdownSignal;
use crate::task_dirs::{list_tasks, persist_manifest};

#[derive(Debug)]
pub enum RunCmdError {
    Config(mycelium_core::config::ConfigError),
    State(mycelium_core::state::StateStoreError),
    TaskDir(crate::task_dirs::TaskDirError),
    Orchestrator(mycelium_core::error::OrchestratorError),
    NoTasksFound,
}

impl std::fmt::Display for RunCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::State(e) => write!(f, "{e}"),
            Self::TaskDir(e) => write!(f, "{e}"),
            Self::Orchestrator(e) => write!(f, "{e}"),
            Self::NoTasksFound => write!(f, "no task manifests found under the configured tasks root\n  To fix: run `mycelium plan` first."),
        }
    }
}

impl std::error::Error for RunCmdError {}

/// Shared options for `run` and `resume`.
pub struct RunArgs {
    pub repo_root: PathBuf,
    pub project: Option<String>,
    pub run_id: Option<String>,
    pub max_parallel: Option<usize>,
    pub local_worker: bool,
    pub dry_run: bool,
    pub agent_command: String,
}

/// Start a fresh run: discover pending tasks under the configured tasks
/// root and drive them to completion.
///
/// # Errors
/// See [`RunCmdError`].
pub async fn run(args: RunArgs) -> Result<(), RunCmdError> {
    let config = load_config(&args.repo_root)?;
    let home = MyceliumHome::resolve(&args.repo_root);
    let project_name = args.project.clone().unwrap_or_else(|| config.project.name.clone());
    let project = ProjectName::new(project_name).unwrap_or_else(|_| ProjectName::new("project").unwrap());

    let tasks_root = crate::plan_cmd::default_tasks_root(&args.repo_root, &config);
    let task_files = list_tasks(&tasks_root).map_err(RunCmdError::TaskDir)?;
    if task_files.is_empty() {
        return Err(RunCmdError::NoTasksFound);
    }

    let now = Utc::now();
    let run_id = args.run_id.map_or_else(|| RunId::from_timestamp(now), |s| RunId::new(s).unwrap_or_else(|_| RunId::from_timestamp(now)));

    let mut manifests: BTreeMap<TaskId, TaskManifest> = BTreeMap::new();
    let mut task_specs: BTreeMap<TaskId, String> = BTreeMap::new();
    let mut task_dirs: BTreeMap<TaskId, PathBuf> = BTreeMap::new();
    for tf in task_files {
        task_specs.insert(tf.manifest.id.clone(), tf.spec.clone());
        task_dirs.insert(tf.manifest.id.clone(), tf.dir.clone());
        manifests.insert(tf.manifest.id.clone(), tf.manifest);
    }

    let state = RunState::new(
        run_id.clone(),
        project.clone(),
        args.repo_root.clone(),
        config.project.main_branch.clone(),
        manifests.keys().cloned(),
        now,
    );

    drive(args, config, home, project, state, manifests, task_specs, task_dirs).await
}

/// Resume a previously started run from its persisted state.
///
/// # Errors
/// See [`RunCmdError`].
pub async fn resume(args: RunArgs) -> Result<(), RunCmdError> {
    let config = load_config(&args.repo_root)?;
    let home = MyceliumHome::resolve(&args.repo_root);
    let project_name = args.project.clone().unwrap_or_else(|| config.project.name.clone());
    let project = ProjectName::new(project_name).unwrap_or_else(|_| ProjectName::new("project").unwrap());

    let run_id = args
        .run_id
        .clone()
        .and_then(|s| RunId::new(s).ok())
        .or_else(|| latest_run_id(&home, &project))
        .ok_or(RunCmdError::NoTasksFound)?;

    let state_path = home.run_state_path(&project, &run_id);
    let event_log = EventLog::new(home.orchestrator_log_path(&project, &run_id));
    let now = Utc::now();
    let state = StateStore::load_and_recover(&state_path, &event_log, now, config.staleness_minutes as i64).map_err(RunCmdError::State)?;

    let tasks_root = crate::plan_cmd::default_tasks_root(&args.repo_root, &config);
    let task_files = list_tasks(&tasks_root).map_err(RunCmdError::TaskDir)?;
    let mut manifests: BTreeMap<TaskId, TaskManifest> = BTreeMap::new();
    let mut task_specs: BTreeMap<TaskId, String> = BTreeMap::new();
    let mut task_dirs: BTreeMap<TaskId, PathBuf> = BTreeMap::new();
    for tf in task_files {
        if state.tasks.contains_key(&tf.manifest.id) {
            task_specs.insert(tf.manifest.id.clone(), tf.spec.clone());
            task_dirs.insert(tf.manifest.id.clone(), tf.dir.clone());
            manifests.insert(tf.manifest.id.clone(), tf.manifest);
        }
    }

    drive(args, config, home, project, state, manifests, task_specs, task_dirs).await
}

fn load_config(repo_root: &Path) -> Result<OrchestratorConfig, RunCmdError> {
    OrchestratorConfig::load(&repo_root.join("mycelium.toml")).map_err(RunCmdError::Config)
}

fn latest_run_id(home: &MyceliumHome, project: &ProjectName) -> Option<RunId> {
    let index = mycelium_core::state::load_history_index(&home.run_history_index_path(project)).ok()?;
    index.into_iter().next().map(|e| e.run_id)
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    args: RunArgs,
    mut config: OrchestratorConfig,
    home: MyceliumHome,
    project: ProjectName,
    mut state: RunState,
    mut manifests: BTreeMap<TaskId, TaskManifest>,
    task_specs: BTreeMap<TaskId, String>,
    task_dirs: BTreeMap<TaskId, PathBuf>,
) -> Result<(), RunCmdError> {
    if let Some(max_parallel) = args.max_parallel {
        config.scheduler.max_parallel = max_parallel;
    }

    let state_path = home.run_state_path(&project, &state.run_id);
    let event_log = EventLog::new(home.orchestrator_log_path(&project, &state.run_id));
    let workspaces_root = home.workspaces_root(&project, &state.run_id);

    if args.dry_run {
        print_dry_run(&state, &manifests, &config);
        return Ok(());
    }

    let runtime = crate::runtime::select_workspace_runtime(args.local_worker, &workspaces_root)
        .map_err(|e| RunCmdError::Orchestrator(mycelium_core::error::OrchestratorError::Docker { detail: e.0 }))?;
    let _ = runtime;

    let shutdown = ShutdownSignal::install();

    let git = ProcessGit::new();
    let agent = ShellAgentRunner::new(args.agent_command.clone(), Duration::from_secs(1800));
    let graph = build_graph_model(&config);
    let runner = ProcessCommandRunner;
    let doctor = ShellDoctor { command: config.validators.fallback_command.clone() };
    let validators: Vec<ValidatorSlot> = build_validator_slots(&config);
    let collaborators = Collaborators {
        git: &git,
        agent: &agent,
        graph: &graph,
        runner: &runner,
        doctor: &doctor,
        validators: &validators,
    };

    let start_now = Utc::now();
    event_log
        .append(&Event::new(start_now, "run.start", serde_json::json!({
            "run_id": state.run_id.as_str(),
            "project": project.as_str(),
            "task_count": manifests.len(),
        })))
        .map_err(|e| RunCmdError::Orchestrator(mycelium_core::error::OrchestratorError::io("appending run.start event", std::io::Error::other(e.to_string()))))?;

    loop {
        if shutdown.requested() {
            state.status = RunStatus::Stopped;
            break;
        }
        let now = Utc::now();
        let (has_more, rescoped) = run_batch(&collaborators, &config, &mut state, &mut manifests, &task_specs, &event_log, &workspaces_root, now)
            .map_err(RunCmdError::Orchestrator)?;
        for task_id in &rescoped {
            if let Some(dir) = task_dirs.get(task_id) {
                persist_manifest(dir, &manifests[task_id]).map_err(RunCmdError::TaskDir)?;
            }
        }
        StateStore::save(&state_path, &mut state, now).map_err(RunCmdError::State)?;
        save_history(&home, &project, &state);
        if !has_more {
            if state.status != RunStatus::Failed {
                state.status = RunStatus::Complete;
            }
            break;
        }
    }

    let end_now = Utc::now();
    StateStore::save(&state_path, &mut state, end_now).map_err(RunCmdError::State)?;
    save_history(&home, &project, &state);
    event_log
        .append(&Event::new(end_now, "run.complete", serde_json::json!({
            "run_id": state.run_id.as_str(),
            "status": format!("{:?}", state.status),
        })))
        .map_err(|e| RunCmdError::Orchestrator(mycelium_core::error::OrchestratorError::io("appending run.complete event", std::io::Error::other(e.to_string()))))?;

    Ok(())
}

fn save_history(home: &MyceliumHome, project: &ProjectName, state: &RunState) {
    let entry = RunHistoryEntry {
        run_id: state.run_id.clone(),
        status: state.status,
        started_at: state.started_at,
        updated_at: state.updated_at,
        repo_path: state.repo_path.clone(),
        task_count: state.tasks.len(),
    };
    let _ = mycelium_core::state::upsert_history_index(&home.run_history_index_path(project), entry);
}

fn print_dry_run(state: &RunState, manifests: &BTreeMap<TaskId, TaskManifest>, config: &OrchestratorConfig) {
    let ready = mycelium_orchestrator::scheduler_input::ready_tasks(state, manifests);
    println!("run {} would schedule {} task(s) across {} batch(es) at most (max_parallel={}):", state.run_id, manifests.len(), ready.len(), config.scheduler.max_parallel);
    match mycelium_core::scheduler::build_greedy_batch(&ready, config.scheduler.max_parallel) {
        Ok(first_batch) => {
            for task_id in &first_batch {
                println!("  batch-1: {task_id}");
            }
        }
        Err(e) => {
            println!("  scheduler could not place an initial batch: {:?}", e.debug_lines);
        }
    }
}
