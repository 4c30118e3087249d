//! `mycelium`: project-scoped parallel task orchestrator CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mycelium_core::config::OrchestratorConfig;
use mycelium_core::ids::{ProjectName, RunId, TaskId};
use mycelium_core::paths::MyceliumHome;

use mycelium_cli::adapters::ShellPlanner;
use mycelium_cli::logs_cmd::{LogsArgs, LogsSubcommand};
use mycelium_cli::run_cmd::RunArgs;
use mycelium_cli::{logs_cmd, plan_cmd, run_cmd};

#[derive(Parser)]
#[command(name = "mycelium", about = "Project-scoped parallel task orchestrator for AI coding agents")]
struct Cli {
    /// Repository root; defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose an implementation plan into task manifests.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, env = "MYCELIUM_PLANNER_COMMAND", default_value = "mycelium-planner")]
        planner_command: String,
    },
    /// Start a fresh run over every pending task.
    Run {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        max_parallel: Option<usize>,
        #[arg(long)]
        no_docker: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, env = "MYCELIUM_AGENT_COMMAND", default_value = "mycelium-agent")]
        agent_command: String,
    },
    /// Resume a previously started run.
    Resume {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        max_parallel: Option<usize>,
        #[arg(long)]
        no_docker: bool,
        #[arg(long, env = "MYCELIUM_AGENT_COMMAND", default_value = "mycelium-agent")]
        agent_command: String,
    },
    /// Inspect a run's event log.
    Logs {
        #[command(subcommand)]
        view: LogsView,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        r#type: Option<String>,
    },
}

#[derive(Subcommand)]
enum LogsView {
    Query,
    Search {
        text: String,
    },
    Timeline,
    Failures,
    Doctor,
    Summarize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _telemetry = mycelium_cli::telemetry::init();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::UserFacing(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(1)
        }
        Err(CliError::Internal(msg)) => {
            eprintln!("internal error: {msg}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    UserFacing(String),
    Internal(String),
}

/// A run-state I/O failure or a corrupted run file is an internal error
/// (exit code 2); everything else the orchestrator raises already carries
/// its own user-facing hint (exit code 1).
fn classify_run_error(err: run_cmd::RunCmdError) -> CliError {
    use mycelium_core::error::OrchestratorError;
    match &err {
        run_cmd::RunCmdError::Orchestrator(OrchestratorError::Io { .. } | OrchestratorError::CorruptRunState { .. }) => {
            CliError::Internal(err.to_string())
        }
        _ => CliError::UserFacing(err.to_string()),
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let repo_root = cli.repo;
    match cli.command {
        Commands::Plan { input, output, planner_command } => {
            let config = OrchestratorConfig::load(&repo_root.join("mycelium.toml"))
                .map_err(|e| CliError::UserFacing(e.to_string()))?;
            let tasks_root = output.unwrap_or_else(|| plan_cmd::default_tasks_root(&repo_root, &config));
            let planner = ShellPlanner::new(planner_command);
            let report = plan_cmd::run(&planner, &config, &input, &tasks_root)
                .map_err(|e| CliError::UserFacing(e.to_string()))?;
            println!("wrote {} task(s), {} unchanged", report.written.len(), report.unchanged.len());
            Ok(())
        }
        Commands::Run { project, run_id, max_parallel, no_docker, dry_run, agent_command } => {
            let args = RunArgs { repo_root, project, run_id, max_parallel, local_worker: no_docker, dry_run, agent_command };
            run_cmd::run(args).await.map_err(classify_run_error)
        }
        Commands::Resume { project, run_id, max_parallel, no_docker, agent_command } => {
            let args = RunArgs { repo_root, project, run_id, max_parallel, local_worker: no_docker, dry_run: false, agent_command };
            run_cmd::resume(args).await.map_err(classify_run_error)
        }
        Commands::Logs { view, project, run_id, task, r#type } => {
            let config = OrchestratorConfig::load(&repo_root.join("mycelium.toml"))
                .map_err(|e| CliError::UserFacing(e.to_string()))?;
            let project_name = ProjectName::new(project.unwrap_or(config.project.name))
                .map_err(|e| CliError::UserFacing(e.to_string()))?;
            let run_id = RunId::new(run_id).map_err(|e| CliError::UserFacing(e.to_string()))?;
            let home = MyceliumHome::resolve(&repo_root);
            let log_path = home.orchestrator_log_path(&project_name, &run_id);

            let task_id = task
                .map(TaskId::new)
                .transpose()
                .map_err(|e| CliError::UserFacing(e.to_string()))?;
            let (subcommand, search_text) = match &view {
                LogsView::Query => (LogsSubcommand::Query, None),
                LogsView::Search { text } => (LogsSubcommand::Search, Some(text.as_str())),
                LogsView::Timeline => (LogsSubcommand::Timeline, None),
                LogsView::Failures => (LogsSubcommand::Failures, None),
                LogsView::Doctor => (LogsSubcommand::Doctor, None),
                LogsView::Summarize => (LogsSubcommand::Summarize, None),
            };
            let args = LogsArgs { subcommand, task_id, type_glob: r#type.as_deref(), search_text };
            let lines = logs_cmd::run(&log_path, &args).map_err(|e| CliError::UserFacing(e.to_string()))?;
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
    }
}

