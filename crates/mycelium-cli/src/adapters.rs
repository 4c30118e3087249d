//! Concrete, shell/process-backed implementations of the orchestrator's
//! external-collaborator traits. Everything in `mycelium-orchestrator` is
//! expressed as a trait so it can be exercised against a fake in tests; this
//! module is where the CLI plugs in the real thing, adapting each trait
//! onto actual subprocess calls rather than reimplementing the collaborator
//! itself.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::process::{Command, Stdio};
use std::time::Duration;

use mycelium_core::config::{OrchestratorConfig, ValidatorModeConfig};
use mycelium_core::manifest::TaskManifest;
use mycelium_core::scope::OwnershipIndex;
use mycelium_orchestrator::agent::{AgentError, AgentRunner, TurnOutcome, TurnRequest};
use mycelium_orchestrator::command::{CommandRunner, ProcessCommandRunner};
use mycelium_orchestrator::graph::FlatGraphModel;
use mycelium_orchestrator::integration::IntegrationDoctor;
use mycelium_orchestrator::planner::{PlanError, Planner};
use mycelium_orchestrator::validator::{Validator, ValidatorInput, ValidatorMode, ValidatorResult, ValidatorSlot, ValidatorStatus};

/// Build the ownership-derived [`FlatGraphModel`] from `[[ownership]]`
/// entries in `mycelium.toml`.
#[must_use]
pub fn build_graph_model(config: &OrchestratorConfig) -> FlatGraphModel {
    let mut index = OwnershipIndex::new();
    for entry in &config.ownership {
        index.add(entry.prefix.clone(), entry.component.clone());
    }
    FlatGraphModel::new(index)
}

/// Build the judge validator pipeline from `[[validators.judges]]`.
#[must_use]
pub fn build_validator_slots(config: &OrchestratorConfig) -> Vec<ValidatorSlot> {
    config
        .validators
        .judges
        .iter()
        .map(|judge| ValidatorSlot {
            name: judge.name.clone(),
            mode: match judge.mode {
                ValidatorModeConfig::Off => ValidatorMode::Off,
                ValidatorModeConfig::Warn => ValidatorMode::Warn,
                ValidatorModeConfig::Block => ValidatorMode::Block,
            },
            validator: Box::new(ShellValidator { command: judge.command.clone() }),
        })
        .collect()
}

/// A [`Validator`] that runs a configured shell command in the task's
/// workspace; non-zero exit is a `fail`, a spawn failure is an `error`.
pub struct ShellValidator {
    command: String,
}

impl Validator for ShellValidator {
    fn evaluate(&self, input: &ValidatorInput<'_>) -> ValidatorResult {
        let runner = ProcessCommandRunner;
        let outcome = runner.run(input.workspace, &self.command, Duration::from_secs(300));
        let status = if outcome.timed_out {
            ValidatorStatus::Error
        } else if outcome.succeeded() {
            ValidatorStatus::Pass
        } else {
            ValidatorStatus::Fail
        };
        let summary = if outcome.succeeded() {
            format!("`{}` passed", self.command)
        } else {
            outcome.stderr.lines().next().unwrap_or("no output").to_owned()
        };
        ValidatorResult { status, summary, report_path: None }
    }
}

/// Doctor that shells out to a single configured command, used for
/// integration verification. Reuses `[validators].fallback_command` — the
/// same checkset fallback an over-wide touch set falls back to — since both
/// represent "run the whole suite" in this project.
pub struct ShellDoctor {
    pub command: String,
}

impl IntegrationDoctor for ShellDoctor {
    fn run(&self, repo: &std::path::Path) -> bool {
        let runner = ProcessCommandRunner;
        runner.run(repo, &self.command, Duration::from_secs(900)).succeeded()
    }
}

/// A coding-agent turn, run by shelling out to a configured command and
/// feeding it the turn's prompt on stdin. The child is expected to emit
/// newline-delimited JSON events on stdout (the same `codex.event` shape the
/// worker loop's token accounting already parses): a `thread.started` event
/// carrying `thread_id`, zero or more progress events, and a final
/// `turn.completed` event carrying `usage` and `changed_files`.
pub struct ShellAgentRunner {
    pub command: String,
    pub timeout: Duration,
}

impl ShellAgentRunner {
    #[must_use]
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self { command: command.into(), timeout }
    }
}

impl AgentRunner for ShellAgentRunner {
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, AgentError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&request.workspace_path)
            .env("MYCELIUM_PROMPT_KIND", format!("{:?}", request.prompt_kind))
            .env_opt("MYCELIUM_THREAD_ID", request.thread_id.as_deref())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError(format!("failed to spawn agent command '{}': {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(request.prompt.as_bytes());
        }

        let output = child
            .wait_with_output()
            .map_err(|e| AgentError(format!("agent command failed: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError(format!(
                "agent command '{}' exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.lines().next().unwrap_or("")
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let codex_events: Vec<serde_json::Value> = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();

        let thread_id = codex_events
            .iter()
            .find_map(|e| {
                let inner = e.get("event")?;
                (inner.get("type")?.as_str()? == "thread.started")
                    .then(|| inner.get("thread_id")?.as_str().map(str::to_owned))
                    .flatten()
            })
            .or_else(|| request.thread_id.clone())
            .unwrap_or_else(|| "unknown-thread".to_owned());

        let changed_files = codex_events
            .iter()
            .rev()
            .find_map(|e| {
                let inner = e.get("event")?;
                (inner.get("type")?.as_str()? == "turn.completed")
                    .then(|| inner.get("changed_files"))
                    .flatten()
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|f| f.as_str().map(str::to_owned)).collect())
            })
            .unwrap_or_default();

        Ok(TurnOutcome {
            thread_id,
            thread_resumed: request.thread_id.is_some(),
            changed_files,
            tokens: mycelium_orchestrator::agent::tokens_from_codex_events(&codex_events),
            codex_events,
        })
    }
}

trait CommandExt {
    fn env_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self;
}

impl CommandExt for Command {
    fn env_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.env(key, v);
        }
        self
    }
}

/// A planner that shells out to a configured command, feeding it the plan
/// text on stdin and expecting a JSON array of task manifests on stdout —
/// the same stdin-in/JSON-out shape [`ShellAgentRunner`] uses for agent
/// turns, so decomposition can be swapped to any LLM-backed tool without
/// touching the orchestrator.
pub struct ShellPlanner {
    pub command: String,
}

impl ShellPlanner {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl Planner for ShellPlanner {
    fn plan(&self, plan_text: &str) -> Result<Vec<TaskManifest>, PlanError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlanError(format!("failed to spawn planner command '{}': {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(plan_text.as_bytes());
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PlanError(format!("planner command failed: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlanError(format!(
                "planner command '{}' exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.lines().next().unwrap_or("")
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| PlanError(format!("planner output was not a JSON array of task manifests: {e}")))
    }
}

/// Doctor commands keyed by component, for the checkset policy,
/// lifted from `[validators].component_commands`.
#[must_use]
pub fn component_commands(config: &OrchestratorConfig) -> BTreeMap<String, String> {
    config.validators.component_commands.clone().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_validator_reports_fail_on_nonzero_exit() {
        let validator = ShellValidator { command: "exit 1".to_owned() };
        let input = ValidatorInput { task_id: "task-001", diff_summary: "", workspace: std::path::Path::new(".") };
        let result = validator.evaluate(&input);
        assert_eq!(result.status, ValidatorStatus::Fail);
    }

    #[test]
    fn shell_validator_reports_pass_on_zero_exit() {
        let validator = ShellValidator { command: "true".to_owned() };
        let input = ValidatorInput { task_id: "task-001", diff_summary: "", workspace: std::path::Path::new(".") };
        let result = validator.evaluate(&input);
        assert_eq!(result.status, ValidatorStatus::Pass);
    }

    #[test]
    fn shell_agent_runner_parses_codex_events_from_stdout() {
        let script = r#"printf '{"event":{"type":"thread.started","thread_id":"t-1"}}\n'; printf '{"event":{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":0,"output_tokens":5},"changed_files":["src/a.rs"]}}\n'"#;
        let runner = ShellAgentRunner::new(script, Duration::from_secs(5));
        let request = TurnRequest {
            prompt_kind: mycelium_orchestrator::agent::PromptKind::Implementation,
            workspace_path: std::env::temp_dir(),
            prompt: "do it".to_owned(),
            thread_id: None,
        };
        let outcome = runner.run_turn(&request).unwrap();
        assert_eq!(outcome.thread_id, "t-1");
        assert_eq!(outcome.changed_files, vec!["src/a.rs".to_owned()]);
        assert_eq!(outcome.tokens.total(), 15);
    }

    #[test]
    fn shell_planner_parses_manifest_array_from_stdout() {
        let script = r#"cat <<'JSON'
[{"id":"task-001","name":"Example","description":"","estimated_minutes":5,"dependencies":[],"locks":{"reads":[],"writes":[]},"files":{"reads":[],"writes":[]},"affected_tests":[],"test_paths":[],"tdd_mode":"off","verify":{"doctor":"true"}}]
JSON"#;
        let planner = ShellPlanner::new(script);
        let manifests = planner.plan("implement login").unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].id.as_str(), "task-001");
    }

    #[test]
    fn shell_planner_errors_on_nonzero_exit() {
        let planner = ShellPlanner::new("exit 3");
        assert!(planner.plan("anything").is_err());
    }

    #[test]
    fn shell_agent_runner_errors_on_nonzero_exit() {
        let runner = ShellAgentRunner::new("exit 7", Duration::from_secs(5));
        let request = TurnRequest {
            prompt_kind: mycelium_orchestrator::agent::PromptKind::Implementation,
            workspace_path: std::env::temp_dir(),
            prompt: "do it".to_owned(),
            thread_id: None,
        };
        assert!(runner.run_turn(&request).is_err());
    }
}
