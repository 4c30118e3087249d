//! Worker Loop: bootstrap → TDD stage A → implement → scope
//! enforcement → lint → doctor, retried up to `max_retries`.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use mycelium_core::budget::{TaskUsage, TurnTokens};
use mycelium_core::ids::TaskId;
use mycelium_core::manifest::{TaskManifest, TddMode};
use mycelium_core::scope::{self, ManifestEnforcement, OwnershipIndex, ScopeConfig, ScopeEvaluation, ScopeStatus};

use crate::agent::{tokens_from_codex_events, AgentError, AgentRunner, PromptKind, TurnRequest};
use crate::command::{CommandOutcome, CommandRunner};
use crate::graph::GraphModel;

/// Truncate a string to at most `limit` bytes (on a char boundary), mirroring
/// the `DOCTOR_PROMPT_LIMIT` truncation rule.
#[must_use]
pub fn truncate_for_prompt(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_owned();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &s[..end])
}

/// Inputs describing one task invocation: a worker runs in one workspace
/// with its manifest's doctor/lint/bootstrap commands and retry budget.
pub struct WorkerTask<'a> {
    pub task_id: TaskId,
    pub spec: &'a str,
    pub doctor_cmd: String,
    pub lint_cmd: Option<String>,
    pub bootstrap_cmds: Vec<String>,
    pub fast_command: Option<String>,
    pub max_retries: u32,
    pub doctor_prompt_limit: usize,
}

/// Classifies why an attempt failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryReason {
    BootstrapFailed,
    TddScopeViolation { evidence_paths: Vec<String> },
    FastTestFailed,
    LintFailed,
    DoctorFailed,
    ScopeViolation,
}

/// A single attempt's record, persisted by the caller to `attempt-N.json`
///.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub retry_reason: Option<RetryReason>,
    pub tokens: TurnTokens,
    pub changed_files: Vec<String>,
}

/// Terminal outcome of the worker loop for one task: `running` transitions
/// to `validated` on success, or to `failed` / `needs_rescope` /
/// `rescope_required` on failure.
///
/// **Open question resolution**: `needs_rescope` and `rescope_required` are
/// not independently distinguishable from the information the worker loop
/// has, so this only ever produces [`WorkerOutcome::RescopeRequired`]; the
/// `needs_rescope` status slot remains reachable solely via operator
/// override (see `mycelium_core::state::transition_task`).
#[derive(Clone, Debug)]
pub enum WorkerOutcome {
    Validated {
        attempts: u32,
        thread_id: Option<String>,
        usage: TaskUsage,
        attempt_records: Vec<AttemptRecord>,
    },
    Failed {
        attempts: u32,
        last_error: String,
        usage: TaskUsage,
        attempt_records: Vec<AttemptRecord>,
    },
    RescopeRequired {
        attempts: u32,
        evaluation: ScopeEvaluation,
        usage: TaskUsage,
        attempt_records: Vec<AttemptRecord>,
    },
    /// Auto-rescope applied: the manifest (returned to the caller, already
    /// mutated) should be persisted and the task reset to `pending` for a
    /// future batch.
    AutoRescoped {
        attempts: u32,
        manifest: TaskManifest,
        usage: TaskUsage,
        attempt_records: Vec<AttemptRecord>,
    },
}

pub struct WorkerLoop<'a> {
    pub agent: &'a dyn AgentRunner,
    pub graph: &'a dyn GraphModel,
    pub runner: &'a dyn CommandRunner,
    pub scope_config: &'a ScopeConfig,
    pub cost_per_1k: f64,
}

impl<'a> WorkerLoop<'a> {
    #[must_use]
    pub fn new(
        agent: &'a dyn AgentRunner,
        graph: &'a dyn GraphModel,
        runner: &'a dyn CommandRunner,
        scope_config: &'a ScopeConfig,
        cost_per_1k: f64,
    ) -> Self {
        Self { agent, graph, runner, scope_config, cost_per_1k }
    }

    /// Drive `manifest` to a green doctor in `workspace_path`, retrying up
    /// to `task.max_retries`.
    pub fn run(
        &self,
        task: &WorkerTask<'_>,
        mut manifest: TaskManifest,
        workspace_path: &Path,
    ) -> WorkerOutcome {
        let mut usage = TaskUsage::default();
        let mut records = Vec::new();
        let mut thread_id: Option<String> = None;
        let mut last_error = String::new();
        let mut fast_failure_evidence = String::new();
        let mut prior_failure_evidence = String::new();

        for attempt in 1..=task.max_retries {
            if attempt == 1 {
                if let Some(outcome) = self.bootstrap(task, workspace_path) {
                    last_error = "bootstrap failed".to_owned();
                    records.push(AttemptRecord {
                        attempt,
                        retry_reason: Some(RetryReason::BootstrapFailed),
                        tokens: TurnTokens::default(),
                        changed_files: Vec::new(),
                    });
                    let _ = outcome;
                    continue;
                }
            }

            if manifest.tdd_mode == TddMode::Strict && task.fast_command.is_some() {
                match self.run_tdd_stage_a(task, &manifest, workspace_path, &mut thread_id, &fast_failure_evidence) {
                    Ok((tokens, _changed)) => {
                        usage.add_turn(tokens, self.cost_per_1k);
                    }
                    Err(reason) => {
                        if let RetryReason::FastTestFailed = &reason {
                            fast_failure_evidence = "fast test command failed".to_owned();
                        }
                        last_error = format!("{reason:?}");
                        records.push(AttemptRecord { attempt, retry_reason: Some(reason), tokens: TurnTokens::default(), changed_files: Vec::new() });
                        continue;
                    }
                }
            }

            let turn_result = self.run_implementation_turn(task, &manifest, workspace_path, &mut thread_id, &prior_failure_evidence);
            let (tokens, changed_files) = match turn_result {
                Ok(pair) => pair,
                Err(e) => {
                    last_error = e.to_string();
                    records.push(AttemptRecord { attempt, retry_reason: None, tokens: TurnTokens::default(), changed_files: Vec::new() });
                    continue;
                }
            };
            usage.add_turn(tokens, self.cost_per_1k);

            let scope_outcome = self.enforce_scope(&changed_files, &mut manifest);
            match scope_outcome {
                ScopeOutcome::Pass => {}
                ScopeOutcome::AutoRescoped => {
                    records.push(AttemptRecord {
                        attempt,
                        retry_reason: None,
                        tokens,
                        changed_files: changed_files.clone(),
                    });
                    return WorkerOutcome::AutoRescoped { attempts: attempt, manifest, usage, attempt_records: records };
                }
                ScopeOutcome::RescopeRequired(evaluation) => {
                    records.push(AttemptRecord {
                        attempt,
                        retry_reason: Some(RetryReason::ScopeViolation),
                        tokens,
                        changed_files: changed_files.clone(),
                    });
                    return WorkerOutcome::RescopeRequired { attempts: attempt, evaluation, usage, attempt_records: records };
                }
            }

            if let Some(lint_cmd) = &task.lint_cmd {
                let outcome = self.runner.run(workspace_path, lint_cmd, Duration::from_secs(120));
                if !outcome.succeeded() {
                    prior_failure_evidence = truncate_for_prompt(&outcome.stderr, task.doctor_prompt_limit);
                    last_error = "lint failed".to_owned();
                    records.push(AttemptRecord { attempt, retry_reason: Some(RetryReason::LintFailed), tokens, changed_files: changed_files.clone() });
                    continue;
                }
            }

            let doctor_outcome = self.runner.run(workspace_path, &task.doctor_cmd, Duration::from_secs(600));
            if doctor_outcome.succeeded() {
                records.push(AttemptRecord { attempt, retry_reason: None, tokens, changed_files });
                return WorkerOutcome::Validated { attempts: attempt, thread_id, usage, attempt_records: records };
            }

            prior_failure_evidence = truncate_for_prompt(&doctor_outcome.stderr, task.doctor_prompt_limit);
            last_error = "doctor failed".to_owned();
            records.push(AttemptRecord { attempt, retry_reason: Some(RetryReason::DoctorFailed), tokens, changed_files });
        }

        WorkerOutcome::Failed { attempts: task.max_retries, last_error, usage, attempt_records: records }
    }

    fn bootstrap(&self, task: &WorkerTask<'_>, workspace_path: &Path) -> Option<CommandOutcome> {
        for cmd in &task.bootstrap_cmds {
            let outcome = self.runner.run(workspace_path, cmd, Duration::from_secs(300));
            if !outcome.succeeded() {
                return Some(outcome);
            }
        }
        None
    }

    fn run_tdd_stage_a(
        &self,
        task: &WorkerTask<'_>,
        manifest: &TaskManifest,
        workspace_path: &Path,
        thread_id: &mut Option<String>,
        fast_failure_evidence: &str,
    ) -> Result<(TurnTokens, Vec<String>), RetryReason> {
        let prompt = format!(
            "{}\n\nWrite or modify tests only for: {}\n{}",
            task.spec, manifest.name, fast_failure_evidence
        );
        let request = TurnRequest {
            prompt_kind: PromptKind::TddStageA,
            workspace_path: workspace_path.to_path_buf(),
            prompt,
            thread_id: thread_id.clone(),
        };
        let outcome = self.agent.run_turn(&request).map_err(|_: AgentError| RetryReason::FastTestFailed)?;
        *thread_id = Some(outcome.thread_id);

        let test_paths = &manifest.test_paths;
        let out_of_scope = outcome
            .changed_files
            .iter()
            .any(|f| !test_paths.iter().any(|pat| glob_matches(pat, f)));
        if out_of_scope {
            return Err(RetryReason::TddScopeViolation { evidence_paths: outcome.changed_files.clone() });
        }

        if let Some(fast_cmd) = &task.fast_command {
            let result = self.runner.run(workspace_path, fast_cmd, Duration::from_secs(120));
            if !result.succeeded() {
                return Err(RetryReason::FastTestFailed);
            }
        }

        let tokens = tokens_from_codex_events(&outcome.codex_events);
        Ok((tokens, outcome.changed_files))
    }

    fn run_implementation_turn(
        &self,
        task: &WorkerTask<'_>,
        manifest: &TaskManifest,
        workspace_path: &Path,
        thread_id: &mut Option<String>,
        prior_failure_evidence: &str,
    ) -> Result<(TurnTokens, Vec<String>), AgentError> {
        let prompt = format!(
            "{}\n\nTask: {}\nDeclared writes: {:?}\nPrior failure evidence: {}",
            task.spec, manifest.description, manifest.files.writes, prior_failure_evidence
        );
        let request = TurnRequest {
            prompt_kind: PromptKind::Implementation,
            workspace_path: workspace_path.to_path_buf(),
            prompt,
            thread_id: thread_id.clone(),
        };
        let outcome = self.agent.run_turn(&request)?;
        *thread_id = Some(outcome.thread_id);
        let tokens = tokens_from_codex_events(&outcome.codex_events);
        Ok((tokens, outcome.changed_files))
    }

    fn enforce_scope(&self, changed_files: &[String], manifest: &mut TaskManifest) -> ScopeOutcome {
        if self.scope_config.enforcement == ManifestEnforcement::Off {
            return ScopeOutcome::Pass;
        }

        let allowed: BTreeSet<String> = manifest
            .locks
            .writes
            .iter()
            .flat_map(|c| self.graph.derived_write_components(c))
            .collect();

        let evaluation = scope::evaluate_scope(changed_files, &allowed, ownership_index(self.graph));

        if evaluation.status == ScopeStatus::Pass {
            return ScopeOutcome::Pass;
        }

        if self.scope_config.enforcement == ManifestEnforcement::Warn {
            manifest.append_writes(changed_files);
            return ScopeOutcome::AutoRescoped;
        }

        // Block mode.
        let can_auto_rescope = self.scope_config.allow_auto_rescope && evaluation.unmapped_files.is_empty();
        if can_auto_rescope {
            manifest.append_writes(changed_files);
            ScopeOutcome::AutoRescoped
        } else {
            ScopeOutcome::RescopeRequired(evaluation)
        }
    }
}

enum ScopeOutcome {
    Pass,
    AutoRescoped,
    RescopeRequired(ScopeEvaluation),
}

fn ownership_index<'a>(graph: &'a dyn GraphModel) -> &'a OwnershipIndex {
    graph.ownership_index()
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(path))
}
