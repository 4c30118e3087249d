//! Project configuration (`mycelium.toml`), ambient to the orchestrator.
//!
//! Every field is defaulted, unknown keys are rejected at load time so a
//! typo in the TOML surfaces immediately instead of silently doing
//! nothing, and a missing file resolves to defaults rather than an error.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::budget::{BudgetKind, BudgetMode, BudgetScope};
use crate::scope::ScopeConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectConfig {
    pub name: String,
    pub main_branch: String,
    pub tasks_root: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "project".to_owned(),
            main_branch: "main".to_owned(),
            tasks_root: "tasks".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerConfig {
    pub max_retries: u32,
    pub bootstrap_timeout_seconds: u64,
    pub lint_timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    pub recover_dirty_workspace: bool,
    pub bootstrap_cmds: Vec<String>,
    pub lint_cmd: Option<String>,
    pub fast_command: Option<String>,
    pub doctor_prompt_limit: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            bootstrap_timeout_seconds: 300,
            lint_timeout_seconds: 120,
            doctor_timeout_seconds: 600,
            recover_dirty_workspace: true,
            bootstrap_cmds: Vec::new(),
            lint_cmd: None,
            fast_command: None,
            doctor_prompt_limit: 4000,
        }
    }
}

/// How a configured validator judge's result affects the run (mirrors
/// `mycelium_orchestrator::validator::ValidatorMode`, duplicated here since
/// this crate sits below the orchestrator crate in the dependency graph;
/// the CLI maps one onto the other when it builds `ValidatorSlot`s).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorModeConfig {
    Off,
    Warn,
    Block,
}

/// One configured validator judge. `command` is the shell command the
/// CLI's shell-backed `Validator` runs; a non-zero exit is a `fail`. Real
/// LLM-judge providers are out of scope, so `provider` and `model` aren't
/// modeled here — only the shell-command adapter is.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorJudgeConfig {
    pub name: String,
    pub mode: ValidatorModeConfig,
    pub command: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ValidatorsConfig {
    pub enabled: Vec<String>,
    pub max_components_for_scoped: usize,
    pub fallback_command: String,
    /// Per-component doctor commands for the checkset policy
    /// (`select_doctor_command`'s `component_commands`), keyed by the same
    /// component names used in [`OrchestratorConfig::ownership`].
    pub component_commands: std::collections::BTreeMap<String, String>,
    /// The judge validator pipeline slots, run in declaration order against
    /// every validated task before merge.
    pub judges: Vec<ValidatorJudgeConfig>,
}

impl Default for ValidatorsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["tests".to_owned(), "style".to_owned()],
            max_components_for_scoped: 3,
            fallback_command: "cargo test --workspace".to_owned(),
            component_commands: std::collections::BTreeMap::new(),
            judges: Vec::new(),
        }
    }
}

/// One `(root_prefix, component)` entry for the file-ownership index used by
/// scope enforcement and the checkset policy, loaded from
/// `[[ownership]]` tables in `mycelium.toml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnershipEntry {
    pub prefix: String,
    pub component: String,
}

/// One configured budget entry from `mycelium.toml`, using the friendlier
/// snake_case TOML shape the CLI/config edge exposes rather than the
/// internal [`crate::budget::BudgetLimit`] it's converted into.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetEntry {
    pub scope: BudgetScope,
    pub kind: BudgetKind,
    pub mode: BudgetMode,
    pub limit: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BudgetConfig {
    pub cost_per_1k: f64,
    pub limits: Vec<BudgetEntry>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cost_per_1k: 0.015,
            limits: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    pub project: ProjectConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub validators: ValidatorsConfig,
    pub budgets: BudgetConfig,
    pub scope: ScopeConfig,
    /// File-ownership entries the CLI uses to populate a
    /// [`crate::scope::OwnershipIndex`] for scope enforcement and the
    /// checkset policy. Empty by default (every changed file is
    /// `unmapped` until a project declares its components here).
    pub ownership: Vec<OwnershipEntry>,
    pub staleness_minutes: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            validators: ValidatorsConfig::default(),
            budgets: BudgetConfig::default(),
            scope: ScopeConfig::default(),
            ownership: Vec::new(),
            staleness_minutes: crate::state::DEFAULT_STALENESS_THRESHOLD_MINUTES as u64,
        }
    }
}

/// Errors loading `mycelium.toml`.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: std::path::PathBuf, source: std::io::Error },
    Parse { path: std::path::PathBuf, detail: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(
                f,
                "failed to read '{}': {source}",
                path.display()
            ),
            Self::Parse { path, detail } => write!(
                f,
                "configuration error in '{}': {detail}\n  To fix: edit the config file and correct the issue.",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl OrchestratorConfig {
    /// Load from `path`; a missing file resolves to [`OrchestratorConfig::default`]
    /// rather than an error. Unknown keys anywhere in the document are
    /// rejected.
    ///
    /// # Errors
    /// [`ConfigError::Io`] on a read failure other than not-found;
    /// [`ConfigError::Parse`] on malformed TOML or an unknown field.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io { path: path.to_path_buf(), source });
            }
        };
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.scheduler.max_parallel, 4);
        assert_eq!(config.project.main_branch, "main");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        fs::write(&path, "[scheduler]\nmax_parallel = 8\n").unwrap();
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.scheduler.max_parallel, 8);
        assert_eq!(config.worker.max_retries, 3);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        fs::write(&path, "[scheduler]\nmax_parallel = 8\ntypo_field = 1\n").unwrap();
        let err = OrchestratorConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validator_judges_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        fs::write(
            &path,
            r#"
[[validators.judges]]
name = "tests"
mode = "block"
command = "cargo test --workspace"

[[validators.judges]]
name = "style"
mode = "warn"
command = "cargo clippy --workspace"
"#,
        )
        .unwrap();
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.validators.judges.len(), 2);
        assert_eq!(config.validators.judges[0].mode, ValidatorModeConfig::Block);
        assert_eq!(config.validators.judges[1].name, "style");
    }

    #[test]
    fn ownership_entries_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        fs::write(
            &path,
            r#"
[[ownership]]
prefix = "src/auth/"
component = "component:auth"

[[ownership]]
prefix = "src/billing/"
component = "component:billing"
"#,
        )
        .unwrap();
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.ownership.len(), 2);
        assert_eq!(config.ownership[0].component, "component:auth");
    }

    #[test]
    fn budget_entries_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mycelium.toml");
        fs::write(
            &path,
            r#"
[budgets]
cost_per_1k = 0.02

[[budgets.limits]]
scope = "task"
kind = "tokens"
mode = "block"
limit = 200000.0
"#,
        )
        .unwrap();
        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.budgets.limits.len(), 1);
        assert_eq!(config.budgets.limits[0].mode, BudgetMode::Block);
    }
}
