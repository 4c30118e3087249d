//! Scope enforcement: changed files vs. declared+derived scope.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How strictly scope violations are enforced (`manifest_enforcement`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestEnforcement {
    Off,
    Warn,
    Block,
}

/// Scope-enforcement configuration (ambient config; see `mycelium.toml`
/// `[scope]`).
///
/// **Open question resolution**: `block` mode auto-rescopes exactly like
/// `warn` when `allow_auto_rescope` is `true` —
/// the manifest is amended and the task retried — and only falls through to
/// `rescope_required` when auto-rescope is disabled or the violation
/// includes unmapped files (which auto-rescope can't resolve, since there's
/// no component to add to `files.writes` against). `warn` never produces
/// `rescope_required`: it logs and proceeds regardless of
/// `allow_auto_rescope`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScopeConfig {
    pub enforcement: ManifestEnforcement,
    pub allow_auto_rescope: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { enforcement: ManifestEnforcement::Warn, allow_auto_rescope: true }
    }
}

/// Maps file paths to owning components by longest-root-prefix match.
///
/// Shares the same "declare once, resolve everywhere" style as the
/// manifest's `Files`/`Locks` globs, but resolution here is ownership-prefix
/// based rather than glob-based.
#[derive(Clone, Debug, Default)]
pub struct OwnershipIndex {
    /// `(root_prefix, component_name)` pairs, not required to be sorted by
    /// the caller; `resolve` picks the longest matching prefix itself.
    entries: Vec<(String, String)>,
}

impl OwnershipIndex {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register that every file under `root_prefix` belongs to `component`.
    pub fn add(&mut self, root_prefix: impl Into<String>, component: impl Into<String>) {
        self.entries.push((root_prefix.into(), component.into()));
    }

    /// Resolve `file` to its owning component via longest-root-prefix match.
    /// Returns `None` if no registered prefix matches.
    #[must_use]
    pub fn resolve(&self, file: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(prefix, _)| file.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, component)| component.as_str())
    }
}

/// Outcome of evaluating a set of changed files against scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeStatus {
    Pass,
    OutOfScope,
    Unmapped,
}

#[derive(Clone, Debug)]
pub struct ScopeEvaluation {
    pub status: ScopeStatus,
    pub changed_files: Vec<String>,
    pub touched_components: Vec<String>,
    pub allowed_components: Vec<String>,
    pub missing_components: Vec<String>,
    pub unmapped_files: Vec<String>,
    pub reason: String,
}

/// Evaluate `changed_files` against `allowed_components` (the union of
/// declared manifest writes and derived write locks — the caller computes
/// that union before calling this).
///
/// `unmapped` takes priority over `out_of_scope` detection per file: a file
/// with no owning component is reported as unmapped, not as out-of-scope,
/// but either condition present in the changed set yields a non-pass
/// status.
#[must_use]
pub fn evaluate_scope(
    changed_files: &[String],
    allowed_components: &BTreeSet<String>,
    ownership: &OwnershipIndex,
) -> ScopeEvaluation {
    let mut touched_components: BTreeSet<String> = BTreeSet::new();
    let mut missing_components: BTreeSet<String> = BTreeSet::new();
    let mut unmapped_files: Vec<String> = Vec::new();

    for file in changed_files {
        match ownership.resolve(file) {
            None => unmapped_files.push(file.clone()),
            Some(component) => {
                touched_components.insert(component.to_owned());
                if !allowed_components.contains(component) {
                    missing_components.insert(component.to_owned());
                }
            }
        }
    }

    let (status, reason) = if !unmapped_files.is_empty() {
        (
            ScopeStatus::Unmapped,
            format!("{} changed file(s) have no owning component", unmapped_files.len()),
        )
    } else if !missing_components.is_empty() {
        (
            ScopeStatus::OutOfScope,
            format!(
                "changed files touch component(s) outside declared scope: {}",
                missing_components.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        )
    } else {
        (ScopeStatus::Pass, "all changed files map to allowed components".to_owned())
    };

    ScopeEvaluation {
        status,
        changed_files: changed_files.to_vec(),
        touched_components: touched_components.into_iter().collect(),
        allowed_components: allowed_components.iter().cloned().collect(),
        missing_components: missing_components.into_iter().collect(),
        unmapped_files,
        reason,
    }
}

/// Checkset policy: choose a doctor command from per-component commands
/// joined with `&&`, falling back to a single fallback command when the
/// touched-component count exceeds the threshold or a surface change forces
/// it.
#[must_use]
pub fn select_doctor_command(
    touched_components: &[String],
    component_commands: &std::collections::HashMap<String, String>,
    max_components_for_scoped: usize,
    fallback_command: &str,
    surface_change_forced: bool,
) -> String {
    if surface_change_forced || touched_components.len() > max_components_for_scoped {
        return fallback_command.to_owned();
    }
    let mut commands: Vec<&str> = Vec::new();
    for component in touched_components {
        match component_commands.get(component) {
            Some(cmd) => commands.push(cmd.as_str()),
            None => return fallback_command.to_owned(),
        }
    }
    if commands.is_empty() {
        fallback_command.to_owned()
    } else {
        commands.join(" && ")
    }
}
