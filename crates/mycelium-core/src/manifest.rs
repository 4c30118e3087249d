//! Task manifest, layout detection, and fingerprinting.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::{RunId, TaskId};

// ---------------------------------------------------------------------------
// TaskManifest
// ---------------------------------------------------------------------------

/// TDD staging mode for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TddMode {
    /// No TDD staging; go straight to implementation.
    Off,
    /// Write tests first, then implement (soft — not globally enforced).
    StageA,
    /// Strict: tests-only turn, scope-checked, must pass before Stage B.
    Strict,
}

impl Default for TddMode {
    fn default() -> Self {
        Self::Off
    }
}

/// Declared read/write resource locks for scheduler arbitration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locks {
    /// Resource names this task only reads.
    #[serde(default)]
    pub reads: Vec<String>,
    /// Resource names this task writes (and implicitly reads).
    #[serde(default)]
    pub writes: Vec<String>,
}

/// Declared file glob scope for scope enforcement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Files {
    /// Globs of files this task is expected to read.
    #[serde(default)]
    pub reads: Vec<String>,
    /// Globs of files this task is expected to write.
    #[serde(default)]
    pub writes: Vec<String>,
}

/// Doctor/verification command configuration for a task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verify {
    /// The shell command that must exit 0 for the task to pass.
    pub doctor: String,
}

/// The canonical task manifest shape.
///
/// Immutable once planned, except for auto-rescope, which appends to
/// `files.writes` and resets the task to `pending`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub locks: Locks,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub affected_tests: Vec<String>,
    #[serde(default)]
    pub test_paths: Vec<String>,
    #[serde(default)]
    pub tdd_mode: TddMode,
    pub verify: Verify,
}

impl TaskManifest {
    /// Append newly-discovered write paths to the declared scope and return
    /// whether anything changed.
    pub fn append_writes(&mut self, new_paths: &[String]) -> bool {
        let mut changed = false;
        for path in new_paths {
            if !self.files.writes.iter().any(|w| w == path) {
                self.files.writes.push(path.clone());
                changed = true;
            }
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// `sha256(canonical_json(manifest) + "\n---\n" + normalized_spec)`.
///
/// Manifest keys are sorted recursively (via `serde_json::Value`'s `BTreeMap`
/// backing for objects); the spec text is CRLF-normalized with trailing
/// whitespace stripped per line before hashing.
#[must_use]
pub fn fingerprint(manifest: &TaskManifest, spec: &str) -> String {
    let canonical = canonical_json(manifest);
    let normalized_spec = normalize_spec(spec);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"\n---\n");
    hasher.update(normalized_spec.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

/// Serialize a manifest with recursively sorted object keys, independent of
/// struct field declaration order — achieved by round-tripping through
/// `serde_json::Value`, whose `Map` is a `BTreeMap` (sorted) in this crate's
/// configuration (no `preserve_order` feature enabled).
fn canonical_json(manifest: &TaskManifest) -> String {
    let value = serde_json::to_value(manifest).expect("TaskManifest always serializes");
    serde_json::to_string(&value).expect("Value always serializes")
}

/// CRLF→LF normalize and strip trailing whitespace from each line.
fn normalize_spec(spec: &str) -> String {
    spec.replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Layout detection & moves
// ---------------------------------------------------------------------------

/// Detected task-directory layout under a project's tasks root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `backlog/`, `active/`, `archive/<runId>/` subdirectories.
    Kanban,
    /// Task directories sit directly under the tasks root.
    Legacy,
}

/// Detect the layout by checking for a `backlog/` subdirectory.
#[must_use]
pub fn detect_layout(tasks_root: &Path) -> Layout {
    if tasks_root.join("backlog").is_dir() {
        Layout::Kanban
    } else {
        Layout::Legacy
    }
}

/// Kanban stage a task directory can be moved between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Backlog,
    Active,
    /// Archive requires a `runId` — see [`LayoutError::ArchiveRequiresRunId`].
    Archive,
}

/// Errors from manifest layout operations, each with a user-facing hint.
#[derive(Debug)]
pub enum LayoutError {
    /// Archive move attempted without a run id.
    ArchiveRequiresRunId,
    /// The legacy layout doesn't support backlog/active/archive moves.
    NotKanban,
    /// The source task directory does not exist.
    SourceNotFound(PathBuf),
    /// The destination task directory already exists.
    DestExists(PathBuf),
    /// Underlying I/O failure during the rename.
    Io(std::io::Error),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveRequiresRunId => write!(
                f,
                "archiving a task requires a run id\n  To fix: pass --run-id, or rerun `mycelium plan`."
            ),
            Self::NotKanban => write!(
                f,
                "this project uses the legacy task layout (no backlog/active/archive)\n  To fix: rerun `mycelium plan` to adopt the kanban layout."
            ),
            Self::SourceNotFound(p) => write!(
                f,
                "task directory not found: {}\n  To fix: rerun `mycelium plan`.",
                p.display()
            ),
            Self::DestExists(p) => write!(
                f,
                "destination already exists: {}",
                p.display()
            ),
            Self::Io(e) => write!(f, "I/O error moving task directory: {e}"),
        }
    }
}

impl std::error::Error for LayoutError {}

impl From<std::io::Error> for LayoutError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

fn stage_dir(tasks_root: &Path, stage: Stage, run_id: Option<&RunId>) -> Result<PathBuf, LayoutError> {
    match stage {
        Stage::Backlog => Ok(tasks_root.join("backlog")),
        Stage::Active => Ok(tasks_root.join("active")),
        Stage::Archive => {
            let run_id = run_id.ok_or(LayoutError::ArchiveRequiresRunId)?;
            Ok(tasks_root.join("archive").join(run_id.as_str()))
        }
    }
}

/// Atomically move a task directory between kanban stages. Archive moves
/// require `run_id`.
///
/// # Errors
/// See [`LayoutError`] variants.
pub fn move_task_dir(
    tasks_root: &Path,
    task_dir_name: &str,
    from: Stage,
    to: Stage,
    run_id: Option<&RunId>,
) -> Result<PathBuf, LayoutError> {
    if detect_layout(tasks_root) != Layout::Kanban {
        return Err(LayoutError::NotKanban);
    }

    let source = stage_dir(tasks_root, from, run_id)?.join(task_dir_name);
    if !source.exists() {
        return Err(LayoutError::SourceNotFound(source));
    }

    let dest_dir = stage_dir(tasks_root, to, run_id)?;
    fs::create_dir_all(&dest_dir)?;
    let dest = dest_dir.join(task_dir_name);
    if dest.exists() {
        return Err(LayoutError::DestExists(dest));
    }

    fs::rename(&source, &dest)?;
    Ok(dest)
}
