//! Task manifest I/O: reading/writing the `manifest.json` + `spec.md` pair
//! that sits in each task directory, across both layouts `detect_layout`
//! recognizes.

use std::fs;
use std::path::{Path, PathBuf};

use mycelium_core::manifest::{detect_layout, fingerprint, Layout, TaskManifest};

const MANIFEST_FILE: &str = "manifest.json";
const SPEC_FILE: &str = "spec.md";

#[derive(Debug)]
pub enum TaskDirError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, detail: String },
}

impl std::fmt::Display for TaskDirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error at '{}': {source}", path.display()),
            Self::Parse { path, detail } => write!(f, "malformed manifest at '{}': {detail}", path.display()),
        }
    }
}

impl std::error::Error for TaskDirError {}

/// One task directory's contents, loaded from disk.
#[derive(Clone, Debug)]
pub struct TaskFiles {
    pub dir: PathBuf,
    pub dir_name: String,
    pub manifest: TaskManifest,
    pub spec: String,
}

impl TaskFiles {
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.manifest, &self.spec)
    }
}

/// Read one task directory's `manifest.json` and `spec.md`.
///
/// # Errors
/// Returns [`TaskDirError`] if either file is missing/unreadable or the
/// manifest fails to parse.
pub fn read_task_dir(dir: &Path) -> Result<TaskFiles, TaskDirError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path).map_err(|source| TaskDirError::Io { path: manifest_path.clone(), source })?;
    let manifest: TaskManifest = serde_json::from_str(&raw)
        .map_err(|e| TaskDirError::Parse { path: manifest_path.clone(), detail: e.to_string() })?;

    let spec_path = dir.join(SPEC_FILE);
    let spec = fs::read_to_string(&spec_path).unwrap_or_default();

    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| manifest.id.as_str().to_owned());

    Ok(TaskFiles { dir: dir.to_path_buf(), dir_name, manifest, spec })
}

/// Write a task directory's `manifest.json` and `spec.md`, creating the
/// directory if needed.
///
/// # Errors
/// Returns [`TaskDirError::Io`] on any filesystem failure.
pub fn write_task_dir(dir: &Path, manifest: &TaskManifest, spec: &str) -> Result<(), TaskDirError> {
    fs::create_dir_all(dir).map_err(|source| TaskDirError::Io { path: dir.to_path_buf(), source })?;

    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest).expect("TaskManifest always serializes");
    fs::write(&manifest_path, json).map_err(|source| TaskDirError::Io { path: manifest_path, source })?;

    let spec_path = dir.join(SPEC_FILE);
    fs::write(&spec_path, spec).map_err(|source| TaskDirError::Io { path: spec_path, source })?;
    Ok(())
}

/// Atomically overwrite a task directory's `manifest.json` in place (spec.md
/// is untouched), the same temp-file + fsync + rename pattern
/// `StateStore::save` uses for run state, so an auto-rescoped manifest
/// survives a crash between the write and the rename.
///
/// # Errors
/// Returns [`TaskDirError::Io`] on any filesystem failure.
pub fn persist_manifest(dir: &Path, manifest: &TaskManifest) -> Result<(), TaskDirError> {
    fs::create_dir_all(dir).map_err(|source| TaskDirError::Io { path: dir.to_path_buf(), source })?;

    let manifest_path = dir.join(MANIFEST_FILE);
    let tmp_name = format!("{MANIFEST_FILE}.{}.tmp", uuid::Uuid::new_v4());
    let tmp_path = dir.join(tmp_name);

    let json = serde_json::to_string_pretty(manifest).expect("TaskManifest always serializes");
    {
        let mut file = fs::File::create(&tmp_path).map_err(|source| TaskDirError::Io { path: tmp_path.clone(), source })?;
        use std::io::Write;
        file.write_all(json.as_bytes()).map_err(|source| TaskDirError::Io { path: tmp_path.clone(), source })?;
        file.sync_all().map_err(|source| TaskDirError::Io { path: tmp_path.clone(), source })?;
    }
    fs::rename(&tmp_path, &manifest_path).map_err(|source| TaskDirError::Io { path: manifest_path, source })?;
    Ok(())
}

/// List every task directory under `tasks_root`, skipping `archive/` in the
/// kanban layout (archived tasks belong to a finished run, not the pool a
/// new run schedules against).
///
/// # Errors
/// Returns [`TaskDirError`] if a task directory fails to read.
pub fn list_tasks(tasks_root: &Path) -> Result<Vec<TaskFiles>, TaskDirError> {
    let dirs = match detect_layout(tasks_root) {
        Layout::Kanban => {
            let mut dirs = Vec::new();
            for stage in ["backlog", "active"] {
                dirs.extend(subdirs(&tasks_root.join(stage))?);
            }
            dirs
        }
        Layout::Legacy => subdirs(tasks_root)?,
    };

    dirs.into_iter().map(|d| read_task_dir(&d)).collect()
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, TaskDirError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| TaskDirError::Io { path: dir.to_path_buf(), source })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TaskDirError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
