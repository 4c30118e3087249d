//! Bridges run state + manifests into the scheduler's ready set: a task is
//! ready once every dependency has completed.

use std::collections::BTreeMap;

use mycelium_core::ids::TaskId;
use mycelium_core::manifest::TaskManifest;
use mycelium_core::scheduler::ReadyTask;
use mycelium_core::state::{RunState, TaskStatus};

/// Tasks that are `pending` and whose declared dependencies have all
/// reached `complete`, in the shape the scheduler consumes.
#[must_use]
pub fn ready_tasks(state: &RunState, manifests: &BTreeMap<TaskId, TaskManifest>) -> Vec<ReadyTask> {
    manifests
        .values()
        .filter(|m| {
            state.tasks.get(&m.id).is_some_and(|t| t.status == TaskStatus::Pending)
                && m.dependencies.iter().all(|dep| {
                    state
                        .tasks
                        .get(dep)
                        .is_some_and(|t| t.status == TaskStatus::Complete)
                })
        })
        .map(|m| ReadyTask { task_id: m.id.clone(), locks: m.locks.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use mycelium_core::ids::{ProjectName, RunId};
    use mycelium_core::manifest::{Files, Locks, TddMode, Verify};
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn manifest(id: &str, deps: &[&str]) -> TaskManifest {
        TaskManifest {
            id: TaskId::new(id).unwrap(),
            name: id.to_owned(),
            description: String::new(),
            estimated_minutes: 5,
            dependencies: deps.iter().map(|d| TaskId::new(*d).unwrap()).collect(),
            locks: Locks::default(),
            files: Files::default(),
            affected_tests: vec![],
            test_paths: vec![],
            tdd_mode: TddMode::Off,
            verify: Verify { doctor: "true".to_owned() },
        }
    }

    #[test]
    fn blocks_on_incomplete_dependency() {
        let m1 = manifest("task-001", &[]);
        let m2 = manifest("task-002", &["task-001"]);
        let mut manifests = BTreeMap::new();
        manifests.insert(m1.id.clone(), m1.clone());
        manifests.insert(m2.id.clone(), m2.clone());

        let state = RunState::new(
            RunId::new("20260727-120000").unwrap(),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![m1.id.clone(), m2.id.clone()],
            now(),
        );

        let ready = ready_tasks(&state, &manifests);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].task_id, m1.id);
    }

    #[test]
    fn unblocks_once_dependency_completes() {
        let m1 = manifest("task-001", &[]);
        let m2 = manifest("task-002", &["task-001"]);
        let mut manifests = BTreeMap::new();
        manifests.insert(m1.id.clone(), m1.clone());
        manifests.insert(m2.id.clone(), m2.clone());

        let mut state = RunState::new(
            RunId::new("20260727-120000").unwrap(),
            ProjectName::new("acme").unwrap(),
            PathBuf::from("/repo"),
            "main",
            vec![m1.id.clone(), m2.id.clone()],
            now(),
        );
        state.tasks.get_mut(&m1.id).unwrap().status = TaskStatus::Complete;

        let ready = ready_tasks(&state, &manifests);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].task_id, m2.id);
    }
}
