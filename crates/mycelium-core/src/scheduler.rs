//! Greedy batch scheduler with lock arbitration.

use std::collections::HashSet;

use crate::ids::TaskId;
use crate::manifest::Locks;

/// A schedulable unit: just enough to order and arbitrate locks. The caller
/// builds these from `TaskManifest`s of tasks whose dependencies are all
/// `complete` (the "ready set").
#[derive(Clone, Debug)]
pub struct ReadyTask {
    pub task_id: TaskId,
    pub locks: Locks,
}

/// Two tasks conflict iff they share a write, or one writes what the other
/// reads. Reads alone never conflict.
#[must_use]
pub fn conflicts(a: &Locks, b: &Locks) -> bool {
    let a_writes: HashSet<&str> = a.writes.iter().map(String::as_str).collect();
    let b_writes: HashSet<&str> = b.writes.iter().map(String::as_str).collect();

    if a_writes.intersection(&b_writes).next().is_some() {
        return true;
    }
    if a_writes.iter().any(|w| b.reads.iter().any(|r| r == *w)) {
        return true;
    }
    if b_writes.iter().any(|w| a.reads.iter().any(|r| r == *w)) {
        return true;
    }
    false
}

/// No ready task could be placed into a batch. Carries a debug line per
/// candidate so the caller can build a [`SchedulerPlacementFailed`]-style
/// error.
///
/// [`SchedulerPlacementFailed`]: crate::error::OrchestratorError::SchedulerPlacementFailed
#[derive(Debug)]
pub struct PlacementFailed {
    pub debug_lines: Vec<String>,
}

/// Build the next batch from the ready set.
///
/// Sorts by numeric id where possible, falling back to lexicographic order,
/// then greedily accepts tasks that conflict with none already accepted,
/// until `max_parallel` is reached or the list is exhausted.
///
/// # Errors
/// Returns [`PlacementFailed`] if `ready` is non-empty but no task could be
/// placed (every candidate conflicts with the first one accepted — this is
/// defensive; the core rule can't actually produce an empty batch from a
/// non-empty ready set, since the first task is always conflict-free
/// against an empty accepted set).
pub fn build_greedy_batch(
    ready: &[ReadyTask],
    max_parallel: usize,
) -> Result<Vec<TaskId>, PlacementFailed> {
    let mut sorted: Vec<&ReadyTask> = ready.iter().collect();
    sorted.sort_by(|a, b| sort_key(&a.task_id).cmp(&sort_key(&b.task_id)));

    let mut accepted: Vec<&ReadyTask> = Vec::new();
    for candidate in &sorted {
        if accepted.len() >= max_parallel {
            break;
        }
        let conflicts_with_accepted = accepted.iter().any(|a| conflicts(&a.locks, &candidate.locks));
        if !conflicts_with_accepted {
            accepted.push(candidate);
        }
    }

    if accepted.is_empty() && !sorted.is_empty() {
        let debug_lines = sorted
            .iter()
            .map(|t| {
                format!(
                    "{}: reads={:?} writes={:?}",
                    t.task_id, t.locks.reads, t.locks.writes
                )
            })
            .collect();
        return Err(PlacementFailed { debug_lines });
    }

    Ok(accepted.into_iter().map(|t| t.task_id.clone()).collect())
}

/// Sort key: numeric-id tasks (e.g. `task-010`) sort by their trailing
/// integer; non-numeric ids fall back to the raw string so the ordering is
/// still total and deterministic.
fn sort_key(task_id: &TaskId) -> (u64, String) {
    let s = task_id.as_str();
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    let digits: String = digits.chars().rev().collect();
    let numeric = digits.parse::<u64>().unwrap_or(u64::MAX);
    (numeric, s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, reads: &[&str], writes: &[&str]) -> ReadyTask {
        ReadyTask {
            task_id: TaskId::new(id).unwrap(),
            locks: Locks {
                reads: reads.iter().map(|s| (*s).to_owned()).collect(),
                writes: writes.iter().map(|s| (*s).to_owned()).collect(),
            },
        }
    }

    #[test]
    fn reads_alone_never_conflict() {
        let a = Locks { reads: vec!["x".into()], writes: vec![] };
        let b = Locks { reads: vec!["x".into()], writes: vec![] };
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn shared_write_conflicts() {
        let a = Locks { reads: vec![], writes: vec!["x".into()] };
        let b = Locks { reads: vec![], writes: vec!["x".into()] };
        assert!(conflicts(&a, &b));
    }

    #[test]
    fn write_read_conflicts() {
        let a = Locks { reads: vec![], writes: vec!["x".into()] };
        let b = Locks { reads: vec!["x".into()], writes: vec![] };
        assert!(conflicts(&a, &b));
        assert!(conflicts(&b, &a));
    }

    #[test]
    fn independent_tasks_batch_together() {
        let ready = vec![
            task("task-001", &[], &["component:a"]),
            task("task-002", &[], &["component:b"]),
        ];
        let batch = build_greedy_batch(&ready, 4).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn lock_conflict_splits_batches() {
        let ready = vec![
            task("task-001", &[], &["component:a"]),
            task("task-002", &[], &["component:a"]),
            task("task-003", &[], &["component:b"]),
        ];
        let batch = build_greedy_batch(&ready, 4).unwrap();
        let ids: Vec<&str> = batch.iter().map(TaskId::as_str).collect();
        assert_eq!(ids, vec!["task-001", "task-003"]);
    }

    #[test]
    fn respects_max_parallel() {
        let ready = vec![
            task("task-001", &[], &["component:a"]),
            task("task-002", &[], &["component:b"]),
            task("task-003", &[], &["component:c"]),
        ];
        let batch = build_greedy_batch(&ready, 2).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn sorts_by_numeric_id_not_lexicographic() {
        let ready = vec![
            task("task-010", &[], &["component:a"]),
            task("task-002", &[], &["component:b"]),
        ];
        let batch = build_greedy_batch(&ready, 4).unwrap();
        let ids: Vec<&str> = batch.iter().map(TaskId::as_str).collect();
        assert_eq!(ids, vec!["task-002", "task-010"]);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let ready = vec![
            task("task-003", &[], &["component:a"]),
            task("task-001", &[], &["component:b"]),
            task("task-002", &[], &["component:a"]),
        ];
        let first = build_greedy_batch(&ready, 4).unwrap();
        let second = build_greedy_batch(&ready, 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_ready_set_produces_empty_batch() {
        let batch = build_greedy_batch(&[], 4).unwrap();
        assert!(batch.is_empty());
    }
}
