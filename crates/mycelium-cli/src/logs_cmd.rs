//! `mycelium logs query|search|timeline|failures|doctor|summarize`: read the
//! JSONL event log for a run and render it for a human.

use std::collections::BTreeMap;
use std::path::Path;

use mycelium_core::events::{Event, EventLog, EventLogError};
use mycelium_core::ids::TaskId;

#[derive(Debug)]
pub enum LogsCmdError {
    EventLog(EventLogError),
}

impl std::fmt::Display for LogsCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventLog(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LogsCmdError {}

impl From<EventLogError> for LogsCmdError {
    fn from(e: EventLogError) -> Self {
        Self::EventLog(e)
    }
}

/// Which `logs` subcommand to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogsSubcommand {
    /// Every event matching an optional type glob, raw.
    Query,
    /// Events whose payload or type contains a text needle.
    Search,
    /// Every event, newest last, one line per event.
    Timeline,
    /// Events signalling a failure: `task.failed`, `*.fail`, `batch.merge_conflict`.
    Failures,
    /// `doctor.*` events only.
    Doctor,
    /// Event-type counts.
    Summarize,
}

/// Options shared by every `logs` invocation.
pub struct LogsArgs<'a> {
    pub subcommand: LogsSubcommand,
    pub task_id: Option<TaskId>,
    pub type_glob: Option<&'a str>,
    pub search_text: Option<&'a str>,
}

/// Read the full event log at `log_path` and render the requested view as
/// lines of text.
///
/// # Errors
/// Returns [`LogsCmdError`] if the log file is missing or malformed.
pub fn run(log_path: &Path, args: &LogsArgs<'_>) -> Result<Vec<String>, LogsCmdError> {
    let log = EventLog::new(log_path);
    let glob = match args.subcommand {
        LogsSubcommand::Doctor => Some("doctor.*"),
        _ => args.type_glob,
    };
    let (events, _cursor) = log.read_from_cursor(0, glob, args.task_id.as_ref())?;

    let lines = match args.subcommand {
        LogsSubcommand::Query | LogsSubcommand::Timeline | LogsSubcommand::Doctor => {
            events.iter().map(render_line).collect()
        }
        LogsSubcommand::Search => events
            .iter()
            .filter(|e| matches_search(e, args.search_text.unwrap_or_default()))
            .map(render_line)
            .collect(),
        LogsSubcommand::Failures => events.iter().filter(|e| is_failure(e)).map(render_line).collect(),
        LogsSubcommand::Summarize => summarize(&events),
    };
    Ok(lines)
}

fn render_line(event: &Event) -> String {
    let task = event.task_id.as_ref().map_or_else(String::new, |t| format!(" task={t}"));
    let attempt = event.attempt.map_or_else(String::new, |a| format!(" attempt={a}"));
    format!("{} {}{}{} {}", event.ts.to_rfc3339(), event.event_type, task, attempt, event.payload)
}

fn matches_search(event: &Event, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    event.event_type.contains(needle) || event.payload.to_string().contains(needle)
}

fn is_failure(event: &Event) -> bool {
    let t = &event.event_type;
    t == "task.failed" || t.ends_with(".fail") || t.ends_with(".block") || t == "batch.merge_conflict"
}

fn summarize(events: &[Event]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().map(|(t, n)| format!("{t}: {n}")).collect()
}
