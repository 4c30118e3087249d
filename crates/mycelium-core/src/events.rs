//! JSONL event log.
//!
//! An append-only log of [`Event`]s, one JSON object per line. Readers must
//! tolerate a partial trailing line (the writer may be mid-append) by
//! resuming from the end of the last fully-terminated line, using byte
//! cursors into the flat file rather than any chained reference structure.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TaskId;

/// One append-only JSONL event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// ISO-8601 UTC timestamp with milliseconds.
    pub ts: DateTime<Utc>,
    /// Event type, e.g. `"batch.start"`, `"doctor.pass"`. Open vocabulary —
    /// unknown types round-trip fine.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The task this event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Attempt number within the task, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Arbitrary structured payload. Unknown fields are preserved verbatim
    /// because this is `serde_json::Value`, not a fixed struct.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Construct an event with no task/attempt context (run- or batch-level).
    #[must_use]
    pub fn new(now: DateTime<Utc>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            ts: now,
            event_type: event_type.into(),
            task_id: None,
            attempt: None,
            payload,
        }
    }

    /// Construct an event scoped to a task attempt.
    #[must_use]
    pub fn for_task(
        now: DateTime<Utc>,
        event_type: impl Into<String>,
        task_id: TaskId,
        attempt: Option<u32>,
        payload: Value,
    ) -> Self {
        Self {
            ts: now,
            event_type: event_type.into(),
            task_id: Some(task_id),
            attempt,
            payload,
        }
    }
}

/// Errors from the event log's append/read paths.
#[derive(Debug)]
pub enum EventLogError {
    /// The log file does not exist.
    NotFound,
    /// A supplied cursor was not a valid non-negative integer byte offset.
    BadCursor {
        /// The raw cursor string that failed to parse.
        raw: String,
    },
    /// I/O error opening, writing, or reading the log.
    Io(std::io::Error),
    /// A fully-terminated line failed to deserialize as an [`Event`].
    Deserialize {
        /// Byte offset of the malformed line.
        offset: u64,
        /// The underlying serde error.
        source: serde_json::Error,
    },
}

impl fmt::Display for EventLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "event log not found"),
            Self::BadCursor { raw } => write!(f, "invalid cursor {raw:?}: expected an integer byte offset or \"tail\""),
            Self::Io(e) => write!(f, "event log I/O error: {e}"),
            Self::Deserialize { offset, source } => {
                write!(f, "malformed event at byte offset {offset}: {source}")
            }
        }
    }
}

impl std::error::Error for EventLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Deserialize { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EventLogError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// A append-only JSONL event log at a fixed path.
pub struct EventLog {
    path: std::path::PathBuf,
}

impl EventLog {
    /// Open (without creating) an event log handle at `path`.
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Borrow the underlying path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single JSON line. Creates the file (and its
    /// parent directory) if necessary. Flush-ordered: the line is guaranteed
    /// visible to subsequent reads in this process before this call returns.
    ///
    /// # Errors
    /// Returns [`EventLogError::Io`] on any filesystem failure, or
    /// propagates a JSON serialization failure as an I/O-wrapped error (an
    /// `Event`'s payload is always a `Value` so serialization cannot fail in
    /// practice, but the signature stays `Result` for forward compatibility).
    pub fn append(&self, event: &Event) -> Result<(), EventLogError> {
        crate::paths::ensure_parent_dir(&self.path)?;
        let mut line = serde_json::to_string(event).expect("Event always serializes");
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Resolve the special cursor `"tail"` to the current end-of-file offset.
    ///
    /// # Errors
    /// Returns [`EventLogError::NotFound`] if the log does not exist yet.
    pub fn tail_cursor(&self) -> Result<u64, EventLogError> {
        let meta = std::fs::metadata(&self.path)?;
        Ok(meta.len())
    }

    /// Parse a cursor string: an integer byte offset, or the literal
    /// `"tail"`.
    ///
    /// # Errors
    /// Returns [`EventLogError::BadCursor`] for anything else.
    pub fn parse_cursor(&self, cursor: &str) -> Result<u64, EventLogError> {
        if cursor == "tail" {
            return self.tail_cursor();
        }
        cursor.parse::<u64>().map_err(|_| EventLogError::BadCursor {
            raw: cursor.to_owned(),
        })
    }

    /// Read events from a byte cursor, returning the parsed events and the
    /// cursor to resume from (`nextCursor`, always ≥ the input cursor).
    ///
    /// Tolerates a partial trailing line: if the final line in the file has
    /// not been terminated with `\n` yet, it is treated as not-yet-written
    /// and excluded, with `nextCursor` pointing at its start so a future
    /// read picks it up once complete.
    ///
    /// `type_glob` is an optional filter using `*` as wildcard and `.` as a
    /// literal; `task_id` optionally narrows to one task.
    ///
    /// # Errors
    /// Returns [`EventLogError::NotFound`] if the log does not exist, or
    /// [`EventLogError::Deserialize`] if a fully-terminated line isn't valid
    /// JSON for an [`Event`].
    pub fn read_from_cursor(
        &self,
        cursor: u64,
        type_glob: Option<&str>,
        task_id: Option<&TaskId>,
    ) -> Result<(Vec<Event>, u64), EventLogError> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let start = cursor.min(len);
        file.seek(SeekFrom::Start(start))?;

        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut consumed: u64 = 0;

        loop {
            let mut raw_line = Vec::new();
            let bytes_read = reader.read_until(b'\n', &mut raw_line)?;
            if bytes_read == 0 {
                break;
            }
            if raw_line.last() != Some(&b'\n') {
                // Partial trailing line: not yet fully written, stop here.
                break;
            }
            let offset = start + consumed;
            consumed += bytes_read as u64;

            let text = String::from_utf8_lossy(&raw_line);
            let trimmed = text.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(trimmed)
                .map_err(|source| EventLogError::Deserialize { offset, source })?;

            if let Some(glob) = type_glob {
                if !type_glob_match(glob, &event.event_type) {
                    continue;
                }
            }
            if let Some(tid) = task_id {
                if event.task_id.as_ref() != Some(tid) {
                    continue;
                }
            }
            events.push(event);
        }

        Ok((events, start + consumed))
    }
}

/// Match `event_type` against a glob pattern where `*` matches any run of
/// characters and every other character (including `.`) matches literally
///.
#[must_use]
pub fn type_glob_match(pattern: &str, value: &str) -> bool {
    fn recurse(pattern: &[u8], value: &[u8]) -> bool {
        match pattern.first() {
            None => value.is_empty(),
            Some(b'*') => {
                recurse(&pattern[1..], value)
                    || (!value.is_empty() && recurse(pattern, &value[1..]))
            }
            Some(&c) => value.first() == Some(&c) && recurse(&pattern[1..], &value[1..]),
        }
    }
    recurse(pattern.as_bytes(), value.as_bytes())
}

/// Read the full contents of a reader into a string without panicking on
/// invalid UTF-8 (used by CLI log tooling for quick inspection, not by the
/// cursor read path above which decodes line-by-line).
pub fn read_to_string_lossy(mut r: impl Read) -> std::io::Result<String> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event(t: &str) -> Event {
        Event::new(Utc::now(), t, json!({"k": "v"}))
    }

    #[test]
    fn append_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        log.append(&sample_event("run.start")).unwrap();
        log.append(&sample_event("batch.start")).unwrap();

        let (events, cursor) = log.read_from_cursor(0, None, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "run.start");
        assert_eq!(cursor, log.tail_cursor().unwrap());
    }

    #[test]
    fn cursor_monotonicity_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        log.append(&sample_event("run.start")).unwrap();
        let (_, c1) = log.read_from_cursor(0, None, None).unwrap();
        log.append(&sample_event("run.complete")).unwrap();
        let (events2, c2) = log.read_from_cursor(c1, None, None).unwrap();
        assert_eq!(events2.len(), 1);
        assert!(c2 >= c1);
    }

    #[test]
    fn partial_trailing_line_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::new(&path);
        log.append(&sample_event("run.start")).unwrap();

        // Simulate a writer mid-append: a line with no trailing newline.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"ts":"2026-01-01T00:00:00Z","type":"partial"#)
            .unwrap();

        let (events, cursor) = log.read_from_cursor(0, None, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "run.start");
        // nextCursor should point before the partial bytes, not past them.
        let full_len = std::fs::metadata(&path).unwrap().len();
        assert!(cursor < full_len);
    }

    #[test]
    fn missing_log_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("missing.jsonl"));
        assert!(matches!(
            log.read_from_cursor(0, None, None),
            Err(EventLogError::NotFound)
        ));
    }

    #[test]
    fn bad_cursor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        log.append(&sample_event("run.start")).unwrap();
        assert!(matches!(
            log.parse_cursor("not-a-number"),
            Err(EventLogError::BadCursor { .. })
        ));
        assert!(log.parse_cursor("tail").is_ok());
    }

    #[test]
    fn type_glob_filters() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        log.append(&sample_event("doctor.pass")).unwrap();
        log.append(&sample_event("doctor.fail")).unwrap();
        log.append(&sample_event("lint.pass")).unwrap();

        let (events, _) = log.read_from_cursor(0, Some("doctor.*"), None).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn type_glob_literal_dot() {
        assert!(type_glob_match("doctor.pass", "doctor.pass"));
        assert!(!type_glob_match("doctor.pass", "doctorXpass"));
        assert!(type_glob_match("*", "anything.at.all"));
        assert!(type_glob_match("codex.*", "codex.thread.started"));
    }

    #[test]
    fn task_id_filters() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        let t1 = TaskId::new("task-001").unwrap();
        let t2 = TaskId::new("task-002").unwrap();
        log.append(&Event::for_task(Utc::now(), "worker.start", t1.clone(), Some(1), json!({})))
            .unwrap();
        log.append(&Event::for_task(Utc::now(), "worker.start", t2, Some(1), json!({})))
            .unwrap();

        let (events, _) = log.read_from_cursor(0, None, Some(&t1)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, Some(t1));
    }

    #[test]
    fn unknown_payload_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        let event = Event::new(
            Utc::now(),
            "codex.event",
            json!({"event": {"type": "turn.completed"}, "future_field": 42}),
        );
        log.append(&event).unwrap();
        let (events, _) = log.read_from_cursor(0, None, None).unwrap();
        assert_eq!(events[0].payload, event.payload);
    }
}
