//! External collaborator: the coding agent that executes one turn inside a
//! workspace. The worker loop orchestrates turns, but what the agent
//! actually does with a prompt is external — this crate only defines the
//! trait boundary, never an LLM behind it.

use std::path::Path;

use mycelium_core::budget::TurnTokens;

/// What kind of turn the worker loop is asking the agent to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    TddStageA,
    Implementation,
}

/// Everything the agent needs to execute one turn.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub prompt_kind: PromptKind,
    pub workspace_path: std::path::PathBuf,
    pub prompt: String,
    pub thread_id: Option<String>,
}

/// What came back from one agent turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub thread_resumed: bool,
    pub changed_files: Vec<String>,
    pub tokens: TurnTokens,
    pub codex_events: Vec<serde_json::Value>,
}

/// An agent turn failed to execute (process crash, API error, timeout).
#[derive(Debug)]
pub struct AgentError(pub String);

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent turn failed: {}", self.0)
    }
}

impl std::error::Error for AgentError {}

/// Drives one coding-agent turn in a workspace and reports what changed.
pub trait AgentRunner: Send + Sync {
    /// Execute `request`, returning the changed files and token usage.
    ///
    /// # Errors
    /// Returns [`AgentError`] on a non-recoverable turn failure (the
    /// worker loop is responsible for retry accounting, not this trait).
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, AgentError>;
}

/// Sum `input_tokens + cached_input_tokens + output_tokens` from every
/// `codex.event` line whose inner `event.type == "turn.completed"`.
#[must_use]
pub fn tokens_from_codex_events(events: &[serde_json::Value]) -> TurnTokens {
    let mut total = TurnTokens::default();
    for event in events {
        let is_turn_completed = event
            .get("event")
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            == Some("turn.completed");
        if !is_turn_completed {
            continue;
        }
        let usage = event.get("event").and_then(|e| e.get("usage"));
        total.input_tokens += field_as_u64(usage, "input_tokens");
        total.cached_input_tokens += field_as_u64(usage, "cached_input_tokens");
        total.output_tokens += field_as_u64(usage, "output_tokens");
    }
    total
}

fn field_as_u64(value: Option<&serde_json::Value>, field: &str) -> u64 {
    value
        .and_then(|v| v.get(field))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}

/// A scripted `AgentRunner` used by tests: returns queued outcomes in
/// order, one per call, and errors once the queue is exhausted.
pub struct ScriptedAgent {
    outcomes: std::sync::Mutex<std::collections::VecDeque<TurnOutcome>>,
}

impl ScriptedAgent {
    #[must_use]
    pub fn new(outcomes: Vec<TurnOutcome>) -> Self {
        Self { outcomes: std::sync::Mutex::new(outcomes.into()) }
    }
}

impl AgentRunner for ScriptedAgent {
    fn run_turn(&self, _request: &TurnRequest) -> Result<TurnOutcome, AgentError> {
        self.outcomes
            .lock()
            .expect("scripted agent mutex poisoned")
            .pop_front()
            .ok_or_else(|| AgentError("scripted agent queue exhausted".to_owned()))
    }
}

#[must_use]
pub fn workspace_relative(workspace_path: &Path, file: &Path) -> String {
    file.strip_prefix(workspace_path)
        .unwrap_or(file)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokens_from_codex_events_sums_only_turn_completed() {
        let events = vec![
            json!({"event": {"type": "turn.started"}}),
            json!({"event": {"type": "turn.completed", "usage": {
                "input_tokens": 100, "cached_input_tokens": 10, "output_tokens": 20
            }}}),
            json!({"event": {"type": "tool.start"}}),
            json!({"event": {"type": "turn.completed", "usage": {
                "input_tokens": 5, "cached_input_tokens": 0, "output_tokens": 5
            }}}),
        ];
        let tokens = tokens_from_codex_events(&events);
        assert_eq!(tokens.input_tokens, 105);
        assert_eq!(tokens.cached_input_tokens, 10);
        assert_eq!(tokens.output_tokens, 25);
    }

    #[test]
    fn tokens_from_codex_events_empty_when_no_turn_completed() {
        let events = vec![json!({"event": {"type": "turn.started"}})];
        let tokens = tokens_from_codex_events(&events);
        assert_eq!(tokens.total(), 0);
    }

    #[test]
    fn scripted_agent_errors_once_exhausted() {
        let agent = ScriptedAgent::new(vec![]);
        let request = TurnRequest {
            prompt_kind: PromptKind::Implementation,
            workspace_path: std::path::PathBuf::from("/tmp/ws"),
            prompt: "do it".to_owned(),
            thread_id: None,
        };
        assert!(agent.run_turn(&request).is_err());
    }
}
