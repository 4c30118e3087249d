//! Validator Pipeline.
//!
//! Individual validator bodies (test/style/architecture/doctor-meta LLM
//! judges) are external collaborators; this module owns the pipeline
//! that runs them in order, normalizes results, and decides whether a
//! block-mode failure routes the task to `needs_human_review`.

use std::path::Path;

/// How a configured validator's result should affect the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidatorMode {
    Off,
    Warn,
    Block,
}

/// One configured validator slot in the pipeline.
pub struct ValidatorSlot {
    pub name: String,
    pub mode: ValidatorMode,
    pub validator: Box<dyn Validator>,
}

/// Normalized result from running one validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatorStatus {
    Pass,
    Fail,
    Error,
}

#[derive(Clone, Debug)]
pub struct ValidatorResult {
    pub status: ValidatorStatus,
    pub summary: String,
    pub report_path: Option<std::path::PathBuf>,
}

/// What the validator pipeline needs to judge one task.
pub struct ValidatorInput<'a> {
    pub task_id: &'a str,
    pub diff_summary: &'a str,
    pub workspace: &'a Path,
}

/// An LLM-judge validator body.
pub trait Validator: Send + Sync {
    fn evaluate(&self, input: &ValidatorInput<'_>) -> ValidatorResult;
}

/// A scripted `Validator` returning a fixed result, for tests.
pub struct FixedValidator(pub ValidatorResult);

impl Validator for FixedValidator {
    fn evaluate(&self, _input: &ValidatorInput<'_>) -> ValidatorResult {
        self.0.clone()
    }
}

/// Outcome of running the full pipeline against one task.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub results: Vec<(String, ValidatorResult)>,
    /// Set when a `block`-mode validator failed; its presence means the
    /// task moves to `needs_human_review` and the merge is skipped.
    pub block_reason: Option<String>,
}

/// Run `slots` in declaration order against `input`, stopping at (but still
/// recording) the first `block`-mode failure.
#[must_use]
pub fn run_pipeline(slots: &[ValidatorSlot], input: &ValidatorInput<'_>) -> PipelineOutcome {
    let mut results = Vec::new();
    let mut block_reason = None;

    for slot in slots {
        if slot.mode == ValidatorMode::Off {
            continue;
        }
        let result = slot.validator.evaluate(input);
        let failed = matches!(result.status, ValidatorStatus::Fail | ValidatorStatus::Error);

        if failed && slot.mode == ValidatorMode::Block && block_reason.is_none() {
            block_reason = Some(format!(
                "{} validator blocked merge: {}",
                slot.name, result.summary
            ));
        }
        results.push((slot.name.clone(), result));
    }

    PipelineOutcome { results, block_reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ValidatorInput<'static> {
        ValidatorInput {
            task_id: "task-001",
            diff_summary: "added src/auth/login.rs",
            workspace: Path::new("/tmp/ws"),
        }
    }

    fn slot(name: &str, mode: ValidatorMode, status: ValidatorStatus) -> ValidatorSlot {
        ValidatorSlot {
            name: name.to_owned(),
            mode,
            validator: Box::new(FixedValidator(ValidatorResult {
                status,
                summary: "example summary".to_owned(),
                report_path: None,
            })),
        }
    }

    #[test]
    fn warn_mode_failure_does_not_block() {
        let slots = vec![slot("Style", ValidatorMode::Warn, ValidatorStatus::Fail)];
        let outcome = run_pipeline(&slots, &input());
        assert!(outcome.block_reason.is_none());
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn block_mode_failure_produces_block_reason() {
        let slots = vec![slot("Architecture", ValidatorMode::Block, ValidatorStatus::Fail)];
        let outcome = run_pipeline(&slots, &input());
        assert_eq!(
            outcome.block_reason.as_deref(),
            Some("Architecture validator blocked merge: example summary")
        );
    }

    #[test]
    fn error_status_in_block_mode_also_blocks() {
        let slots = vec![slot("Tests", ValidatorMode::Block, ValidatorStatus::Error)];
        let outcome = run_pipeline(&slots, &input());
        assert!(outcome.block_reason.is_some());
    }

    #[test]
    fn off_mode_validator_is_skipped_entirely() {
        let slots = vec![slot("Tests", ValidatorMode::Off, ValidatorStatus::Fail)];
        let outcome = run_pipeline(&slots, &input());
        assert!(outcome.results.is_empty());
        assert!(outcome.block_reason.is_none());
    }

    #[test]
    fn first_block_reason_wins_but_all_results_recorded() {
        let slots = vec![
            slot("Tests", ValidatorMode::Block, ValidatorStatus::Fail),
            slot("Style", ValidatorMode::Block, ValidatorStatus::Fail),
        ];
        let outcome = run_pipeline(&slots, &input());
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.block_reason.unwrap().starts_with("Tests"));
    }

    #[test]
    fn passing_validators_produce_no_block_reason() {
        let slots = vec![slot("Tests", ValidatorMode::Block, ValidatorStatus::Pass)];
        let outcome = run_pipeline(&slots, &input());
        assert!(outcome.block_reason.is_none());
    }
}
