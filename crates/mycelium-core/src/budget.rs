//! Token accounting & budget breach detection.

use serde::{Deserialize, Serialize};

/// Token tally for one `turn.completed` event, as embedded in a
/// `codex.event` payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct TurnTokens {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

impl TurnTokens {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.cached_input_tokens + self.output_tokens
    }
}

/// `cost = tokens/1000 * cost_per_1k`, rounded to four decimal places
///.
#[must_use]
pub fn estimate_cost(tokens: u64, cost_per_1k: f64) -> f64 {
    let raw = (tokens as f64 / 1000.0) * cost_per_1k;
    (raw * 10_000.0).round() / 10_000.0
}

/// Scope a budget check applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Task,
    Run,
}

/// What kind of quantity a budget limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Tokens,
    Cost,
}

/// What happens when a budget is breached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    Warn,
    Block,
}

/// A single configured budget limit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BudgetLimit {
    pub scope: BudgetScope,
    pub kind: BudgetKind,
    pub mode: BudgetMode,
    pub limit: f64,
}

/// Result of checking one [`BudgetLimit`] against a before/after pair of
/// observed values. Breach checks fire exactly once per crossing: `before
/// <= limit` and `after > limit`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BudgetCheck {
    pub breached: bool,
    pub mode: BudgetMode,
    pub observed: f64,
    pub limit: f64,
}

/// Check whether `after` crosses `limit` from below, given `before` did not
/// already exceed it — the "fires exactly once per crossing" rule.
#[must_use]
pub fn check_budget(limit: &BudgetLimit, before: f64, after: f64) -> BudgetCheck {
    let breached = before <= limit.limit && after > limit.limit;
    BudgetCheck {
        breached,
        mode: limit.mode,
        observed: after,
        limit: limit.limit,
    }
}

/// Running per-task token/cost tally across attempts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskUsage {
    pub tokens_used: u64,
    pub estimated_cost: f64,
}

impl TaskUsage {
    /// Fold in one attempt's turn tokens, returning the tally before this
    /// addition so the caller can run [`check_budget`] against the
    /// before/after pair.
    pub fn add_turn(&mut self, turn: TurnTokens, cost_per_1k: f64) -> (u64, f64) {
        let before = (self.tokens_used, self.estimated_cost);
        self.tokens_used += turn.total();
        self.estimated_cost += estimate_cost(turn.total(), cost_per_1k);
        before
    }
}

/// Sum per-task usages into a run total.
#[must_use]
pub fn run_totals<'a>(tasks: impl IntoIterator<Item = &'a TaskUsage>) -> TaskUsage {
    let mut total = TaskUsage::default();
    for usage in tasks {
        total.tokens_used += usage.tokens_used;
        total.estimated_cost += usage.estimated_cost;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_total_sums_all_three_fields() {
        let turn = TurnTokens {
            input_tokens: 100,
            cached_input_tokens: 20,
            output_tokens: 50,
        };
        assert_eq!(turn.total(), 170);
    }

    #[test]
    fn estimate_cost_rounds_to_four_decimals() {
        assert_eq!(estimate_cost(1234, 0.015), 0.0185);
    }

    #[test]
    fn check_budget_fires_exactly_once_per_crossing() {
        let limit = BudgetLimit {
            scope: BudgetScope::Task,
            kind: BudgetKind::Tokens,
            mode: BudgetMode::Block,
            limit: 1000.0,
        };
        let first = check_budget(&limit, 900.0, 1100.0);
        assert!(first.breached);
        let second = check_budget(&limit, 1100.0, 1300.0);
        assert!(!second.breached, "already over limit before this observation");
    }

    #[test]
    fn check_budget_not_breached_when_under_limit() {
        let limit = BudgetLimit {
            scope: BudgetScope::Run,
            kind: BudgetKind::Cost,
            mode: BudgetMode::Warn,
            limit: 10.0,
        };
        let check = check_budget(&limit, 5.0, 8.0);
        assert!(!check.breached);
    }

    #[test]
    fn task_usage_accumulates_across_attempts() {
        let mut usage = TaskUsage::default();
        usage.add_turn(
            TurnTokens { input_tokens: 500, cached_input_tokens: 0, output_tokens: 500 },
            0.01,
        );
        usage.add_turn(
            TurnTokens { input_tokens: 200, cached_input_tokens: 0, output_tokens: 300 },
            0.01,
        );
        assert_eq!(usage.tokens_used, 1500);
        assert_eq!(usage.estimated_cost, estimate_cost(1000, 0.01) + estimate_cost(500, 0.01));
    }

    #[test]
    fn run_totals_sum_task_usages() {
        let tasks = vec![
            TaskUsage { tokens_used: 100, estimated_cost: 1.0 },
            TaskUsage { tokens_used: 200, estimated_cost: 2.0 },
        ];
        let total = run_totals(&tasks);
        assert_eq!(total.tokens_used, 300);
        assert_eq!(total.estimated_cost, 3.0);
    }
}
