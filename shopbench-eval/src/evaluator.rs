//! Core evaluator implementation
//!
//! The Evaluator scores finished trajectories: turn format, trajectory
//! length and the task-specific recommendation scores.

use serde::{Deserialize, Serialize};
use shopbench_core::{ProductCatalog, Role, TextSimilarity, Trajectory};
use shopbench_telemetry::{evaluation_span, record_score, turn_span};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::EvaluationConfig;
use crate::constraint::ConstraintEvaluator;
use crate::error::Result;
use crate::format::validate;
use crate::report::{EvaluationReport, EvaluationResult};
use crate::reward::length_reward;
use crate::task::{Target, TaskScorer, metric};
use crate::voucher::Voucher;

/// One query's trajectory together with what it is scored against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub trajectory: Trajectory,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher: Option<Voucher>,
}

impl EvalCase {
    pub fn new(query: &str, trajectory: Trajectory, target: Target) -> Self {
        Self { query: query.to_string(), trajectory, target, voucher: None }
    }

    pub fn with_voucher(mut self, voucher: Voucher) -> Self {
        self.voucher = Some(voucher);
        self
    }
}

/// The main evaluator struct
///
/// Holds only read-only collaborators, so one evaluator can be shared
/// between worker threads.
#[derive(Clone)]
pub struct Evaluator {
    config: EvaluationConfig,
    scorer: TaskScorer,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Evaluator {
    /// Create an evaluator over a catalog and a title similarity oracle
    pub fn new(
        config: EvaluationConfig,
        catalog: Arc<dyn ProductCatalog>,
        similarity: Arc<dyn TextSimilarity>,
    ) -> Self {
        let constraints = ConstraintEvaluator::new(similarity)
            .with_title_threshold(config.title_threshold)
            .with_web_title_threshold(config.web_title_threshold);
        Self { config, scorer: TaskScorer::new(catalog, constraints) }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Mean format validity over the trajectory's turns
    ///
    /// Each turn is rendered with the output roles and checked against the
    /// roles of the configured reasoning mode. 0 for an empty trajectory or
    /// when format scoring is off.
    pub fn format_score(&self, trajectory: &Trajectory) -> f64 {
        if !self.config.score_format || trajectory.is_empty() {
            return 0.0;
        }
        let roles = self.config.reasoning_mode.format_roles();
        let valid = trajectory
            .turns
            .iter()
            .enumerate()
            .filter(|(index, turn)| {
                let _span = turn_span(*index).entered();
                validate(&turn.render(&Role::OUTPUT), roles)
            })
            .count();
        valid as f64 / trajectory.len() as f64
    }

    /// Score one case
    ///
    /// Fails only on configuration errors such as a target that does not
    /// fit the configured task.
    pub fn evaluate_case(&self, case: &EvalCase) -> Result<EvaluationResult> {
        let task = self.config.task;
        let _span = evaluation_span(&case.query, task.as_str()).entered();
        let start = Instant::now();

        let mut scores =
            self.scorer.score(task, &case.trajectory, &case.target, case.voucher.as_ref())?;
        scores.set(metric::LENGTH, length_reward(&case.trajectory));
        scores.set(metric::FORMAT, self.format_score(&case.trajectory));

        for (name, value) in scores.iter() {
            record_score(name, value);
        }

        let rejected = case.trajectory.rejected_calls();
        for call in &rejected {
            warn!(turn = call.turn, tool = %call.tool, reason = %call.reason, "tool call rejected");
        }
        Ok(EvaluationResult::scored(&case.query, task, scores, start.elapsed())
            .with_rejected_calls(rejected))
    }

    /// Score a batch of cases
    ///
    /// A case that fails is recorded as an errored result; the rest of the
    /// batch is still scored.
    pub fn evaluate_cases(&self, cases: &[EvalCase]) -> EvaluationReport {
        let started_at = chrono::Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            task = %self.config.task,
            cases = cases.len(),
            "evaluation started"
        );

        let results: Vec<EvaluationResult> = cases
            .iter()
            .map(|case| {
                let start = Instant::now();
                self.evaluate_case(case).unwrap_or_else(|e| {
                    warn!(query = %case.query, error = %e, "case could not be scored");
                    EvaluationResult::errored(&case.query, &e.to_string(), start.elapsed())
                })
            })
            .collect();

        let report = EvaluationReport::new(&run_id, self.config.task, results, started_at);
        info!(
            run_id = %run_id,
            total = report.summary.total,
            errors = report.summary.errors,
            gt_rate = report.summary.gt_rate,
            success_rate = report.summary.success_rate,
            "evaluation completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReasoningMode;
    use crate::constraint::Constraint;
    use crate::task::TaskKind;
    use serde_json::json;
    use shopbench_core::{InMemoryCatalog, LexicalSimilarity, Product, ToolCall, Turn};

    fn evaluator(config: EvaluationConfig) -> Evaluator {
        let catalog =
            InMemoryCatalog::new().with_product(Product::new("p1", "S1", "red shoes", 40.0));
        Evaluator::new(config, Arc::new(catalog), Arc::new(LexicalSimilarity))
    }

    fn trajectory() -> Trajectory {
        let search = Turn {
            reasoning: "find shoes".to_string(),
            tool_calls: vec![
                ToolCall::new("find_product")
                    .with_parameters(json!({"q": "red shoes", "page": 1})),
            ],
            ..Default::default()
        };
        let finish = Turn {
            reasoning: "done".to_string(),
            tool_calls: vec![
                ToolCall::new("recommend_product").with_parameters(json!({"product_ids": "p1"})),
                ToolCall::new("terminate").with_parameters(json!({"status": "success"})),
            ],
            ..Default::default()
        };
        Trajectory::new("red shoes", vec![search, finish])
    }

    #[test]
    fn test_format_score_modes() {
        let mut trajectory = trajectory();
        trajectory.turns[0].reasoning.clear();

        let think = evaluator(EvaluationConfig::default());
        assert_eq!(think.format_score(&trajectory), 0.5);

        let no_think =
            evaluator(EvaluationConfig::default().with_reasoning_mode(ReasoningMode::NoThink));
        assert_eq!(no_think.format_score(&trajectory), 1.0);

        let human = evaluator(EvaluationConfig::default().with_score_format(false));
        assert_eq!(human.format_score(&trajectory), 0.0);
        assert_eq!(think.format_score(&Trajectory::default()), 0.0);
    }

    #[test]
    fn test_evaluate_case() {
        let case = EvalCase::new("red shoes", trajectory(), Target::Single(Constraint::new("p1")));
        let result = evaluator(EvaluationConfig::default()).evaluate_case(&case).unwrap();
        assert!(result.success);
        assert_eq!(result.scores.get(metric::LENGTH), 0.5);
        assert_eq!(result.scores.get(metric::FORMAT), 1.0);
        assert_eq!(result.scores.get(metric::GT), 1.0);
        assert!(result.rejected_calls.is_empty());
    }

    #[test]
    fn test_rejected_calls_are_reported() {
        let mut trajectory = trajectory();
        trajectory.turns[0].tool_calls.push(ToolCall::new("python_execute"));
        trajectory.turns[1].tool_calls[1] =
            ToolCall::new("terminate").with_parameters(json!({"status": "done"}));

        let case = EvalCase::new("red shoes", trajectory, Target::Single(Constraint::new("p1")));
        let result = evaluator(EvaluationConfig::default()).evaluate_case(&case).unwrap();

        let tools: Vec<_> =
            result.rejected_calls.iter().map(|c| (c.turn, c.tool.as_str())).collect();
        assert_eq!(tools, vec![(0, "python_execute"), (1, "terminate")]);
        // an ill-typed terminate does not finish the trajectory
        assert_eq!(result.scores.get(metric::LENGTH), 0.0);
        assert_eq!(result.scores.get(metric::GT), 1.0);
    }

    #[test]
    fn test_batch_survives_bad_case() {
        let good = EvalCase::new("a", trajectory(), Target::Single(Constraint::new("p1")));
        let bad = EvalCase::new("b", trajectory(), Target::Ordered(vec![Constraint::new("p1")]));
        let report =
            evaluator(EvaluationConfig::new(TaskKind::Product)).evaluate_cases(&[good, bad]);

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.errors, 1);
        assert!(report.results[1].error.is_some());
        assert_eq!(report.summary.success_rate, 1.0);
    }
}
