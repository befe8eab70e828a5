//! Evaluation result reporting
//!
//! Structures for representing and formatting evaluation results.

use serde::{Deserialize, Serialize};
use shopbench_core::RejectedCall;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::constraint::Field;
use crate::task::{Score, TaskKind, metric};

/// Complete report of an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Unique identifier for this evaluation run
    pub run_id: String,
    pub task: TaskKind,
    /// When the evaluation started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// When the evaluation completed
    pub completed_at: chrono::DateTime<chrono::Utc>,
    /// Total duration
    pub duration: Duration,
    /// Results for each case, in input order
    pub results: Vec<EvaluationResult>,
    /// Summary statistics
    pub summary: EvaluationSummary,
}

impl EvaluationReport {
    /// Create a new report
    pub fn new(
        run_id: &str,
        task: TaskKind,
        results: Vec<EvaluationResult>,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let completed_at = chrono::Utc::now();
        let duration = (completed_at - started_at).to_std().unwrap_or_default();
        let summary = EvaluationSummary::from_results(&results);

        Self {
            run_id: run_id.to_string(),
            task,
            started_at,
            completed_at,
            duration,
            results,
            summary,
        }
    }

    /// Results that could not be scored
    pub fn errors(&self) -> Vec<&EvaluationResult> {
        self.results.iter().filter(|r| r.error.is_some()).collect()
    }

    /// Format as a human-readable string
    pub fn format_summary(&self) -> String {
        let summary = &self.summary;
        let mut output = String::new();
        output.push_str(&format!("Evaluation Report: {} ({} task)\n", self.run_id, self.task));
        output.push_str(&format!("Duration: {:?}\n", self.duration));
        output.push_str(&format!("Cases: {} scored, {} errors\n", summary.total, summary.errors));

        output.push_str("\n--- Metrics ---\n");
        output.push_str(&format!("  GT rate: {:.3}\n", summary.gt_rate));
        output.push_str(&format!("  Success rate: {:.3}\n", summary.success_rate));

        if !summary.avg_scores.is_empty() {
            output.push_str("\n--- Details ---\n");
            for metric in report_order(self.task, &summary.avg_scores) {
                output.push_str(&format!("  {}: {:.3}\n", metric, summary.avg_scores[metric]));
            }
        }

        if summary.errors > 0 {
            output.push_str("\nErrors:\n");
            for result in self.errors() {
                output.push_str(&format!(
                    "  - {}: {}\n",
                    result.query,
                    result.error.as_deref().unwrap_or_default()
                ));
            }
        }

        output
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Metrics in reading order: the fixed ones first, then any others by name
fn report_order<'a>(task: TaskKind, scores: &'a BTreeMap<String, f64>) -> Vec<&'a str> {
    let mut leading = vec![metric::FORMAT, metric::LENGTH];
    match task {
        TaskKind::Web => leading.extend([
            metric::KEYWORD,
            metric::TITLE,
            metric::HAVE_RECOMMEND,
            metric::RESPONSE,
            metric::RULE,
        ]),
        _ => {
            leading.push(metric::PRODUCT);
            leading.extend(Field::ALL.map(Field::as_str));
            leading.push(metric::RULE);
        }
    }
    leading.extend(task.gate_metric());

    let listed: BTreeSet<&str> = leading.iter().copied().collect();
    let mut order: Vec<&'a str> = Vec::new();
    for name in leading {
        if let Some((key, _)) = scores.get_key_value(name) {
            order.push(key.as_str());
        }
    }
    order.extend(scores.keys().map(String::as_str).filter(|k| !listed.contains(k)));
    order
}

/// Summary statistics for an evaluation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Number of scored cases
    pub total: usize,
    /// Number of cases that failed with an error
    pub errors: usize,
    /// Fraction of scored cases that recommended the ground-truth product
    pub gt_rate: f64,
    /// Fraction of scored cases that met every requirement
    pub success_rate: f64,
    /// Average of every metric over scored cases
    pub avg_scores: BTreeMap<String, f64>,
}

impl EvaluationSummary {
    /// Calculate summary from results
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let scored: Vec<&EvaluationResult> = results.iter().filter(|r| r.error.is_none()).collect();
        let total = scored.len();
        let errors = results.len() - total;
        let rate = |count: usize| if total > 0 { count as f64 / total as f64 } else { 0.0 };

        let gt_rate = rate(scored.iter().filter(|r| r.scores.get(metric::GT) >= 1.0).count());
        let success_rate = rate(scored.iter().filter(|r| r.success).count());

        let mut score_sums: BTreeMap<String, f64> = BTreeMap::new();
        for result in &scored {
            for (name, value) in result.scores.iter() {
                *score_sums.entry(name.to_string()).or_insert(0.0) += value;
            }
        }
        let avg_scores =
            score_sums.into_iter().map(|(name, sum)| (name, sum / total as f64)).collect();

        Self { total, errors, gt_rate, success_rate, avg_scores }
    }
}

/// Result for a single case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Query of the case
    pub query: String,
    /// Whether the case met every requirement of its task
    pub success: bool,
    /// Named scores; empty when the case errored
    pub scores: Score,
    /// Configuration error that stopped scoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool calls outside the closed tool set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_calls: Vec<RejectedCall>,
    /// Scoring duration
    pub duration: Duration,
}

impl EvaluationResult {
    /// Create a scored result
    pub fn scored(query: &str, task: TaskKind, scores: Score, duration: Duration) -> Self {
        let success = is_success(task, &scores);
        Self {
            query: query.to_string(),
            success,
            scores,
            error: None,
            rejected_calls: Vec::new(),
            duration,
        }
    }

    /// Create a result for a case that could not be scored
    pub fn errored(query: &str, error: &str, duration: Duration) -> Self {
        Self {
            query: query.to_string(),
            success: false,
            scores: Score::new(),
            error: Some(error.to_string()),
            rejected_calls: Vec::new(),
            duration,
        }
    }

    pub fn with_rejected_calls(mut self, rejected_calls: Vec<RejectedCall>) -> Self {
        self.rejected_calls = rejected_calls;
        self
    }
}

/// Full constraint match plus the task's basket gate, if any
pub fn is_success(task: TaskKind, scores: &Score) -> bool {
    scores.get(metric::RULE) >= 1.0
        && task.gate_metric().is_none_or(|gate| scores.get(gate) >= 1.0)
}
