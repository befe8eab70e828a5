//! Partial-credit matching of predicted tool calls against ground truth
//!
//! The score combines a name-level multiset similarity with a greedy
//! assignment of each ground-truth call to its best-scoring unused
//! prediction of the same name. The assignment is greedy in ground-truth
//! order, not a global optimum: it is deterministic and O(n·m), and reward
//! curves of past training runs depend on exactly this bias.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shopbench_core::ToolCall;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::trace;

/// How strictly predictions are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Partial credit for names, parameter keys and parameter values
    #[default]
    Fine,
    /// Similarities collapse to 0 unless both lists are equal in order
    Strict,
    /// Anything short of an exact match earns the minimum reward
    Coarse,
    /// Each ground-truth call is worth 1 and only an identical call earns it
    Intermediate,
}

/// Whether two slices hold the same elements with the same multiplicities
fn same_multiset<T: Eq + Hash>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && counts(a) == counts(b)
}

fn counts<T: Eq + Hash>(items: &[T]) -> HashMap<&T, usize> {
    let mut counts = HashMap::with_capacity(items.len());
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

/// Frequency-aware, order-insensitive similarity of two multisets
///
/// `|A ∩ B| / (|A| + |B| - |A ∩ B|)` where the intersection keeps the
/// smaller count per element. Equal multisets (two empty ones included)
/// score 1; otherwise an empty side scores 0.
pub fn multiset_similarity<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    if same_multiset(a, b) {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let count_a = counts(a);
    let count_b = counts(b);
    let intersection: usize = count_a
        .iter()
        .filter_map(|(item, &n)| count_b.get(item).map(|&m| n.min(m)))
        .sum();
    let union = a.len() + b.len() - intersection;

    if union > 0 { intersection as f64 / union as f64 } else { 0.0 }
}

/// Split a string parameter into comparison tokens
///
/// Commas become spaces, then the text is split on single spaces. Empty
/// tokens from repeated separators are kept so scores stay identical to
/// existing reward logs.
pub fn tokenize(value: &str) -> Vec<String> {
    value.replace(',', " ").split(' ').map(str::to_string).collect()
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

/// Per-ground-truth-call outcome of the greedy assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMatch {
    /// Index into the ground-truth list
    pub ground_truth: usize,
    /// Index of the prediction assigned to it, if any
    pub predicted: Option<usize>,
    /// Score earned by the assignment
    pub score: f64,
    /// Best score this call could have earned
    pub max_score: f64,
}

/// Full breakdown of a tool-call comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBreakdown {
    /// Predictions equal ground truth as multisets of calls
    pub exact: bool,
    /// Name-level multiset similarity
    pub name_similarity: f64,
    /// Sum of earned scores, name similarity included
    pub numerator: f64,
    /// Sum of attainable scores, starting at 1 for the name similarity
    pub denominator: f64,
    /// One entry per ground-truth call
    pub matches: Vec<CallMatch>,
}

impl MatchBreakdown {
    /// Fraction of attainable credit earned, in `[0, 1]`
    pub fn ratio(&self) -> f64 {
        if self.exact {
            return 1.0;
        }
        if self.denominator > 0.0 { self.numerator / self.denominator } else { 0.0 }
    }

    /// Indices of predictions that were not assigned to any ground-truth call
    pub fn unmatched_predictions(&self, predicted_len: usize) -> Vec<usize> {
        (0..predicted_len)
            .filter(|i| !self.matches.iter().any(|m| m.predicted == Some(*i)))
            .collect()
    }
}

/// Scores predicted tool calls against ground truth
#[derive(Debug, Clone, Default)]
pub struct ToolCallMatcher {
    mode: MatchMode,
}

impl ToolCallMatcher {
    /// Create a matcher with fine-grained partial credit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an explicit mode
    pub fn with_mode(mode: MatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    fn similarity<T: Eq + Hash>(&self, a: &[T], b: &[T]) -> f64 {
        match self.mode {
            MatchMode::Strict => {
                if a == b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => multiset_similarity(a, b),
        }
    }

    /// Key overlap plus value correctness of a prediction's parameters
    ///
    /// Values are compared only for ground-truth keys present in the
    /// prediction: strings by token similarity, integers by equality; any
    /// other or mismatched type earns nothing.
    pub fn parameter_score(
        &self,
        ground_truth: &Map<String, Value>,
        predicted: &Map<String, Value>,
    ) -> f64 {
        let gt_keys: Vec<&String> = ground_truth.keys().collect();
        let pd_keys: Vec<&String> = predicted.keys().collect();
        let key_score = self.similarity(&gt_keys, &pd_keys);

        let mut correctness = 0.0;
        for (key, gt_value) in ground_truth {
            let Some(pd_value) = predicted.get(key) else {
                continue;
            };
            match (gt_value, pd_value) {
                (Value::String(gt), Value::String(pd)) => {
                    correctness += self.similarity(&tokenize(gt), &tokenize(pd));
                }
                (gt, pd) if is_integer(gt) && is_integer(pd) => {
                    if gt == pd {
                        correctness += 1.0;
                    }
                }
                _ => {}
            }
        }

        key_score + correctness
    }

    fn exact_match(ground_truth: &[ToolCall], predicted: &[ToolCall]) -> bool {
        if ground_truth.len() != predicted.len() {
            return false;
        }
        let mut used = vec![false; predicted.len()];
        ground_truth.iter().all(|gt| {
            match predicted.iter().enumerate().position(|(i, pd)| !used[i] && pd == gt) {
                Some(i) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Compare two call lists and explain the result
    pub fn compare(&self, ground_truth: &[ToolCall], predicted: &[ToolCall]) -> MatchBreakdown {
        if Self::exact_match(ground_truth, predicted) {
            return MatchBreakdown {
                exact: true,
                name_similarity: 1.0,
                numerator: 1.0,
                denominator: 1.0,
                matches: (0..ground_truth.len())
                    .map(|i| CallMatch {
                        ground_truth: i,
                        predicted: Some(i),
                        score: 1.0,
                        max_score: 1.0,
                    })
                    .collect(),
            };
        }

        let gt_names: Vec<&str> = ground_truth.iter().map(|c| c.name.as_str()).collect();
        let pd_names: Vec<&str> = predicted.iter().map(|c| c.name.as_str()).collect();
        let name_similarity = self.similarity(&gt_names, &pd_names);

        let mut numerator = name_similarity;
        let mut denominator = 1.0;
        let mut used = vec![false; predicted.len()];
        let mut matches = Vec::with_capacity(ground_truth.len());

        for (gt_index, gt) in ground_truth.iter().enumerate() {
            let max_score = match self.mode {
                MatchMode::Intermediate => 1.0,
                _ => 1.0 + gt.parameters.len() as f64,
            };
            denominator += max_score;

            let mut best: Option<(usize, f64)> = None;
            for (pd_index, pd) in predicted.iter().enumerate() {
                if used[pd_index] || pd.name != gt.name {
                    continue;
                }
                if self.mode == MatchMode::Intermediate {
                    if pd == gt {
                        best = Some((pd_index, 1.0));
                        break;
                    }
                    continue;
                }
                let score = self.parameter_score(&gt.parameters, &pd.parameters);
                // A candidate has to earn something to be assigned
                if score > best.map_or(0.0, |(_, s)| s) {
                    best = Some((pd_index, score));
                }
            }

            if let Some((pd_index, score)) = best {
                used[pd_index] = true;
                numerator += score;
            }
            trace!(tool = %gt.name, ?best, max_score, "ground-truth call matched");
            matches.push(CallMatch {
                ground_truth: gt_index,
                predicted: best.map(|(i, _)| i),
                score: best.map_or(0.0, |(_, s)| s),
                max_score,
            });
        }

        MatchBreakdown { exact: false, name_similarity, numerator, denominator, matches }
    }

    /// Score predictions into the `[min_reward, max_reward]` envelope
    pub fn score(
        &self,
        ground_truth: &[ToolCall],
        predicted: &[ToolCall],
        max_reward: f64,
        min_reward: f64,
    ) -> f64 {
        if Self::exact_match(ground_truth, predicted) {
            return max_reward;
        }
        if self.mode == MatchMode::Coarse {
            return min_reward;
        }

        let breakdown = self.compare(ground_truth, predicted);
        min_reward + (max_reward - min_reward) * breakdown.ratio()
    }
}
