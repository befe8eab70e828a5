//! Step-level training rewards
//!
//! A completion earns three signals: a format signal (valid protocol or
//! not), a correctness signal (tool-call match against the answer) and an
//! optional length signal (how much the agent reasoned). Each signal lives in
//! an `[min, max]` envelope that may move with the training step; the total
//! is the weighted sum of the signals clamped to their envelopes.
//!
//! Everything here is a pure function of `(completion, answer, step, config)`.

use serde::{Deserialize, Serialize};
use shopbench_core::{Role, ToolCall, Trajectory, extract_block};
use shopbench_telemetry::reward_span;
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::format::{has_block, roles_for_answer, validate};
use crate::matcher::{MatchMode, ToolCallMatcher};

/// Bounds a signal is scaled into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: f64,
    pub max: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl Envelope {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the envelope
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Map a ratio in `[0, 1]` onto the envelope
    pub fn scale(&self, ratio: f64) -> f64 {
        self.min + (self.max - self.min) * ratio
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self { min: f(self.min), max: f(self.max) }
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(EvalError::config(format!("{}: envelope bounds must be finite", field)));
        }
        if self.min > self.max {
            return Err(EvalError::config(format!(
                "{}: envelope min {} exceeds max {}",
                field, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Step-dependent adjustment of an envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Bounds never change
    #[default]
    Fixed,
    /// Bounds are halved once `step` is reached
    HalveFrom { step: u64 },
    /// Bounds are divided by `divisor` until `step` is reached
    DivideBefore { step: u64, divisor: f64 },
    /// Bounds move linearly from `start` toward the configured envelope
    /// over `horizon` steps and never pass the limits
    Linear { start: Envelope, horizon: u64, max_limit: f64, min_limit: f64 },
    /// Stages applied in order
    Chain { stages: Vec<Schedule> },
}

/// Linear bound that stops at `limit` in its direction of travel
fn approach(start: f64, target: f64, step: u64, horizon: u64, limit: f64) -> f64 {
    let value = start + (target - start) * step as f64 / horizon as f64;
    if target < start { value.max(limit) } else { value.min(limit) }
}

impl Schedule {
    /// Start wide at `[-2, 2]` and narrow toward the envelope, keeping at least `[-1, 1]`
    pub fn narrowing() -> Self {
        Schedule::Linear {
            start: Envelope::new(-2.0, 2.0),
            horizon: 150,
            max_limit: 1.0,
            min_limit: -1.0,
        }
    }

    /// Start at `[-2, 2]` and widen toward the envelope, at most `[-3, 3]`
    pub fn widening() -> Self {
        Schedule::Linear {
            start: Envelope::new(-2.0, 2.0),
            horizon: 150,
            max_limit: 3.0,
            min_limit: -3.0,
        }
    }

    /// Envelope in effect at `step`
    pub fn apply(&self, envelope: Envelope, step: u64) -> Envelope {
        match self {
            Schedule::Fixed => envelope,
            Schedule::HalveFrom { step: from } => {
                if step >= *from { envelope.map(|b| b / 2.0) } else { envelope }
            }
            Schedule::DivideBefore { step: until, divisor } => {
                if step < *until { envelope.map(|b| b / divisor) } else { envelope }
            }
            Schedule::Linear { start, horizon, max_limit, min_limit } => Envelope {
                min: approach(start.min, envelope.min, step, *horizon, *min_limit),
                max: approach(start.max, envelope.max, step, *horizon, *max_limit),
            },
            Schedule::Chain { stages } => {
                stages.iter().fold(envelope, |envelope, stage| stage.apply(envelope, step))
            }
        }
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        match self {
            Schedule::Fixed | Schedule::HalveFrom { .. } => Ok(()),
            Schedule::DivideBefore { divisor, .. } => {
                if divisor.is_finite() && *divisor != 0.0 {
                    Ok(())
                } else {
                    Err(EvalError::config(format!(
                        "{}: schedule divisor must be finite and non-zero",
                        field
                    )))
                }
            }
            Schedule::Linear { start, horizon, max_limit, min_limit } => {
                start.validate(field)?;
                if *horizon == 0 {
                    return Err(EvalError::config(format!(
                        "{}: schedule horizon must be > 0",
                        field
                    )));
                }
                if !max_limit.is_finite() || !min_limit.is_finite() {
                    return Err(EvalError::config(format!(
                        "{}: schedule limits must be finite",
                        field
                    )));
                }
                Ok(())
            }
            Schedule::Chain { stages } => {
                stages.iter().try_for_each(|stage| stage.validate(field))
            }
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// One reward signal's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub envelope: Envelope,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weight: 1.0,
            envelope: Envelope::default(),
            schedule: Schedule::Fixed,
            enabled: true,
        }
    }
}

impl SignalConfig {
    pub fn new(min: f64, max: f64) -> Self {
        Self { envelope: Envelope::new(min, max), ..Default::default() }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Envelope at `step` after the schedule
    pub fn envelope_at(&self, step: u64) -> Envelope {
        self.schedule.apply(self.envelope, step)
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        if !self.weight.is_finite() {
            return Err(EvalError::config(format!("{}: weight must be finite", field)));
        }
        self.envelope.validate(field)?;
        self.schedule.validate(field)
    }
}

/// Number of reasoning words that earns the full length reward
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LengthTarget {
    Fixed { words: u64 },
    /// Grows linearly from `from` words by `(to - from)` every `horizon` steps
    Linear { from: u64, to: u64, horizon: u64 },
}

impl Default for LengthTarget {
    fn default() -> Self {
        LengthTarget::Fixed { words: 512 }
    }
}

impl LengthTarget {
    pub fn scheduled() -> Self {
        LengthTarget::Linear { from: 384, to: 640, horizon: 105 }
    }

    pub fn words_at(&self, step: u64) -> f64 {
        match *self {
            LengthTarget::Fixed { words } => words as f64,
            LengthTarget::Linear { from, to, horizon } => {
                (to as f64 - from as f64) * step as f64 / horizon as f64 + from as f64
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            LengthTarget::Fixed { words: 0 } => {
                Err(EvalError::config("length_target: words must be > 0"))
            }
            LengthTarget::Linear { horizon: 0, .. } => {
                Err(EvalError::config("length_target: horizon must be > 0"))
            }
            LengthTarget::Linear { from: 0, .. } => {
                Err(EvalError::config("length_target: from must be > 0"))
            }
            _ => Ok(()),
        }
    }
}

/// Configuration of the step-level reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub format: SignalConfig,
    #[serde(default = "RewardConfig::default_correctness")]
    pub correctness: SignalConfig,
    #[serde(default = "RewardConfig::default_length")]
    pub length: SignalConfig,
    #[serde(default)]
    pub length_target: LengthTarget,
    #[serde(default)]
    pub matcher: MatchMode,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            format: SignalConfig::new(0.0, 1.0),
            correctness: Self::default_correctness(),
            length: Self::default_length(),
            length_target: LengthTarget::default(),
            matcher: MatchMode::Fine,
        }
    }
}

impl RewardConfig {
    fn default_correctness() -> SignalConfig {
        SignalConfig::new(-3.0, 3.0)
    }

    fn default_length() -> SignalConfig {
        SignalConfig::new(0.0, 1.0).with_enabled(false)
    }

    /// Correctness in `[-1, 1]` instead of `[-3, 3]`
    pub fn with_unit_correctness(mut self) -> Self {
        self.correctness.envelope = Envelope::new(-1.0, 1.0);
        self
    }

    pub fn with_matcher(mut self, mode: MatchMode) -> Self {
        self.matcher = mode;
        self
    }

    /// Enable the length signal with the given target
    pub fn with_length(mut self, target: LengthTarget) -> Self {
        self.length.enabled = true;
        self.length_target = target;
        self
    }

    /// Narrow the format envelope and widen the correctness envelope over training
    pub fn with_scheduled_envelopes(mut self) -> Self {
        self.format.schedule = Schedule::narrowing();
        self.correctness.schedule = Schedule::widening();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.format.validate("reward.format")?;
        self.correctness.validate("reward.correctness")?;
        self.length.validate("reward.length")?;
        self.length_target.validate()
    }
}

/// Signals of one completion and their weighted total
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub total: f64,
    pub format: f64,
    pub correctness: f64,
    pub length: f64,
}

/// Combines signals into a reward
#[derive(Debug, Clone, Default)]
pub struct RewardAggregator {
    config: RewardConfig,
}

impl RewardAggregator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Weighted sum of the signals, each clamped to its envelope at `step`
    ///
    /// Disabled signals contribute 0.
    pub fn aggregate(
        &self,
        format_ok: bool,
        match_score: f64,
        length_score: f64,
        step: u64,
    ) -> RewardBreakdown {
        let signal = |config: &SignalConfig, value: f64| {
            if config.enabled { config.envelope_at(step).clamp(value) } else { 0.0 }
        };

        let format_envelope = self.config.format.envelope_at(step);
        let format_value = if format_ok { format_envelope.max } else { format_envelope.min };

        let format = signal(&self.config.format, format_value);
        let correctness = signal(&self.config.correctness, match_score);
        let length = signal(&self.config.length, length_score);
        let total = self.config.format.weight * format
            + self.config.correctness.weight * correctness
            + self.config.length.weight * length;

        RewardBreakdown { total, format, correctness, length }
    }
}

/// Number of whitespace-separated words in the completion's reasoning
///
/// Reads the text after the last `<think>` up to the following `</think>`.
/// `None` when either tag is missing.
pub fn reasoning_words(completion: &str) -> Option<usize> {
    let open = Role::Think.open_tag();
    let close = Role::Think.close_tag();
    if !completion.contains(&open) || !completion.contains(&close) {
        return None;
    }
    let (_, after) = completion.rsplit_once(&open)?;
    let reasoning = after.split(&close).next().unwrap_or_default();
    Some(reasoning.split_whitespace().count())
}

/// Round to two decimals on the exact binary value, ties to even
fn round_cents(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// Reasoning length relative to `target` words, rounded to two decimals and capped at 1
pub fn reasoning_length_ratio(completion: &str, target: f64) -> Option<f64> {
    let words = reasoning_words(completion)?;
    Some(round_cents(words as f64 / target).min(1.0))
}

/// Efficiency of a finished trajectory
///
/// `1 / turns` when the final turn calls `terminate`, otherwise 0.
pub fn length_reward(trajectory: &Trajectory) -> f64 {
    match trajectory.turns.last() {
        Some(last) if last.terminates() => 1.0 / trajectory.len() as f64,
        _ => 0.0,
    }
}

/// Computes the training reward of single completions
#[derive(Debug, Clone, Default)]
pub struct RewardModel {
    aggregator: RewardAggregator,
    matcher: ToolCallMatcher,
}

impl RewardModel {
    pub fn new(config: RewardConfig) -> Self {
        let matcher = ToolCallMatcher::with_mode(config.matcher);
        Self { aggregator: RewardAggregator::new(config), matcher }
    }

    pub fn config(&self) -> &RewardConfig {
        self.aggregator.config()
    }

    /// Score `completion` against the ground-truth `answer` at training `step`
    ///
    /// Malformed completions are scored, never rejected: a completion that
    /// fails the format check gets the minimum correctness without being
    /// matched. Fails only when the answer's own tool-call block does not parse.
    pub fn score_completion(
        &self,
        completion: &str,
        answer: &str,
        step: u64,
    ) -> Result<RewardBreakdown> {
        let _span = reward_span(step).entered();
        let config = self.config();

        let format_ok = validate(completion, roles_for_answer(answer));
        let envelope = config.correctness.envelope_at(step);
        let correctness = self.correctness(completion, answer, format_ok, envelope)?;

        let length = if config.length.enabled {
            let envelope = config.length.envelope_at(step);
            reasoning_length_ratio(completion, config.length_target.words_at(step))
                .map_or(envelope.min, |ratio| envelope.scale(ratio))
        } else {
            0.0
        };

        let breakdown = self.aggregator.aggregate(format_ok, correctness, length, step);
        info!(
            total = breakdown.total,
            format = breakdown.format,
            correctness = breakdown.correctness,
            length = breakdown.length,
            "completion scored"
        );
        Ok(breakdown)
    }

    fn correctness(
        &self,
        completion: &str,
        answer: &str,
        format_ok: bool,
        envelope: Envelope,
    ) -> Result<f64> {
        if !has_block(answer, Role::ToolCall) {
            return Ok(0.0);
        }
        let expected = extract_block(answer, Role::ToolCall)
            .and_then(ToolCall::parse_block)
            .ok_or_else(|| {
                EvalError::ParseError("answer tool call is not valid JSON".to_string())
            })?;

        if !format_ok {
            debug!("completion failed the format check");
            return Ok(envelope.min);
        }
        let Some(predicted) =
            extract_block(completion, Role::ToolCall).and_then(ToolCall::parse_block)
        else {
            debug!("completion tool call missing or unparseable");
            return Ok(envelope.min);
        };

        Ok(self.matcher.score(&expected, &predicted, envelope.max, envelope.min))
    }
}
