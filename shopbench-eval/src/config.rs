//! Evaluation configuration
//!
//! Loaded from TOML or JSON; every section validates itself before use.

use serde::{Deserialize, Serialize};
use shopbench_core::Role;
use std::path::Path;

use crate::constraint::{DEFAULT_TITLE_THRESHOLD, DEFAULT_WEB_TITLE_THRESHOLD};
use crate::error::{EvalError, Result};
use crate::reward::RewardConfig;
use crate::task::TaskKind;

/// Whether the evaluated agent emits reasoning blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    #[default]
    Think,
    /// ReAct-style agents that only emit tool calls
    NoThink,
}

impl ReasoningMode {
    /// Roles each turn is checked against
    pub fn format_roles(self) -> &'static [Role] {
        static TOOL_CALL_ONLY: [Role; 1] = [Role::ToolCall];
        match self {
            ReasoningMode::Think => &Role::OUTPUT,
            ReasoningMode::NoThink => &TOOL_CALL_ONLY,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_title_threshold() -> f64 {
    DEFAULT_TITLE_THRESHOLD
}

fn default_web_title_threshold() -> f64 {
    DEFAULT_WEB_TITLE_THRESHOLD
}

/// Configuration of an evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Task every case in the run belongs to
    pub task: TaskKind,
    #[serde(default)]
    pub reasoning_mode: ReasoningMode,
    /// Score turn format; off for human-written trajectories
    #[serde(default = "default_true")]
    pub score_format: bool,
    #[serde(default = "default_title_threshold")]
    pub title_threshold: f64,
    #[serde(default = "default_web_title_threshold")]
    pub web_title_threshold: f64,
    #[serde(default)]
    pub reward: RewardConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self::new(TaskKind::Product)
    }
}

impl EvaluationConfig {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            reasoning_mode: ReasoningMode::Think,
            score_format: true,
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            web_title_threshold: DEFAULT_WEB_TITLE_THRESHOLD,
            reward: RewardConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from disk; `.toml` files are TOML, anything else JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn with_reasoning_mode(mut self, mode: ReasoningMode) -> Self {
        self.reasoning_mode = mode;
        self
    }

    pub fn with_score_format(mut self, enabled: bool) -> Self {
        self.score_format = enabled;
        self
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.title_threshold = threshold;
        self
    }

    pub fn with_web_title_threshold(mut self, threshold: f64) -> Self {
        self.web_title_threshold = threshold;
        self
    }

    pub fn with_reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    /// Check thresholds and the reward section
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("title_threshold", self.title_threshold),
            ("web_title_threshold", self.web_title_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EvalError::config(format!(
                    "{} must be within [0, 1], got {}",
                    field, value
                )));
            }
        }
        self.reward.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchMode;
    use crate::reward::Schedule;

    #[test]
    fn test_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.task, TaskKind::Product);
        assert!(config.score_format);
        assert_eq!(config.title_threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = EvaluationConfig::from_toml_str(
            r#"
            task = "voucher"
            reasoning_mode = "no_think"

            [reward]
            matcher = "strict"

            [reward.format.schedule]
            kind = "halve_from"
            step = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.task, TaskKind::Voucher);
        assert_eq!(config.reasoning_mode.format_roles(), &[Role::ToolCall]);
        assert_eq!(config.reward.matcher, MatchMode::Strict);
        assert_eq!(config.reward.format.schedule, Schedule::HalveFrom { step: 30 });
        assert_eq!(config.reward.correctness.envelope.max, 3.0);
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        assert!(EvaluationConfig::from_json_str(r#"{"task": "auction"}"#).is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        let err = EvaluationConfig::default().with_title_threshold(1.5).validate().unwrap_err();
        assert!(matches!(err, EvalError::ConfigError(msg) if msg.contains("title_threshold")));
    }

    #[test]
    fn test_invalid_envelope() {
        let json =
            r#"{"task": "shop", "reward": {"correctness": {"envelope": {"min": 3, "max": -3}}}}"#;
        assert!(matches!(EvaluationConfig::from_json_str(json), Err(EvalError::ConfigError(_))));
    }
}
