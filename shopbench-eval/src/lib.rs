//! # shopbench-eval
//!
//! Trajectory evaluation and reward scoring for shopping agents.
//!
//! ## Features
//!
//! - **Format validation**: check tagged turns against the turn protocol
//! - **Tool-call matching**: partial credit for right tools with partly right arguments
//! - **Constraint scoring**: rate recommended products against synthesized requirements
//! - **Task scorers**: product, shop, voucher and web tasks with their basket gates
//! - **Training rewards**: step-level rewards with scheduled envelopes
//! - **Reports**: batch evaluation with summary metrics and JSON export
//!
//! ## Quick Start
//!
//! ```rust
//! use shopbench_core::{InMemoryCatalog, LexicalSimilarity, Product, ToolCall, Trajectory, Turn};
//! use shopbench_eval::{Constraint, EvalCase, EvaluationConfig, Evaluator, Target, TaskKind};
//! use std::sync::Arc;
//!
//! let catalog = InMemoryCatalog::new().with_product(Product::new("p1", "s1", "red shoes", 40.0));
//! let evaluator = Evaluator::new(
//!     EvaluationConfig::new(TaskKind::Product),
//!     Arc::new(catalog),
//!     Arc::new(LexicalSimilarity),
//! );
//!
//! let turn = Turn {
//!     reasoning: "found them".to_string(),
//!     tool_calls: vec![
//!         ToolCall::new("recommend_product")
//!             .with_parameters(serde_json::json!({"product_ids": "p1"})),
//!     ],
//!     ..Default::default()
//! };
//! let case = EvalCase::new(
//!     "red shoes",
//!     Trajectory::new("red shoes", vec![turn]),
//!     Target::Single(Constraint::new("p1")),
//! );
//!
//! let report = evaluator.evaluate_cases(&[case]);
//! assert_eq!(report.summary.gt_rate, 1.0);
//! println!("{}", report.format_summary());
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod matcher;
pub mod report;
pub mod reward;
pub mod task;
pub mod voucher;

// Re-exports
pub use config::{EvaluationConfig, ReasoningMode};
pub use constraint::{
    Constraint, ConstraintEvaluator, ConstraintOutcome, Field, PriceMode, PriceRange,
    WebConstraint, WebOutcome,
};
pub use error::{EvalError, Result};
pub use evaluator::{EvalCase, Evaluator};
pub use format::{FormatViolation, validate};
pub use matcher::{MatchBreakdown, MatchMode, ToolCallMatcher, multiset_similarity};
pub use report::{EvaluationReport, EvaluationResult, EvaluationSummary};
pub use reward::{
    Envelope, LengthTarget, RewardAggregator, RewardBreakdown, RewardConfig, RewardModel,
    Schedule, SignalConfig, length_reward,
};
pub use task::{Score, Target, TaskKind, TaskScorer, metric};
pub use voucher::{Discount, Voucher, VoucherScope};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{EvaluationConfig, ReasoningMode};
    pub use crate::constraint::{Constraint, ConstraintEvaluator, WebConstraint};
    pub use crate::error::{EvalError, Result};
    pub use crate::evaluator::{EvalCase, Evaluator};
    pub use crate::matcher::{MatchMode, ToolCallMatcher};
    pub use crate::report::{EvaluationReport, EvaluationResult};
    pub use crate::reward::{RewardConfig, RewardModel};
    pub use crate::task::{Score, Target, TaskKind};
    pub use crate::voucher::Voucher;
}
