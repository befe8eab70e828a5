//! # shopbench-core
//!
//! Core types for evaluating shopping-agent trajectories.
//!
//! ## Overview
//!
//! - [`Turn`] / [`ToolCall`] - the tagged turn protocol (`<think>`, `<tool_call>`,
//!   `<response>`) and its parser/renderer
//! - [`ToolInvocation`] - the closed, strongly typed tool set
//! - [`Trajectory`] - ordered turns for one query
//! - [`Product`] / [`ProductCatalog`] - catalog records and lookup
//! - [`TextSimilarity`] - the similarity oracle used for title checks
//! - [`CoreError`] / [`Result`] - error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use shopbench_core::{Role, Turn};
//!
//! let turn = Turn::parse(
//!     r#"<think>search first</think>
//! <tool_call>[{"name": "find_product",
//!   "parameters": {"q": "red shoes", "page": 1}}]</tool_call>"#,
//!     None,
//! );
//! assert_eq!(turn.tool_calls[0].name, "find_product");
//! assert!(turn.render(&Role::OUTPUT).starts_with("<think>"));
//! ```

pub mod error;
pub mod product;
pub mod similarity;
pub mod tool;
pub mod trajectory;
pub mod turn;

pub use error::{CoreError, Result};
pub use product::{InMemoryCatalog, Product, ProductCatalog};
pub use similarity::{LexicalSimilarity, TextSimilarity};
pub use tool::{
    FindProductParams, PriceFilter, ServiceFilter, SortOrder, TerminateStatus, ToolInvocation,
    ToolSpec, WebSearchParams, split_product_ids, tool_specs,
};
pub use trajectory::{RejectedCall, Trajectory};
pub use turn::{Observation, Role, TOOL_CALL_ID_LEN, ToolCall, Turn, extract_block, tool_call_id};
