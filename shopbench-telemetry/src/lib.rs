//! # shopbench-telemetry
//!
//! Structured logging for evaluation runs.
//!
//! ## Usage
//!
//! ```rust
//! use shopbench_telemetry::{evaluation_span, info, init_telemetry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_telemetry("reward-eval")?;
//!
//!     let span = evaluation_span("red nike shoes", "product");
//!     let _enter = span.enter();
//!     info!("scoring started");
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Span, debug, error, info, instrument, trace, warn};

pub use init::{init_json_telemetry, init_telemetry};
pub use spans::*;
