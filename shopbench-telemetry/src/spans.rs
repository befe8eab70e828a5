//! Span helpers for evaluation operations
//!
//! Pre-configured spans for instrumenting case scoring, turn validation,
//! catalog lookups and reward computation.

use tracing::Span;

/// Create a span for scoring one evaluation case
///
/// # Arguments
/// * `query` - The user query the trajectory answers
/// * `task` - Task kind being scored (`product`, `shop`, `voucher`, `web`)
///
/// # Example
/// ```
/// use shopbench_telemetry::evaluation_span;
/// let span = evaluation_span("red nike shoes", "product");
/// let _enter = span.enter();
/// ```
pub fn evaluation_span(query: &str, task: &str) -> Span {
    tracing::info_span!("eval.case", eval.query = query, eval.task = task)
}

/// Create a span for validating a single turn of a trajectory
pub fn turn_span(index: usize) -> Span {
    tracing::debug_span!("eval.turn", turn.index = index)
}

/// Create a span for a catalog lookup
pub fn catalog_lookup_span(product_id: &str) -> Span {
    tracing::debug_span!("catalog.lookup", product.id = product_id)
}

/// Create a span for a step-level reward computation
///
/// # Example
/// ```
/// use shopbench_telemetry::reward_span;
/// let span = reward_span(42);
/// let _enter = span.enter();
/// ```
pub fn reward_span(step: u64) -> Span {
    tracing::debug_span!("reward.compute", train.step = step)
}

/// Record the final score of the current case on the current span
pub fn record_score(metric: &str, value: f64) {
    tracing::debug!(metric = metric, value = value, "score recorded");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_can_be_entered() {
        let span = evaluation_span("query", "shop");
        let _enter = span.enter();
        let turn = turn_span(3);
        let _turn = turn.enter();
        let lookup = catalog_lookup_span("p-1");
        let _lookup = lookup.enter();
        record_score("rule", 0.5);
    }
}
