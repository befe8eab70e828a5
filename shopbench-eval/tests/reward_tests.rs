//! Tests for step-level reward computation.

use proptest::prelude::*;
use shopbench_eval::{
    Envelope, LengthTarget, MatchMode, RewardAggregator, RewardConfig, RewardModel, Schedule,
};

const ANSWER: &str = r#"<think>look for red shoes</think>
<tool_call>[{"name": "find_product", "parameters": {"q": "red shoes", "page": 1}}]</tool_call>"#;

const PARTIAL: &str = r#"<think>look for shoes</think>
<tool_call>[{"name": "find_product", "parameters": {"q": "shoes", "page": 2}}]</tool_call>"#;

#[test]
fn test_partial_completion_sits_between_bounds() {
    let model = RewardModel::default();
    let exact = model.score_completion(ANSWER, ANSWER, 0).unwrap();
    let partial = model.score_completion(PARTIAL, ANSWER, 0).unwrap();

    assert_eq!(partial.format, 1.0);
    assert!(partial.correctness > -3.0);
    assert!(partial.correctness < exact.correctness);
    assert!(partial.total < exact.total);
}

#[test]
fn test_unit_correctness() {
    let model = RewardModel::new(RewardConfig::default().with_unit_correctness());
    let breakdown = model.score_completion(ANSWER, ANSWER, 0).unwrap();
    assert_eq!(breakdown.correctness, 1.0);
    assert_eq!(breakdown.total, 2.0);
}

#[test]
fn test_coarse_matcher_gives_minimum_to_near_misses() {
    let model = RewardModel::new(RewardConfig::default().with_matcher(MatchMode::Coarse));
    let breakdown = model.score_completion(PARTIAL, ANSWER, 0).unwrap();
    assert_eq!(breakdown.correctness, -3.0);
}

#[test]
fn test_scheduled_envelopes_move_with_step() {
    let model = RewardModel::new(RewardConfig::default().with_scheduled_envelopes());

    let early = model.score_completion(ANSWER, ANSWER, 0).unwrap();
    assert_eq!(early.format, 2.0);
    assert_eq!(early.correctness, 2.0);

    let late = model.score_completion(ANSWER, ANSWER, 150).unwrap();
    assert_eq!(late.format, 1.0);
    assert_eq!(late.correctness, 3.0);
}

#[test]
fn test_missing_reasoning_gets_length_minimum() {
    let config = RewardConfig::default().with_length(LengthTarget::scheduled());
    let model = RewardModel::new(config);
    let completion = ANSWER.trim_start_matches("<think>look for red shoes</think>\n");
    let breakdown = model.score_completion(completion, ANSWER, 0).unwrap();
    assert_eq!(breakdown.length, 0.0);
    assert_eq!(breakdown.format, 0.0);
    // the right call does not rescue a malformed turn
    assert_eq!(breakdown.correctness, -3.0);
}

#[test]
fn test_format_failure_gates_correctness_at_every_step() {
    let model = RewardModel::new(RewardConfig::default().with_scheduled_envelopes());
    let completion = r#"<think>look for red shoes</think>
<tool_call>{"name": "find_product", "parameters": {"q": "red shoes", "page": 1}}</tool_call>"#;

    for step in [0, 75, 150] {
        let breakdown = model.score_completion(completion, ANSWER, step).unwrap();
        let floor = model.config().correctness.envelope_at(step).min;
        assert_eq!(breakdown.correctness, floor);
        assert_eq!(breakdown.format, model.config().format.envelope_at(step).min);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Identical inputs reproduce identical rewards
    #[test]
    fn prop_aggregate_is_pure(
        format_ok in any::<bool>(),
        matched in -10.0f64..10.0,
        length in -1.0f64..2.0,
        step in 0u64..400,
    ) {
        let config = RewardConfig::default()
            .with_length(LengthTarget::default())
            .with_scheduled_envelopes();
        let aggregator = RewardAggregator::new(config.clone());
        let first = aggregator.aggregate(format_ok, matched, length, step);
        let second = RewardAggregator::new(config).aggregate(format_ok, matched, length, step);
        prop_assert_eq!(first, second);

        let correctness = Schedule::widening().apply(Envelope::new(-3.0, 3.0), step);
        prop_assert!(first.correctness >= correctness.min && first.correctness <= correctness.max);
        prop_assert!((0.0..=1.0).contains(&first.length));
    }
}
