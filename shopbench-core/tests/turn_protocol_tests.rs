//! Property-based tests for the turn protocol.
//!
//! Parsing must never panic on arbitrary agent output, and rendering a
//! parsed turn must keep every block it read.

use proptest::prelude::*;
use serde_json::json;
use shopbench_core::{Role, ToolCall, ToolInvocation, Trajectory, Turn, tool_call_id};

// ============================================================================
// Generators
// ============================================================================

/// Block text without angle brackets, so it can never contain a tag
fn arb_block_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .,!?]{1,80}".prop_filter("non-blank", |s| !s.trim().is_empty())
}

fn arb_tool_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("find_product".to_string()),
        Just("view_product_information".to_string()),
        Just("recommend_product".to_string()),
        Just("terminate".to_string()),
    ]
}

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    (arb_tool_name(), "[a-z ]{0,20}", 1i64..=5).prop_map(|(name, q, page)| {
        ToolCall::new(&name).with_parameters(json!({"q": q, "page": page}))
    })
}

fn arb_turn() -> impl Strategy<Value = Turn> {
    (
        prop::option::of(arb_block_text()),
        prop::collection::vec(arb_tool_call(), 0..4),
        prop::option::of(arb_block_text()),
    )
        .prop_map(|(reasoning, tool_calls, response)| Turn {
            reasoning: reasoning.map(|s| s.trim().to_string()).unwrap_or_default(),
            tool_calls,
            response: response.map(|s| s.trim().to_string()).unwrap_or_default(),
            ..Default::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Arbitrary text parses without panicking
    #[test]
    fn prop_parse_never_panics(text in ".{0,300}", hint in prop::option::of(".{0,50}")) {
        let _ = Turn::parse(&text, hint.as_deref());
    }

    /// render then parse yields the same output blocks
    #[test]
    fn prop_render_parse_preserves_blocks(turn in arb_turn()) {
        let parsed = Turn::parse(&turn.render(&Role::OUTPUT), None);
        prop_assert_eq!(&parsed.reasoning, &turn.reasoning);
        prop_assert_eq!(&parsed.tool_calls, &turn.tool_calls);
        prop_assert_eq!(&parsed.response, &turn.response);
    }

    /// Ids depend only on name and parameters
    #[test]
    fn prop_tool_call_ids_are_deterministic(call in arb_tool_call()) {
        let parameters = serde_json::Value::Object(call.parameters.clone());
        let again = ToolCall::new(&call.name).with_parameters(parameters);
        prop_assert_eq!(&call.id, &again.id);
        prop_assert_eq!(call.id.clone(), tool_call_id(&call.name, &call.parameters));
    }
}

#[test]
fn test_reasoning_hint_fills_missing_think() {
    let text = r#"<tool_call>[{"name": "terminate",
"parameters": {"status": "success"}}]</tool_call>"#;
    let turn = Turn::parse(text, Some("<think> all done </think>"));
    assert_eq!(turn.reasoning, "all done");
    assert_eq!(turn.tool_calls.len(), 1);
}

#[test]
fn test_unparseable_tool_call_yields_no_calls() {
    let turn = Turn::parse("<think>x</think><tool_call>[{\"name\": 1}]</tool_call>", None);
    assert_eq!(turn.reasoning, "x");
    assert!(turn.tool_calls.is_empty());
}

#[test]
fn test_trajectory_round_trip_through_message_dicts() {
    let json = json!({
        "query": "cheap red shoes",
        "turns": [
            {
                "think": "search",
                "tool_call": [
                    {"name": "find_product", "parameters": {"q": "red shoes", "page": 1}}
                ],
                "obs": [{"tool_call_id": "abc", "content": [{"product_id": "1"}]}]
            },
            {
                "think": "done",
                "tool_call": [
                    {"name": "recommend_product", "parameters": {"product_ids": "1"}},
                    {"name": "terminate", "parameters": {"status": "success"}}
                ],
                "response": "Here you go"
            }
        ]
    });
    let trajectory: Trajectory = serde_json::from_value(json).unwrap();
    assert_eq!(trajectory.len(), 2);
    assert_eq!(trajectory.recommended_products(), vec!["1"]);
    assert!(trajectory.ends_with_terminate());

    let invocations: Vec<ToolInvocation> = trajectory.turns[1]
        .tool_calls
        .iter()
        .map(|call| ToolInvocation::try_from(call).unwrap())
        .collect();
    assert!(invocations[1].is_terminal());
}

#[test]
fn test_unknown_tool_is_rejected() {
    let call = ToolCall::new("python_execute").with_parameters(json!({"code": "1+1"}));
    assert!(ToolInvocation::try_from(&call).is_err());
}
