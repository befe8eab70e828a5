//! Turn format validation
//!
//! Checks that tagged agent output obeys the turn protocol: required blocks
//! are present, every block appears exactly once with its tags in order,
//! blocks do not nest or interleave, and a tool-call block holds a JSON
//! array of `{name, parameters}` records.

use serde_json::Value;
use shopbench_core::Role;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Why a block of text failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatViolation {
    #[error("reasoning block is required but missing")]
    MissingReasoning,

    #[error("neither a tool call nor a response is present")]
    NoAction,

    #[error("`{0}` has unmatched open/close tags")]
    Unbalanced(Role),

    #[error("`{0}` appears more than once")]
    Duplicated(Role),

    #[error("`{0}` closes before it opens")]
    Misordered(Role),

    #[error("tool call block is invalid: {0}")]
    InvalidToolCall(String),

    #[error("`{inner}` overlaps `{outer}`")]
    Overlap { outer: Role, inner: Role },
}

/// Byte offsets of one block's tags
#[derive(Debug, Clone)]
struct TagPositions {
    starts: Vec<usize>,
    ends: Vec<usize>,
}

fn locate(text: &str, role: Role) -> TagPositions {
    TagPositions {
        starts: text.match_indices(&role.open_tag()).map(|(i, _)| i).collect(),
        ends: text.match_indices(&role.close_tag()).map(|(i, _)| i).collect(),
    }
}

/// Whether `text` contains both tags of `role`
pub fn has_block(text: &str, role: Role) -> bool {
    text.contains(&role.open_tag()) && text.contains(&role.close_tag())
}

fn check_tool_call_json(content: &str) -> Result<(), FormatViolation> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| FormatViolation::InvalidToolCall(format!("not JSON: {}", e)))?;
    let Value::Array(entries) = value else {
        return Err(FormatViolation::InvalidToolCall("not a JSON array".to_string()));
    };
    for (i, entry) in entries.iter().enumerate() {
        let name_ok = entry.get("name").is_some_and(Value::is_string);
        let params_ok = entry.get("parameters").is_some_and(Value::is_object);
        if !name_ok || !params_ok {
            return Err(FormatViolation::InvalidToolCall(format!(
                "entry {} needs a string `name` and an object `parameters`",
                i
            )));
        }
    }
    Ok(())
}

/// Check `text` against the protocol for the required `roles`
///
/// Only tags of the listed roles are considered; other tags are ignored.
pub fn check(text: &str, roles: &[Role]) -> Result<(), FormatViolation> {
    let mut present: BTreeMap<Role, TagPositions> = BTreeMap::new();
    for &role in roles {
        let positions = locate(text, role);
        if !positions.starts.is_empty() || !positions.ends.is_empty() {
            present.insert(role, positions);
        }
    }

    if roles.contains(&Role::Think) && !present.contains_key(&Role::Think) {
        return Err(FormatViolation::MissingReasoning);
    }
    if !present.contains_key(&Role::ToolCall) && !present.contains_key(&Role::Response) {
        return Err(FormatViolation::NoAction);
    }

    // (role, start, end) once every present block is known to be a single pair
    let mut spans: Vec<(Role, usize, usize)> = Vec::with_capacity(present.len());
    for (&role, positions) in &present {
        if positions.starts.len() != positions.ends.len() {
            return Err(FormatViolation::Unbalanced(role));
        }
        if positions.starts.len() != 1 {
            return Err(FormatViolation::Duplicated(role));
        }
        let (start, end) = (positions.starts[0], positions.ends[0]);
        if start >= end {
            return Err(FormatViolation::Misordered(role));
        }
        spans.push((role, start, end));
    }

    if let Some(&(role, start, end)) = spans.iter().find(|(role, _, _)| *role == Role::ToolCall) {
        let content = &text[start + role.open_tag().len()..end];
        check_tool_call_json(content)?;
    }

    for &(outer, outer_start, outer_end) in &spans {
        for &(inner, inner_start, inner_end) in &spans {
            if outer == inner {
                continue;
            }
            let inside = |offset: usize| outer_start < offset && offset < outer_end;
            if inside(inner_start) || inside(inner_end) {
                return Err(FormatViolation::Overlap { outer, inner });
            }
        }
    }

    Ok(())
}

/// Validity predicate for a turn's tagged text
///
/// Never fails: malformed input is simply invalid.
pub fn validate(text: &str, roles: &[Role]) -> bool {
    match check(text, roles) {
        Ok(()) => true,
        Err(violation) => {
            debug!(%violation, "format check failed");
            false
        }
    }
}

/// Roles an answer expects the completion to reproduce
///
/// A ground truth consisting of a bare tool call (no reasoning, no response)
/// only requires the tool-call block; anything else requires the full
/// output protocol.
pub fn roles_for_answer(answer: &str) -> &'static [Role] {
    static TOOL_CALL_ONLY: [Role; 1] = [Role::ToolCall];
    if has_block(answer, Role::ToolCall)
        && !has_block(answer, Role::Think)
        && !has_block(answer, Role::Response)
    {
        &TOOL_CALL_ONLY
    } else {
        &Role::OUTPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL: &str = r#"<tool_call>[{"name": "find_product",
"parameters": {"q": "shoes", "page": 1}}]</tool_call>"#;

    #[test]
    fn test_valid_think_and_tool_call() {
        let text = format!("<think>look for shoes</think>\n{}", TOOL);
        assert!(validate(&text, &Role::OUTPUT));
    }

    #[test]
    fn test_missing_reasoning() {
        assert_eq!(check(TOOL, &Role::OUTPUT), Err(FormatViolation::MissingReasoning));
        assert!(validate(TOOL, &[Role::ToolCall]));
    }

    #[test]
    fn test_no_action() {
        assert_eq!(check("<think>hmm</think>", &Role::OUTPUT), Err(FormatViolation::NoAction));
    }

    #[test]
    fn test_duplicate_and_unbalanced() {
        let text = "<think>a</think><think>b</think><response>x</response>";
        assert_eq!(check(text, &Role::OUTPUT), Err(FormatViolation::Duplicated(Role::Think)));

        let text = "<think>a<think>b</think><response>x</response>";
        assert_eq!(check(text, &Role::OUTPUT), Err(FormatViolation::Unbalanced(Role::Think)));
    }

    #[test]
    fn test_misordered_tags() {
        let text = "<think>a</think></response>oops<response>";
        assert_eq!(check(text, &Role::OUTPUT), Err(FormatViolation::Misordered(Role::Response)));
    }

    #[test]
    fn test_invalid_tool_call_json() {
        let text = r#"<think>a</think><tool_call>{"name": "x", "parameters": {}}</tool_call>"#;
        assert!(matches!(check(text, &Role::OUTPUT), Err(FormatViolation::InvalidToolCall(_))));

        let text = r#"<think>a</think><tool_call>[{"name": "x", "parameters": []}]</tool_call>"#;
        assert!(!validate(text, &Role::OUTPUT));

        let text = r#"<think>a</think><tool_call>[{"name": 3, "parameters": {}}]</tool_call>"#;
        assert!(!validate(text, &Role::OUTPUT));

        let text = "<think>a</think><tool_call>[]</tool_call>";
        assert!(validate(text, &Role::OUTPUT));
    }

    #[test]
    fn test_nested_blocks_rejected() {
        let text = "<think>a <response>b</response> c</think>";
        assert!(matches!(check(text, &Role::OUTPUT), Err(FormatViolation::Overlap { .. })));

        let text = "<think>a <response>b</think> c</response>";
        assert!(!validate(text, &Role::OUTPUT));
    }

    #[test]
    fn test_unlisted_roles_are_ignored() {
        let text = "<think>a</think><response>b</response><obs>x";
        assert!(validate(text, &Role::OUTPUT));
        assert!(!validate(text, &[Role::Think, Role::Obs, Role::Response]));
    }

    #[test]
    fn test_roles_for_answer() {
        assert_eq!(roles_for_answer(TOOL), &[Role::ToolCall]);
        assert_eq!(roles_for_answer("<think>x</think><response>y</response>"), &Role::OUTPUT);
    }
}
