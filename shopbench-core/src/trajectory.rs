//! Trajectories: the ordered turns an agent produced for one query

use serde::{Deserialize, Serialize};

use crate::tool::{RECOMMEND_PRODUCT, ToolInvocation};
use crate::turn::Turn;

/// A tool call that does not fit the closed tool set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedCall {
    /// Index of the turn that made the call
    pub turn: usize,
    /// Tool name as emitted
    pub tool: String,
    pub reason: String,
}

/// All turns produced for one query, in order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Query the agent was answering
    #[serde(default)]
    pub query: String,
    /// Turns in generation order
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Trajectory {
    pub fn new(query: &str, turns: Vec<Turn>) -> Self {
        Self { query: query.to_string(), turns }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Index of the turn that ends the dialogue
    ///
    /// That is the first turn with a well-formed `terminate` call, or the
    /// first no-op turn.
    pub fn terminal_index(&self) -> Option<usize> {
        self.turns.iter().position(|turn| turn.terminates() || turn.is_noop())
    }

    /// Whether the dialogue reached a terminal turn, explicit or implicit
    pub fn is_terminated(&self) -> bool {
        self.terminal_index().is_some()
    }

    /// Whether the final turn explicitly calls `terminate`
    pub fn ends_with_terminate(&self) -> bool {
        self.turns.last().is_some_and(Turn::terminates)
    }

    /// Ids passed to the last `recommend_product` call, trimmed
    ///
    /// Returns `None` when nothing was recommended or the last recommendation
    /// does not convert, e.g. because `product_ids` is not a string.
    pub fn recommended_product_ids(&self) -> Option<Vec<String>> {
        let last = self
            .turns
            .iter()
            .flat_map(|turn| &turn.tool_calls)
            .rfind(|call| call.name == RECOMMEND_PRODUCT)?;
        match ToolInvocation::try_from(last) {
            Ok(ToolInvocation::RecommendProduct { product_ids }) => Some(product_ids),
            _ => None,
        }
    }

    /// Recommended ids by position
    ///
    /// A missing recommendation yields one empty id, so positional lookups
    /// simply miss.
    pub fn recommended_products(&self) -> Vec<String> {
        self.recommended_product_ids().unwrap_or_else(|| vec![String::new()])
    }

    /// Every tool call, in order, that is unknown or ill-typed
    pub fn rejected_calls(&self) -> Vec<RejectedCall> {
        self.turns
            .iter()
            .enumerate()
            .flat_map(|(index, turn)| {
                turn.tool_calls.iter().filter_map(move |call| {
                    ToolInvocation::try_from(call).err().map(|err| RejectedCall {
                        turn: index,
                        tool: call.name.clone(),
                        reason: err.to_string(),
                    })
                })
            })
            .collect()
    }

    /// Concatenated final responses of every turn
    pub fn responses(&self) -> String {
        self.turns.iter().map(|turn| turn.response.as_str()).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::TERMINATE;
    use crate::turn::ToolCall;
    use serde_json::json;

    fn tool_turn(name: &str, parameters: serde_json::Value) -> Turn {
        Turn {
            reasoning: "step".to_string(),
            tool_calls: vec![ToolCall::new(name).with_parameters(parameters)],
            ..Default::default()
        }
    }

    #[test]
    fn test_last_recommendation_wins() {
        let trajectory = Trajectory::new("shoes", vec![
            tool_turn("find_product", json!({"q": "shoes", "page": 1})),
            tool_turn(RECOMMEND_PRODUCT, json!({"product_ids": "1,2"})),
            tool_turn(RECOMMEND_PRODUCT, json!({"product_ids": "3, 4"})),
            tool_turn(TERMINATE, json!({"status": "success"})),
        ]);

        assert_eq!(trajectory.recommended_product_ids(), Some(vec!["3".into(), "4".into()]));
        assert_eq!(trajectory.recommended_products(), vec!["3", "4"]);
        assert_eq!(trajectory.terminal_index(), Some(3));
        assert!(trajectory.ends_with_terminate());
    }

    #[test]
    fn test_non_string_recommendation() {
        let trajectory = Trajectory::new("q", vec![
            tool_turn(RECOMMEND_PRODUCT, json!({"product_ids": "1"})),
            tool_turn(RECOMMEND_PRODUCT, json!({"product_ids": [1, 2]})),
        ]);
        assert_eq!(trajectory.recommended_product_ids(), None);
        assert_eq!(trajectory.recommended_products(), vec![""]);
    }

    #[test]
    fn test_blank_recommendation_misses() {
        let trajectory =
            Trajectory::new("q", vec![tool_turn(RECOMMEND_PRODUCT, json!({"product_ids": " "}))]);
        assert_eq!(trajectory.recommended_product_ids(), None);
        assert_eq!(trajectory.recommended_products(), vec![""]);
    }

    #[test]
    fn test_ill_typed_terminate_does_not_end_dialogue() {
        let trajectory = Trajectory::new("q", vec![
            tool_turn(TERMINATE, json!({"status": "done"})),
            tool_turn("find_product", json!({"q": "bag", "page": 1})),
        ]);
        assert_eq!(trajectory.terminal_index(), None);
        assert!(!trajectory.ends_with_terminate());
    }

    #[test]
    fn test_rejected_calls() {
        let trajectory = Trajectory::new("q", vec![
            tool_turn("find_product", json!({"q": "bag", "page": 9})),
            tool_turn("python_execute", json!({"code": "1"})),
            tool_turn(TERMINATE, json!({"status": "success"})),
        ]);
        let rejected = trajectory.rejected_calls();
        assert_eq!(rejected.len(), 2);
        assert_eq!((rejected[0].turn, rejected[0].tool.as_str()), (0, "find_product"));
        assert!(rejected[0].reason.contains("page"));
        assert_eq!(rejected[1].reason, "Unknown tool: python_execute");
    }

    #[test]
    fn test_noop_turn_terminates() {
        let trajectory = Trajectory::new("q", vec![
            tool_turn("find_product", json!({"q": "bag", "page": 1})),
            Turn::default(),
        ]);
        assert_eq!(trajectory.terminal_index(), Some(1));
        assert!(trajectory.is_terminated());
        assert!(!trajectory.ends_with_terminate());
        assert!(!Trajectory::default().is_terminated());
    }
}
