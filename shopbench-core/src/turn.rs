//! Turn protocol model
//!
//! A turn is the unit an agent emits per step: optional reasoning, a list of
//! tool calls, the observations returned for those calls, and an optional
//! final response. On the wire each block is wrapped in a tag pair such as
//! `<think>...</think>`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::tool::ToolInvocation;

/// Length of the content-derived tool call id
pub const TOOL_CALL_ID_LEN: usize = 8;

/// A tagged block of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Think,
    ToolCall,
    Obs,
    Response,
}

impl Role {
    /// Blocks an agent is allowed to produce
    pub const OUTPUT: [Role; 3] = [Role::Think, Role::ToolCall, Role::Response];

    /// Blocks stored on an assistant turn, observations included
    pub const ASSISTANT: [Role; 4] = [Role::Think, Role::ToolCall, Role::Obs, Role::Response];

    /// Every block, in canonical render order
    pub const ALL: [Role; 5] = [Role::User, Role::Think, Role::ToolCall, Role::Obs, Role::Response];

    /// Tag name used on the wire
    pub fn tag(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Think => "think",
            Role::ToolCall => "tool_call",
            Role::Obs => "obs",
            Role::Response => "response",
        }
    }

    /// Opening tag, e.g. `<think>`
    pub fn open_tag(self) -> String {
        format!("<{}>", self.tag())
    }

    /// Closing tag, e.g. `</think>`
    pub fn close_tag(self) -> String {
        format!("</{}>", self.tag())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.tag() == s)
            .ok_or_else(|| CoreError::Protocol(format!("unknown role `{}`", s)))
    }
}

/// Compute the short content-derived id of a tool call
///
/// The id only correlates a call with its observation. Parameters are hashed
/// in canonical (sorted-key) JSON form, so the id does not depend on the
/// order keys were written in.
pub fn tool_call_id(name: &str, parameters: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update(Value::Object(parameters.clone()).to_string().as_bytes());
    let digest = hasher.finalize();

    URL_SAFE_NO_PAD
        .encode(digest)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(TOOL_CALL_ID_LEN)
        .collect()
}

/// A single tool invocation as emitted by the agent
///
/// Equality ignores `id`: two calls are the same call when name and
/// parameters agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Loosely typed parameters exactly as emitted
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Content-derived id used to pair the call with its observation
    #[serde(default, rename = "tool_call_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
}

impl ToolCall {
    /// Create a call without parameters
    pub fn new(name: &str) -> Self {
        let parameters = Map::new();
        let id = tool_call_id(name, &parameters);
        Self { name: name.to_string(), parameters, id }
    }

    /// Replace the parameters; non-object values leave the call without parameters
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.id = tool_call_id(&self.name, &self.parameters);
        self
    }

    /// Parse one `{name, parameters}` entry of a tool-call block
    fn from_entry(entry: &Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?;
        let parameters = entry.get("parameters")?.as_object()?.clone();
        let id = tool_call_id(name, &parameters);
        Some(Self { name: name.to_string(), parameters, id })
    }

    /// Parse the content of a `<tool_call>` block
    ///
    /// Accepts a JSON array of calls or a single call object. Any malformed
    /// entry makes the whole block parse to `None`.
    pub fn parse_block(content: &str) -> Option<Vec<ToolCall>> {
        let value: Value = serde_json::from_str(content).ok()?;
        match value {
            Value::Array(entries) => entries.iter().map(ToolCall::from_entry).collect(),
            Value::Object(_) => ToolCall::from_entry(&value).map(|call| vec![call]),
            _ => None,
        }
    }
}

impl PartialEq for ToolCall {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters == other.parameters
    }
}

/// Result returned to the agent for one tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Id of the call this observation answers
    #[serde(default)]
    pub tool_call_id: String,
    /// Raw tool output
    #[serde(default)]
    pub content: Value,
}

impl Observation {
    pub fn new(tool_call_id: &str, content: Value) -> Self {
        Self { tool_call_id: tool_call_id.to_string(), content }
    }
}

/// One step of a trajectory
///
/// Serializes to the message dictionary used by rollout files
/// (`think`, `tool_call`, `obs`, `response`); absent blocks are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, rename = "think", skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
    #[serde(default, rename = "tool_call", skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, rename = "obs", skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<Observation>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
}

fn block_regex(role: Role) -> &'static Regex {
    static THINK: OnceLock<Regex> = OnceLock::new();
    static TOOL_CALL: OnceLock<Regex> = OnceLock::new();
    static RESPONSE: OnceLock<Regex> = OnceLock::new();
    static USER: OnceLock<Regex> = OnceLock::new();
    static OBS: OnceLock<Regex> = OnceLock::new();

    let cell = match role {
        Role::Think => &THINK,
        Role::ToolCall => &TOOL_CALL,
        Role::Response => &RESPONSE,
        Role::User => &USER,
        Role::Obs => &OBS,
    };
    cell.get_or_init(|| {
        let tag = role.tag();
        Regex::new(&format!("(?s)<{tag}>(.+?)</{tag}>")).expect("Invalid regex pattern")
    })
}

/// Content of the first `<role>...</role>` pair in `text`, trimmed
pub fn extract_block<'a>(text: &'a str, role: Role) -> Option<&'a str> {
    block_regex(role).captures(text).and_then(|caps| caps.get(1)).map(|m| m.as_str().trim())
}

impl Turn {
    /// Parse agent output into a turn
    ///
    /// Only the first occurrence of each output block is read. When the text
    /// has no reasoning block, `reasoning_hint` (a separate thinking channel)
    /// is used instead, with any stray think tags removed. An unparseable
    /// tool-call block yields no tool calls; flagging it is the format
    /// validator's job.
    pub fn parse(text: &str, reasoning_hint: Option<&str>) -> Self {
        let mut turn = Turn::default();

        if let Some(reasoning) = extract_block(text, Role::Think) {
            turn.reasoning = reasoning.to_string();
        }
        if turn.reasoning.is_empty() {
            if let Some(hint) = reasoning_hint {
                turn.reasoning = hint
                    .replace(&Role::Think.open_tag(), "")
                    .replace(&Role::Think.close_tag(), "")
                    .trim()
                    .to_string();
            }
        }
        if let Some(block) = extract_block(text, Role::ToolCall) {
            turn.tool_calls = ToolCall::parse_block(block).unwrap_or_else(|| {
                debug!(block, "tool call block did not parse");
                Vec::new()
            });
        }
        if let Some(response) = extract_block(text, Role::Response) {
            turn.response = response.to_string();
        }

        turn
    }

    /// Render the selected blocks as tagged text, in the given order
    ///
    /// Empty blocks are skipped; list blocks are JSON encoded.
    pub fn render(&self, roles: &[Role]) -> String {
        roles
            .iter()
            .filter_map(|&role| self.block_content(role).map(|content| (role, content)))
            .map(|(role, content)| format!("<{tag}>{content}</{tag}>", tag = role.tag()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn block_content(&self, role: Role) -> Option<String> {
        fn text(s: &str) -> Option<String> {
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        fn list<T: Serialize>(items: &[T]) -> Option<String> {
            if items.is_empty() { None } else { serde_json::to_string(items).ok() }
        }

        match role {
            Role::User => text(&self.user),
            Role::Think => text(&self.reasoning),
            Role::ToolCall => list(&self.tool_calls),
            Role::Obs => list(&self.observations),
            Role::Response => text(&self.response),
        }
    }

    /// Attach observations, one per tool call, paired by position
    pub fn with_observations(mut self, observations: Vec<Observation>) -> Result<Self> {
        if !observations.is_empty() && observations.len() != self.tool_calls.len() {
            return Err(CoreError::ObservationMismatch {
                tool_calls: self.tool_calls.len(),
                observations: observations.len(),
            });
        }
        self.observations = observations;
        Ok(self)
    }

    /// Tool calls converted into the closed tool set, in call order
    pub fn invocations(&self) -> impl Iterator<Item = Result<ToolInvocation>> + '_ {
        self.tool_calls.iter().map(ToolInvocation::try_from)
    }

    /// Whether the turn makes a well-formed `terminate` call
    pub fn terminates(&self) -> bool {
        self.invocations().any(|invocation| invocation.is_ok_and(|i| i.is_terminal()))
    }

    /// A turn without reasoning, tool calls or response
    pub fn is_noop(&self) -> bool {
        self.reasoning.is_empty() && self.tool_calls.is_empty() && self.response.is_empty()
    }

    /// Tool calls paired with their observations, when both are present
    pub fn paired(&self) -> impl Iterator<Item = (&ToolCall, Option<&Observation>)> {
        self.tool_calls.iter().enumerate().map(|(i, call)| (call, self.observations.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_all_blocks() {
        let text = r#"<think> need shoes </think>
<tool_call>[{"name": "find_product", "parameters": {"q": "red shoes", "page": 1}}]</tool_call>
<response>Searching now.</response>"#;

        let turn = Turn::parse(text, None);
        assert_eq!(turn.reasoning, "need shoes");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "find_product");
        assert_eq!(turn.tool_calls[0].parameters["page"], json!(1));
        assert_eq!(turn.tool_calls[0].id.len(), TOOL_CALL_ID_LEN);
        assert_eq!(turn.response, "Searching now.");
        assert!(turn.observations.is_empty());
    }

    #[test]
    fn test_parse_uses_reasoning_hint() {
        let turn = Turn::parse("<response>ok</response>", Some("<think>hidden plan</think>"));
        assert_eq!(turn.reasoning, "hidden plan");

        let turn = Turn::parse("<think>visible</think><response>ok</response>", Some("hidden"));
        assert_eq!(turn.reasoning, "visible");
    }

    #[test]
    fn test_parse_bad_tool_call_is_empty() {
        let turn = Turn::parse("<think>x</think><tool_call>[{\"name\": 1}]</tool_call>", None);
        assert!(turn.tool_calls.is_empty());

        let turn = Turn::parse("<tool_call>not json</tool_call>", None);
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_single_object_tool_call() {
        let turn = Turn::parse(
            r#"<tool_call>{"name": "terminate", "parameters": {"status": "success"}}</tool_call>"#,
            None,
        );
        assert_eq!(turn.tool_calls, vec![
            ToolCall::new("terminate").with_parameters(json!({"status": "success"}))
        ]);
    }

    #[test]
    fn test_parse_first_occurrence_only() {
        let turn = Turn::parse("<response>a</response><response>b</response>", None);
        assert_eq!(turn.response, "a");
    }

    #[test]
    fn test_render_then_parse() {
        let turn = Turn {
            reasoning: "compare prices".to_string(),
            tool_calls: vec![
                ToolCall::new("recommend_product").with_parameters(json!({"product_ids": "1,2"})),
            ],
            ..Default::default()
        };

        let text = turn.render(&Role::OUTPUT);
        assert!(text.starts_with("<think>compare prices</think>\n<tool_call>"));
        assert!(!text.contains("<response>"));
        assert_eq!(Turn::parse(&text, None), turn);
    }

    #[test]
    fn test_tool_call_id_is_deterministic() {
        let a = ToolCall::new("find_product").with_parameters(json!({"q": "bag", "page": 2}));
        let b = ToolCall::new("find_product").with_parameters(json!({"page": 2, "q": "bag"}));
        let c = ToolCall::new("find_product").with_parameters(json!({"q": "bag", "page": 3}));
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_equality_ignores_id() {
        let mut a = ToolCall::new("terminate");
        a.id = "custom".to_string();
        assert_eq!(a, ToolCall::new("terminate"));
    }

    #[test]
    fn test_message_dict_serde() {
        let message = json!({
            "think": "search first",
            "tool_call": [{
                "name": "find_product",
                "parameters": {"q": "bag", "page": 1},
                "tool_call_id": "abc"
            }]
        });
        let turn: Turn = serde_json::from_value(message).unwrap();
        assert_eq!(turn.reasoning, "search first");
        assert_eq!(turn.tool_calls[0].id, "abc");
        assert!(turn.response.is_empty());

        let back = serde_json::to_value(&turn).unwrap();
        assert!(back.get("response").is_none());
        assert_eq!(back["tool_call"][0]["tool_call_id"], json!("abc"));
    }

    #[test]
    fn test_with_observations_checks_arity() {
        let turn = Turn {
            tool_calls: vec![ToolCall::new("a"), ToolCall::new("b")],
            ..Default::default()
        };
        let err = turn.clone().with_observations(vec![Observation::default()]).unwrap_err();
        assert!(matches!(err, CoreError::ObservationMismatch { tool_calls: 2, observations: 1 }));

        let turn = turn
            .with_observations(vec![
                Observation::new("x", json!("first")),
                Observation::new("y", json!("second")),
            ])
            .unwrap();
        let paired: Vec<_> = turn.paired().collect();
        assert_eq!(paired[1].1.map(|o| o.tool_call_id.as_str()), Some("y"));
    }

    #[test]
    fn test_role_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.tag().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_noop_turn() {
        assert!(Turn::default().is_noop());
        assert!(!Turn::parse("<response>hi</response>", None).is_noop());
    }

    #[test]
    fn test_terminates_needs_typed_call() {
        let turn = |status: &str| Turn {
            tool_calls: vec![ToolCall::new("terminate").with_parameters(json!({"status": status}))],
            ..Default::default()
        };
        assert!(turn("success").terminates());
        assert!(turn("failure").terminates());
        assert!(!turn("done").terminates());

        let unknown =
            Turn { tool_calls: vec![ToolCall::new("python_execute")], ..Default::default() };
        let invocations: Vec<_> = unknown.invocations().collect();
        assert!(matches!(invocations[..], [Err(CoreError::UnknownTool(_))]));
        assert!(!unknown.terminates());
    }
}
