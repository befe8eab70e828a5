#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool}: {message}")]
    InvalidParameters { tool: String, message: String },

    #[error("Observation mismatch: {tool_calls} tool calls but {observations} observations")]
    ObservationMismatch { tool_calls: usize, observations: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid(tool: &str, message: impl Into<String>) -> Self {
        CoreError::InvalidParameters { tool: tool.to_string(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
