//! Error types for the evaluation framework

use thiserror::Error;

/// Result type alias for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur during evaluation
///
/// Agent misbehavior is never an error: malformed turns and unresolvable
/// products are scored. These variants signal programming or configuration
/// mistakes and are returned to the caller.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Failed to parse an input record
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Error raised by the core types
    #[error(transparent)]
    Core(#[from] shopbench_core::CoreError),
}

impl EvalError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EvalError::ConfigError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = EvalError::config("unknown discount type `bogo`");
        assert_eq!(err.to_string(), "Invalid configuration: unknown discount type `bogo`");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: EvalError = shopbench_core::CoreError::UnknownTool("x".to_string()).into();
        assert_eq!(err.to_string(), "Unknown tool: x");
    }
}
