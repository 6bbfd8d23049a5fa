//! Engine error taxonomy
//!
//! Only request-level problems (unknown tool, unsupported mode) and scratch
//! storage failures surface as errors. Everything that goes wrong *inside* a
//! diagnostic is reported through `ExecutionResult::exit_status` instead.

use crate::registry::Mode;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Mode '{mode}' is not available for tool '{tool_id}'")]
    ModeUnavailable { tool_id: String, mode: Mode },

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn artifact(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Artifact(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EngineError::NotFound("unknown_tool".into()).to_string(),
            "Tool 'unknown_tool' not found"
        );
        let err = EngineError::ModeUnavailable {
            tool_id: "network_diagnostics".into(),
            mode: Mode::External,
        };
        assert_eq!(
            err.to_string(),
            "Mode 'external' is not available for tool 'network_diagnostics'"
        );
    }

    #[test]
    fn test_artifact_helper() {
        let err = EngineError::artifact("create dir", "disk full");
        assert_eq!(err.to_string(), "Artifact error: create dir: disk full");
    }
}
