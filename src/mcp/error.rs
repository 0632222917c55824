use std::time::Duration;

use super::protocol::ErrorCode;

/// Request-level failure. Every variant is recoverable: the connection stays
/// open and the failure is reported to the client as an `error` message.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),
    #[error("Missing required parameter(s): {}", .0.join(", "))]
    MissingParameters(Vec<String>),
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::MalformedMessage,
            Self::UnknownType(_) => ErrorCode::UnknownMessageType,
            Self::ResourceNotFound(_) => ErrorCode::ResourceNotFound,
            Self::ToolNotFound(_) => ErrorCode::ToolNotFound,
            Self::PromptNotFound(_) => ErrorCode::PromptNotFound,
            Self::MissingParameters(_) => ErrorCode::MissingRequiredParameter,
            Self::ToolExecution(_) => ErrorCode::ToolExecutionError,
            Self::Internal(_) => ErrorCode::InternalServerError,
        }
    }
}

/// Failure raised from inside a tool body
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing required parameter(s): {}", .0.join(", "))]
    MissingParameters(Vec<String>),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("Invocation cancelled")]
    Cancelled,
    #[error("Failed to persist result: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::MissingParameters(names) => Self::MissingParameters(names),
            ToolError::Internal(msg) => Self::Internal(msg),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}

/// Handshake failure. Unlike [`McpError`] it is fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("bearer token is missing")]
    MissingToken,
    #[error("bearer token is invalid")]
    InvalidToken,
}

/// Problems with the fixture document, detected at startup
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
    #[error("fixture enables unknown tool `{0}`")]
    UnknownTool(String),
    #[error("copilot scenario `{scenario}` has no turn for step {step}")]
    ScenarioGap { scenario: String, step: usize },
}
