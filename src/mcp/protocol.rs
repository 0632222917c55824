use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol versions advertised in `session_init`.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Wire error codes carried by `error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedMessage,
    UnknownMessageType,
    ResourceNotFound,
    ToolNotFound,
    PromptNotFound,
    MissingRequiredParameter,
    ToolExecutionError,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedMessage => "malformed_message",
            Self::UnknownMessageType => "unknown_message_type",
            Self::ResourceNotFound => "resource_not_found",
            Self::ToolNotFound => "tool_not_found",
            Self::PromptNotFound => "prompt_not_found",
            Self::MissingRequiredParameter => "missing_required_parameter",
            Self::ToolExecutionError => "tool_execution_error",
            Self::InternalServerError => "internal_server_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client request, discriminated by the `type` field.
///
/// `request_id` is not part of the variants: it is lifted out of the raw
/// envelope before the body is decoded so that it survives decode failures.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    ListResources,
    ListTools,
    ListPrompts,
    ExecuteTool {
        tool_id: String,
        #[serde(default)]
        parameters: Value,
    },
    FetchResource {
        resource_id: String,
    },
    RenderPrompt {
        prompt_id: String,
        #[serde(default)]
        parameters: Value,
    },
}

impl ClientRequest {
    /// Every `type` value a client may send
    pub const TYPES: &'static [&'static str] = &[
        "list_resources",
        "list_tools",
        "list_prompts",
        "execute_tool",
        "fetch_resource",
        "render_prompt",
    ];

    pub fn is_known_type(kind: &str) -> bool {
        Self::TYPES.contains(&kind)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListResources => "list_resources",
            Self::ListTools => "list_tools",
            Self::ListPrompts => "list_prompts",
            Self::ExecuteTool { .. } => "execute_tool",
            Self::FetchResource { .. } => "fetch_resource",
            Self::RenderPrompt { .. } => "render_prompt",
        }
    }
}

/// Static server metadata sent with `session_init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
}

/// Resource listing entry. Content is only ever sent by `resource_content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Tool listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON Schema for the `parameters` object
    pub parameters: Value,
}

/// Prompt listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Placeholder names found in the template, in first-seen order
    pub parameters: Vec<String>,
}

/// Server message, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionInit {
        session_id: String,
        supported_versions: Vec<String>,
        server_info: ServerInfo,
    },
    ResourcesList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        resources: Vec<ResourceSummary>,
    },
    ToolsList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        tools: Vec<ToolDescriptor>,
    },
    PromptsList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        prompts: Vec<PromptSummary>,
    },
    ResourceContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        resource_id: String,
        name: String,
        content: Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        tool_id: String,
        result: Value,
    },
    PromptContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        prompt_id: String,
        content: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(request_id: Option<Value>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            request_id,
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionInit { .. } => "session_init",
            Self::ResourcesList { .. } => "resources_list",
            Self::ToolsList { .. } => "tools_list",
            Self::PromptsList { .. } => "prompts_list",
            Self::ResourceContent { .. } => "resource_content",
            Self::ToolResult { .. } => "tool_result",
            Self::PromptContent { .. } => "prompt_content",
            Self::Error { .. } => "error",
        }
    }

    pub fn request_id(&self) -> Option<&Value> {
        match self {
            Self::SessionInit { .. } => None,
            Self::ResourcesList { request_id, .. }
            | Self::ToolsList { request_id, .. }
            | Self::PromptsList { request_id, .. }
            | Self::ResourceContent { request_id, .. }
            | Self::ToolResult { request_id, .. }
            | Self::PromptContent { request_id, .. }
            | Self::Error { request_id, .. } => request_id.as_ref(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}
