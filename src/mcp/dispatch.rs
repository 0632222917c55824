//! Frame parsing and request routing.
//!
//! [`Dispatcher::dispatch`] turns exactly one inbound text frame into exactly
//! one [`ServerMessage`]. Failures never escape: decode problems, handler
//! errors and panics all become `error` messages correlated by `request_id`.

use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use super::catalog::{Catalog, FixtureDocument};
use super::error::{FixtureError, McpError};
use super::protocol::{ClientRequest, ErrorCode, ServerMessage};
use super::registry::{ToolContext, ToolRegistry};
use super::results::ResultStore;
use super::session::Session;
use super::tools;

/// A decoded request together with its correlation id
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub request_id: Option<Value>,
    pub request: ClientRequest,
}

/// Decode one text frame. On failure the `request_id` is returned alongside
/// the error whenever it could be read.
pub fn parse_frame(frame: &str) -> Result<Envelope, (Option<Value>, McpError)> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| (None, McpError::Malformed(format!("invalid JSON: {}", e))))?;

    let Value::Object(mut object) = value else {
        return Err((
            None,
            McpError::Malformed("message must be a JSON object".to_string()),
        ));
    };

    let request_id = object.remove("request_id").filter(|id| !id.is_null());

    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => {
            return Err((
                request_id,
                McpError::Malformed("`type` must be a string".to_string()),
            ))
        }
        None => {
            return Err((
                request_id,
                McpError::Malformed("missing `type` field".to_string()),
            ))
        }
    };

    if !ClientRequest::is_known_type(&kind) {
        return Err((request_id, McpError::UnknownType(kind)));
    }

    match serde_json::from_value::<ClientRequest>(Value::Object(object)) {
        Ok(request) => Ok(Envelope {
            request_id,
            request,
        }),
        Err(e) => Err((
            request_id,
            McpError::Malformed(format!("invalid `{}` message: {}", kind, e)),
        )),
    }
}

/// Routes requests to the catalogs and the tool executor
pub struct Dispatcher {
    catalog: Catalog,
    tools: ToolRegistry,
    results: Arc<ResultStore>,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        catalog: Catalog,
        tools: ToolRegistry,
        results: Arc<ResultStore>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            tools,
            results,
            handler_timeout,
        }
    }

    pub fn from_fixture(
        fixture: &FixtureDocument,
        results: Arc<ResultStore>,
        handler_timeout: Duration,
    ) -> Result<Self, FixtureError> {
        Ok(Self::new(
            Catalog::from_fixture(fixture)?,
            tools::registry_from_fixture(fixture)?,
            results,
            handler_timeout,
        ))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Handle one text frame and log every step to the session trail
    pub async fn dispatch(&self, frame: &str, session: &Arc<Session>) -> ServerMessage {
        let log = session.log();
        log.append("message_received", json!({ "raw": frame }));

        let response = match parse_frame(frame) {
            Ok(Envelope {
                request_id,
                request,
            }) => {
                log.append(
                    "dispatch",
                    json!({ "type": request.kind(), "request_id": request_id }),
                );
                let routed = AssertUnwindSafe(self.route(request, request_id.clone(), session))
                    .catch_unwind()
                    .await;
                match routed {
                    Ok(Ok(message)) => message,
                    Ok(Err(err)) => error_message(request_id, &err),
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        tracing::error!(session_id = %session.id, reason = %reason, "Handler panicked");
                        error_message(request_id, &McpError::Internal(reason))
                    }
                }
            }
            Err((request_id, err)) => error_message(request_id, &err),
        };

        self.log_response(session, &response);
        response
    }

    /// Binary frames are not part of the protocol
    pub fn reject_binary(&self, session: &Session, len: usize) -> ServerMessage {
        session
            .log()
            .append("message_received", json!({ "binary_bytes": len }));
        let response = error_message(
            None,
            &McpError::Malformed("binary frames are not supported".to_string()),
        );
        self.log_response(session, &response);
        response
    }

    fn log_response(&self, session: &Session, response: &ServerMessage) {
        match response {
            ServerMessage::Error {
                request_id,
                code,
                message,
            } => session.log().append(
                "error_sent",
                json!({ "code": code, "message": message, "request_id": request_id }),
            ),
            other => session.log().append(
                "response_sent",
                json!({ "type": other.kind(), "request_id": other.request_id() }),
            ),
        }
    }

    async fn route(
        &self,
        request: ClientRequest,
        request_id: Option<Value>,
        session: &Arc<Session>,
    ) -> Result<ServerMessage, McpError> {
        match request {
            ClientRequest::ListResources => Ok(ServerMessage::ResourcesList {
                request_id,
                resources: self.catalog.list_resources(),
            }),
            ClientRequest::ListTools => Ok(ServerMessage::ToolsList {
                request_id,
                tools: self.tools.list_tools(),
            }),
            ClientRequest::ListPrompts => Ok(ServerMessage::PromptsList {
                request_id,
                prompts: self.catalog.list_prompts(),
            }),
            ClientRequest::FetchResource { resource_id } => {
                let resource = self.catalog.fetch_resource(&resource_id)?;
                Ok(ServerMessage::ResourceContent {
                    request_id,
                    resource_id: resource.id.clone(),
                    name: resource.name.clone(),
                    content: resource.content.clone(),
                })
            }
            ClientRequest::RenderPrompt {
                prompt_id,
                parameters,
            } => {
                let content = self.catalog.render_prompt(&prompt_id, &parameters)?;
                Ok(ServerMessage::PromptContent {
                    request_id,
                    prompt_id,
                    content,
                })
            }
            ClientRequest::ExecuteTool {
                tool_id,
                parameters,
            } => {
                let context =
                    ToolContext::new(session.clone(), self.results.clone(), self.handler_timeout);
                let span = tracing::info_span!(
                    "tool_call",
                    tool_id = %tool_id,
                    session_id = %session.id
                );
                let result = self
                    .tools
                    .execute(&tool_id, parameters, &context)
                    .instrument(span)
                    .await?;
                Ok(ServerMessage::ToolResult {
                    request_id,
                    tool_id,
                    result,
                })
            }
        }
    }
}

fn error_message(request_id: Option<Value>, err: &McpError) -> ServerMessage {
    let code = err.code();
    if code == ErrorCode::InternalServerError {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(code = %code, error = %err, "Request rejected");
    }
    ServerMessage::error(request_id, code, err.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
