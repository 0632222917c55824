use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::mcp::error::ToolError;
use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::registry::{parse_args, ToolContext, ToolHandler};

pub const TOOL_ID: &str = "test/validate_data_access";

pub const DATA_TYPES: &[&str] = &[
    "personal",
    "financial",
    "project",
    "analytics",
    "system",
    "audit",
];

/// Data types each role may read
pub const ACCESS_MATRIX: &[(&str, &[&str])] = &[
    (
        "owner",
        &["personal", "financial", "project", "analytics", "audit"],
    ),
    (
        "admin",
        &["personal", "financial", "project", "analytics", "system", "audit"],
    ),
    ("co-pilot", &["personal", "project", "analytics"]),
    ("pilot", &["project", "analytics"]),
    ("manager", &["financial", "project", "analytics"]),
    ("reviewer", &["project", "audit"]),
    ("guest", &[]),
];

pub fn granted_types(role: &str) -> Option<&'static [&'static str]> {
    ACCESS_MATRIX
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, types)| *types)
}

/// Decide access for one role/data-type pair with a human-readable reason
pub fn decide(role: &str, data_type: &str) -> (bool, String) {
    match granted_types(role) {
        None => (false, format!("Role `{}` is not recognised", role)),
        Some(types) if types.contains(&data_type) => (
            true,
            format!("Role `{}` may access {} data", role, data_type),
        ),
        Some(_) => (
            false,
            format!("Role `{}` may not access {} data", role, data_type),
        ),
    }
}

/// Check a role against the fixed role × data-type access matrix
pub struct ValidateDataAccessTool;

#[async_trait]
impl ToolHandler for ValidateDataAccessTool {
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            data_type: String,
            access_context: Map<String, Value>,
            #[serde(default)]
            expected_access: Option<bool>,
        }

        let params: Args = parse_args(args)?;
        if !DATA_TYPES.contains(&params.data_type.as_str()) {
            return Err(ToolError::NotFound {
                entity: "data type",
                id: params.data_type,
            });
        }

        let role = match params.access_context.get("role") {
            Some(Value::String(role)) if !role.trim().is_empty() => role.trim().to_string(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(ToolError::MissingParameters(vec![
                    "access_context.role".to_string(),
                ]))
            }
            Some(other) => {
                return Err(ToolError::invalid(
                    "access_context.role",
                    format!("expected a string, got {}", other),
                ))
            }
        };

        let (granted, justification) = decide(&role, &params.data_type);
        let matched = params.expected_access.map(|expected| expected == granted);

        context.ensure_active()?;
        tracing::debug!(
            session_id = %context.session.id,
            role = %role,
            data_type = %params.data_type,
            granted,
            "Data access evaluated"
        );

        Ok(json!({
            "data_type": params.data_type,
            "role": role,
            "access_granted": granted,
            "justification": justification,
            "expected_access": params.expected_access,
            "expected_access_matched": matched,
            "access_context": params.access_context,
        }))
    }

    fn schema(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: TOOL_ID.to_string(),
            name: "Validate Data Access".to_string(),
            description: "Decide whether the role in access_context may read the given data type."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "data_type": { "type": "string", "enum": DATA_TYPES },
                    "access_context": {
                        "type": "object",
                        "properties": {
                            "role": {
                                "type": "string",
                                "enum": ACCESS_MATRIX.iter().map(|(r, _)| *r).collect::<Vec<_>>()
                            }
                        },
                        "required": ["role"]
                    },
                    "expected_access": { "type": "boolean", "description": "Expected decision (optional)" }
                },
                "required": ["data_type", "access_context"]
            }),
        }
    }
}
