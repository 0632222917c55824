use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{McpError, ToolError};
use super::protocol::ToolDescriptor;
use super::results::ResultStore;
use super::session::Session;

/// Context passed to tool handlers
pub struct ToolContext {
    pub session: Arc<Session>,
    pub results: Arc<ResultStore>,
    pub deadline: Instant,
    pub budget: Duration,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(session: Arc<Session>, results: Arc<ResultStore>, budget: Duration) -> Self {
        Self {
            session,
            results,
            deadline: Instant::now() + budget,
            budget,
            cancel: CancellationToken::new(),
        }
    }

    /// Fail fast once the invocation was cancelled or ran out of time.
    /// Handlers call this before any side effect.
    pub fn ensure_active(&self) -> Result<(), ToolError> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ToolError::DeadlineExceeded(self.budget));
        }
        Ok(())
    }
}

/// Trait for tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. Required parameters are already checked.
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError>;

    /// Return the tool schema definition
    fn schema(&self) -> ToolDescriptor;
}

/// Decode tool arguments into a typed struct
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid("parameters", e.to_string()))
}

/// Names listed in the schema's `required` array that are absent or null
pub fn missing_required(schema: &Value, params: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| params.get(*name).map_or(true, Value::is_null))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Tool registry managing all available tools, keyed by tool id
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool handler under the id its schema declares
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let id = handler.schema().id;
        if self.handlers.insert(id.clone(), handler).is_some() {
            tracing::warn!(tool_id = %id, "Replacing previously registered tool");
        } else {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn ToolHandler> {
        self.handlers.get(id).map(|h| h.as_ref())
    }

    /// List all available tools in registration order
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.handlers.get(id))
            .map(|h| h.schema())
            .collect()
    }

    pub fn has_tool(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    /// Look up, schema-check and run a tool under the context deadline
    pub async fn execute(
        &self,
        tool_id: &str,
        params: Value,
        context: &ToolContext,
    ) -> Result<Value, McpError> {
        let handler = self
            .get(tool_id)
            .ok_or_else(|| McpError::ToolNotFound(tool_id.to_string()))?;

        let params = match params {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(McpError::Malformed(format!(
                    "`parameters` must be an object, got {}",
                    other
                )))
            }
        };

        let missing = missing_required(&handler.schema().parameters, &params);
        if !missing.is_empty() {
            return Err(McpError::MissingParameters(missing));
        }

        match tokio::time::timeout_at(context.deadline, handler.execute(params, context)).await {
            Ok(result) => result.map_err(McpError::from),
            Err(_) => {
                context.cancel.cancel();
                tracing::warn!(tool_id, budget = ?context.budget, "Tool deadline exceeded");
                Err(ToolError::DeadlineExceeded(context.budget).into())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::context;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl ToolHandler for CountingTool {
        async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
            tokio::time::sleep(self.delay).await;
            context.ensure_active()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echo": args["name"] }))
        }

        fn schema(&self) -> ToolDescriptor {
            ToolDescriptor {
                id: "test/counting".to_string(),
                name: "Counting".to_string(),
                description: "Counts invocations".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            }
        }
    }

    fn registry(calls: Arc<AtomicUsize>, delay: Duration) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool { calls, delay }));
        registry
    }

    #[test]
    fn missing_required_treats_null_as_absent() {
        let schema = json!({ "required": ["a", "b", "c"] });
        let params = json!({ "a": 1, "b": null });
        assert_eq!(missing_required(&schema, &params), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn missing_parameters_block_the_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone(), Duration::ZERO);
        let err = registry
            .execute("test/counting", json!({}), &context(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::MissingParameters(ref names) if names == &vec!["name".to_string()]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = registry(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        let err = registry
            .execute("test/nope", json!({}), &context(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn successful_call_returns_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone(), Duration::ZERO);
        let value = registry
            .execute("test/counting", json!({"name": "x"}), &context(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(value["echo"], "x");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.list_tools().len(), 1);
    }

    #[tokio::test]
    async fn deadline_cancels_a_slow_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone(), Duration::from_millis(200));
        let ctx = context(Duration::from_millis(20));
        let err = registry
            .execute("test/counting", json!({"name": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolExecution(_)));
        assert!(ctx.cancel.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_object_parameters_are_malformed() {
        let registry = registry(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        let err = registry
            .execute("test/counting", json!([1, 2]), &context(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Malformed(_)));
    }
}
