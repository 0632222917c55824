use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::error::ToolError;
use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::registry::{parse_args, ToolContext, ToolHandler};
use crate::mcp::report::{self, ReportFormat};
use crate::mcp::results::{Outcome, TestResult};

pub const LOG_RESULT_ID: &str = "test/log_result";
pub const GENERATE_REPORT_ID: &str = "test/generate_report";

/// Record a named outcome in the global store and the current session
pub struct LogResultTool;

#[async_trait]
impl ToolHandler for LogResultTool {
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            test_id: String,
            result: String,
            #[serde(default)]
            details: Value,
            #[serde(default)]
            notes: Option<String>,
        }

        let params: Args = parse_args(args)?;
        if params.test_id.trim().is_empty() {
            return Err(ToolError::invalid("test_id", "must not be empty"));
        }
        let outcome: Outcome = params
            .result
            .parse()
            .map_err(|reason| ToolError::invalid("result", reason))?;

        let entry = TestResult {
            test_id: params.test_id,
            result: outcome,
            details: params.details,
            notes: params.notes.unwrap_or_default(),
            timestamp: Utc::now(),
            session_id: Some(context.session.id.clone()),
        };

        context.ensure_active()?;
        let results = context.results.clone();
        let stored = entry.clone();
        // disk write runs on the blocking pool
        let recorded = tokio::task::spawn_blocking(move || results.record(stored))
            .await
            .map_err(|e| ToolError::Internal(format!("result writer failed: {}", e)))??;
        context.session.record_result(entry.clone());

        tracing::info!(
            session_id = %context.session.id,
            test_id = %entry.test_id,
            result = %entry.result,
            replaced = recorded.replaced,
            "Test result logged"
        );

        Ok(json!({
            "logged": true,
            "replaced": recorded.replaced,
            "artifact": recorded.artifact,
            "entry": entry,
        }))
    }

    fn schema(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: LOG_RESULT_ID.to_string(),
            name: "Log Test Result".to_string(),
            description: "Store the outcome of a named test. Logging the same test_id again \
                overwrites the earlier entry."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "test_id": { "type": "string" },
                    "result": {
                        "type": "string",
                        "enum": ["pass", "fail", "partial", "inconclusive"]
                    },
                    "details": { "description": "Free-form details (optional)" },
                    "notes": { "type": "string", "description": "Short note (optional)" }
                },
                "required": ["test_id", "result"]
            }),
        }
    }
}

/// Build a report over the global result store
pub struct GenerateReportTool;

#[async_trait]
impl ToolHandler for GenerateReportTool {
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            format: String,
            #[serde(default)]
            test_ids: Option<Vec<String>>,
            #[serde(default)]
            include_metrics: Option<bool>,
        }

        let params: Args = parse_args(args)?;
        let format: ReportFormat = params
            .format
            .parse()
            .map_err(|reason| ToolError::invalid("format", reason))?;

        let (results, missing) = match params.test_ids {
            Some(ids) => context.results.select(&ids),
            None => (context.results.all(), Vec::new()),
        };

        context.ensure_active()?;
        tracing::debug!(
            session_id = %context.session.id,
            format = format.as_str(),
            results = results.len(),
            missing = missing.len(),
            "Generating report"
        );

        Ok(report::generate(
            format,
            &results,
            params.include_metrics.unwrap_or(false),
            &missing,
        ))
    }

    fn schema(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: GENERATE_REPORT_ID.to_string(),
            name: "Generate Test Report".to_string(),
            description: "Summarize logged test results as a summary, detailed, technical or \
                executive report."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "enum": ["summary", "detailed", "technical", "executive"]
                    },
                    "test_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Restrict the report to these ids (optional, default: all)"
                    },
                    "include_metrics": { "type": "boolean", "description": "Add timing metrics (optional)" }
                },
                "required": ["format"]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{testing, ToolContext};
    use crate::mcp::results::{FileResultPersistence, ResultStore};
    use std::sync::Arc;
    use std::time::Duration;

    async fn log(ctx: &ToolContext, id: &str, result: &str, notes: &str) -> Value {
        LogResultTool
            .execute(
                json!({"test_id": id, "result": result, "notes": notes}),
                ctx,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn log_then_summary_counts_the_pass() {
        let ctx = testing::context(Duration::from_secs(5));
        log(&ctx, "t1", "pass", "").await;

        let report = GenerateReportTool
            .execute(json!({"format": "summary"}), &ctx)
            .await
            .unwrap();
        assert_eq!(report["counts"]["total"], 1);
        assert_eq!(report["counts"]["pass"], 1);
        assert_eq!(report["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn double_log_keeps_the_second_values() {
        let ctx = testing::context(Duration::from_secs(5));
        let first = log(&ctx, "t1", "fail", "first").await;
        let second = log(&ctx, "t1", "pass", "second").await;
        assert_eq!(first["replaced"], false);
        assert_eq!(second["replaced"], true);

        assert_eq!(ctx.results.len(), 1);
        let stored = ctx.results.get("t1").unwrap();
        assert_eq!(stored.result, Outcome::Pass);
        assert_eq!(stored.notes, "second");
        assert_eq!(stored.session_id.as_deref(), Some(ctx.session.id.as_str()));
        assert_eq!(ctx.session.result_count(), 1);
    }

    #[tokio::test]
    async fn invalid_result_value_is_rejected_without_storing() {
        let ctx = testing::context(Duration::from_secs(5));
        let err = LogResultTool
            .execute(json!({"test_id": "t1", "result": "great"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { ref name, .. } if name == "result"));
        assert!(ctx.results.is_empty());
    }

    #[tokio::test]
    async fn artifacts_are_written_per_test_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::with_persistence(Arc::new(
            FileResultPersistence::new(dir.path()),
        )));
        let ctx = ToolContext::new(testing::session(), store, Duration::from_secs(5));

        let out = log(&ctx, "suite/login", "partial", "").await;
        let artifact = out["artifact"].as_str().unwrap();
        assert!(artifact.ends_with("suite_2Flogin.json"));
        let on_disk: TestResult =
            serde_json::from_slice(&std::fs::read(artifact).unwrap()).unwrap();
        assert_eq!(on_disk.result, Outcome::Partial);
    }

    #[tokio::test]
    async fn report_lists_missing_ids() {
        let ctx = testing::context(Duration::from_secs(5));
        log(&ctx, "a", "pass", "").await;
        log(&ctx, "b", "fail", "broken").await;

        let report = GenerateReportTool
            .execute(
                json!({"format": "technical", "test_ids": ["b", "zzz"], "include_metrics": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(report["counts"]["total"], 1);
        assert_eq!(report["issues"][0]["test_id"], "b");
        assert_eq!(report["missing_test_ids"][0], "zzz");
        assert!(report.get("metrics").is_some());
    }

    #[tokio::test]
    async fn unknown_format_is_rejected() {
        let err = GenerateReportTool
            .execute(json!({"format": "poem"}), &testing::context(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { ref name, .. } if name == "format"));
    }
}
