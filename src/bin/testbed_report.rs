//! Offline report renderer.
//!
//! Reads the result artifacts a server wrote under `<data-dir>/results` and
//! prints one report as JSON on stdout:
//!
//! ```text
//! testbed-report --data-dir data --format executive
//! testbed-report --format technical --test-id login --test-id logout --metrics
//! ```

use anyhow::Context;
use clap::Parser;
use mcp_testbed::mcp::report::{self, ReportFormat};
use mcp_testbed::mcp::{FileResultPersistence, ResultStore};
use mcp_testbed::telemetry::{get_subscriber, init_subscriber};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "testbed-report",
    version,
    about = "Render a report from stored test results"
)]
struct Cli {
    /// Data directory used by the server
    #[arg(long, env = "TESTBED__DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
    /// Report format: summary, detailed, technical, executive
    #[arg(long, default_value = "summary", value_parser = parse_format)]
    format: ReportFormat,
    /// Restrict the report to this test id (repeatable)
    #[arg(long = "test-id", value_name = "ID")]
    test_ids: Vec<String>,
    /// Include timing metrics (detailed and technical only)
    #[arg(long)]
    metrics: bool,
}

fn parse_format(raw: &str) -> Result<ReportFormat, String> {
    raw.parse()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the report
    let subscriber = get_subscriber("testbed-report".into(), "warn".into(), std::io::stderr);
    init_subscriber(subscriber)?;

    let results_dir = cli.data_dir.join("results");
    let store = ResultStore::with_persistence(Arc::new(FileResultPersistence::new(&results_dir)));
    let loaded = store
        .restore()
        .with_context(|| format!("failed to read results from {}", results_dir.display()))?;
    tracing::info!(loaded, dir = %results_dir.display(), "Loaded stored results");

    let (results, missing) = if cli.test_ids.is_empty() {
        (store.all(), Vec::new())
    } else {
        store.select(&cli.test_ids)
    };

    let rendered = report::generate(cli.format, &results, cli.metrics, &missing);
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}
