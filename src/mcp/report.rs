//! Report rendering over a set of test results.
//!
//! Reports are never stored; they are derived on demand. Timing metrics come
//! from result timestamps only and are added only when asked for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

use super::results::{Outcome, TestResult};

/// Number of issues surfaced by the executive report
const TOP_ISSUES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Summary,
    Detailed,
    Technical,
    Executive,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detailed => "detailed",
            Self::Technical => "technical",
            Self::Executive => "executive",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "detailed" => Ok(Self::Detailed),
            "technical" => Ok(Self::Technical),
            "executive" => Ok(Self::Executive),
            other => Err(format!(
                "`{}` is not one of summary, detailed, technical, executive",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCounts {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub partial: usize,
    pub inconclusive: usize,
}

impl ResultCounts {
    pub fn tally(results: &[TestResult]) -> Self {
        let mut counts = Self::default();
        for r in results {
            counts.total += 1;
            match r.result {
                Outcome::Pass => counts.pass += 1,
                Outcome::Fail => counts.fail += 1,
                Outcome::Partial => counts.partial += 1,
                Outcome::Inconclusive => counts.inconclusive += 1,
            }
        }
        counts
    }

    /// Pass percentage, 0 when there are no results
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round2(self.pass as f64 * 100.0 / self.total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub first_result_at: Option<DateTime<Utc>>,
    pub last_result_at: Option<DateTime<Utc>>,
    pub span_seconds: f64,
    /// None with fewer than two results or a zero-length span
    pub tests_per_minute: Option<f64>,
    /// None with fewer than two results
    pub average_interval_seconds: Option<f64>,
}

pub fn timing_metrics(results: &[TestResult]) -> TimingMetrics {
    let mut stamps: Vec<DateTime<Utc>> = results.iter().map(|r| r.timestamp).collect();
    stamps.sort();

    let (first, last) = match (stamps.first(), stamps.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return TimingMetrics {
                first_result_at: None,
                last_result_at: None,
                span_seconds: 0.0,
                tests_per_minute: None,
                average_interval_seconds: None,
            }
        }
    };

    let span_seconds = (last - first).num_milliseconds() as f64 / 1000.0;
    let n = stamps.len();
    let (tests_per_minute, average_interval_seconds) = if n < 2 {
        (None, None)
    } else if span_seconds <= 0.0 {
        (None, Some(0.0))
    } else {
        (
            Some(round2(n as f64 / (span_seconds / 60.0))),
            Some(round2(span_seconds / (n - 1) as f64)),
        )
    };

    TimingMetrics {
        first_result_at: Some(first),
        last_result_at: Some(last),
        span_seconds: round2(span_seconds),
        tests_per_minute,
        average_interval_seconds,
    }
}

/// Traffic-light status used by executive reports
pub fn status_color(counts: &ResultCounts) -> &'static str {
    let rate = counts.success_rate();
    if counts.total == 0 {
        "gray"
    } else if counts.fail == 0 && rate >= 90.0 {
        "green"
    } else if rate >= 70.0 {
        "yellow"
    } else {
        "red"
    }
}

pub fn verdict(counts: &ResultCounts) -> String {
    if counts.total == 0 {
        "No test results recorded".to_string()
    } else if counts.pass == counts.total {
        format!("All {} tests passed", counts.total)
    } else {
        format!(
            "{} of {} tests passed ({}%)",
            counts.pass,
            counts.total,
            counts.success_rate()
        )
    }
}

/// Render one report over `results`, which must already be filtered.
/// `missing` lists requested ids that had no stored result.
pub fn generate(
    format: ReportFormat,
    results: &[TestResult],
    include_metrics: bool,
    missing: &[String],
) -> Value {
    let counts = ResultCounts::tally(results);
    let generated_at = Utc::now();

    let mut report = match format {
        ReportFormat::Summary => json!({
            "verdict": verdict(&counts),
        }),
        ReportFormat::Detailed => json!({
            "verdict": verdict(&counts),
            "tests": results.iter().map(test_entry).collect::<Vec<_>>(),
        }),
        ReportFormat::Technical => json!({
            "results": results,
            "issues": results
                .iter()
                .filter(|r| r.result.is_issue())
                .map(issue_entry)
                .collect::<Vec<_>>(),
        }),
        ReportFormat::Executive => json!({
            "status": status_color(&counts),
            "top_issues": top_issues(results)
                .into_iter()
                .map(issue_entry)
                .collect::<Vec<_>>(),
            "conclusion": conclusion(&counts),
        }),
    };

    report["format"] = json!(format.as_str());
    report["counts"] = json!(counts);
    report["success_rate"] = json!(counts.success_rate());
    report["generated_at"] = json!(generated_at);
    if !missing.is_empty() {
        report["missing_test_ids"] = json!(missing);
    }
    // Summary and executive shapes are fixed; metrics only extend the
    // detailed and technical ones.
    if include_metrics && matches!(format, ReportFormat::Detailed | ReportFormat::Technical) {
        report["metrics"] = json!(timing_metrics(results));
    }

    report
}

fn test_entry(r: &TestResult) -> Value {
    json!({
        "test_id": r.test_id,
        "result": r.result,
        "details": r.details,
        "notes": r.notes,
        "timestamp": r.timestamp,
    })
}

fn issue_entry(r: &TestResult) -> Value {
    let summary = if r.notes.is_empty() {
        match &r.details {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else {
        r.notes.clone()
    };
    json!({
        "test_id": r.test_id,
        "result": r.result,
        "summary": summary,
        "details": r.details,
        "timestamp": r.timestamp,
    })
}

/// Failures before partials, newest first within each group
fn top_issues(results: &[TestResult]) -> Vec<&TestResult> {
    let mut issues: Vec<&TestResult> = results.iter().filter(|r| r.result.is_issue()).collect();
    issues.sort_by(|a, b| {
        let rank = |r: &TestResult| if r.result == Outcome::Fail { 0 } else { 1 };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    issues.truncate(TOP_ISSUES);
    issues
}

fn conclusion(counts: &ResultCounts) -> String {
    let rate = counts.success_rate();
    match status_color(counts) {
        "gray" => "No test results have been recorded yet, so no conclusion can be drawn.".to_string(),
        "green" => format!(
            "{} of {} tests passed ({}%). No blocking issues were found.",
            counts.pass, counts.total, rate
        ),
        "yellow" => format!(
            "{} of {} tests passed ({}%). {} test(s) need attention before sign-off.",
            counts.pass,
            counts.total,
            rate,
            counts.fail + counts.partial + counts.inconclusive
        ),
        _ => format!(
            "Only {} of {} tests passed ({}%). {} failing test(s) block sign-off.",
            counts.pass, counts.total, rate, counts.fail
        ),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
