//! Append-only per-session event trail.
//!
//! Events are written as JSON lines to `<dir>/<session_id>.jsonl`; only the
//! per-type counts stay in memory. Finalizing writes
//! `<dir>/<session_id>.summary.json` and closes the sink; later appends are
//! dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_events: u64,
    pub event_counts: BTreeMap<String, u64>,
    pub results_logged: usize,
}

struct LoggerState {
    sink: Option<BufWriter<File>>,
    counts: BTreeMap<String, u64>,
    closed: bool,
}

pub struct SessionLogger {
    session_id: String,
    started_at: DateTime<Utc>,
    dir: Option<PathBuf>,
    state: Mutex<LoggerState>,
}

impl SessionLogger {
    /// Open a logger. Without a directory only the counts are kept.
    pub fn open(
        dir: Option<&Path>,
        session_id: &str,
        started_at: DateTime<Utc>,
    ) -> std::io::Result<Self> {
        let sink = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(format!("{}.jsonl", session_id)))?;
                Some(BufWriter::new(file))
            }
            None => None,
        };

        Ok(Self {
            session_id: session_id.to_string(),
            started_at,
            dir: dir.map(Path::to_path_buf),
            state: Mutex::new(LoggerState {
                sink,
                counts: BTreeMap::new(),
                closed: false,
            }),
        })
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{}.jsonl", self.session_id)))
    }

    pub fn summary_path(&self) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{}.summary.json", self.session_id)))
    }

    pub fn append(&self, event_type: &str, data: Value) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            tracing::debug!(
                session_id = %self.session_id,
                event_type,
                "Dropping event for finalized session"
            );
            return;
        }
        self.push(&mut state, event_type, data);
    }

    fn push(&self, state: &mut LoggerState, event_type: &str, data: Value) {
        let event = SessionEvent {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            event_type: event_type.to_string(),
            data,
        };

        if let Some(sink) = state.sink.as_mut() {
            let written = serde_json::to_writer(&mut *sink, &event)
                .map_err(std::io::Error::from)
                .and_then(|_| sink.write_all(b"\n"))
                .and_then(|_| sink.flush());
            if let Err(e) = written {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to write session event");
            }
        }

        *state.counts.entry(event.event_type).or_insert(0) += 1;
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .get(event_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed
    }

    /// Append `session_end`, close the sink and write the summary artifact.
    /// Calling it again returns a fresh summary without touching the files.
    pub fn finalize(&self, results_logged: usize) -> SessionSummary {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let first_close = !state.closed;
        if first_close {
            self.push(
                &mut state,
                "session_end",
                serde_json::json!({ "results_logged": results_logged }),
            );
            state.closed = true;
            state.sink = None;
        }

        let end_time = Utc::now();
        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            start_time: self.started_at,
            end_time,
            duration_seconds: (end_time - self.started_at).num_milliseconds() as f64 / 1000.0,
            total_events: state.counts.values().sum(),
            event_counts: state.counts.clone(),
            results_logged,
        };
        drop(state);

        if first_close {
            if let Some(path) = self.summary_path() {
                let written = serde_json::to_vec_pretty(&summary)
                    .map_err(std::io::Error::from)
                    .and_then(|body| std::fs::write(&path, body));
                if let Err(e) = written {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to write session summary");
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_events_by_type() {
        let log = SessionLogger::open(None, "s1", Utc::now()).unwrap();
        log.append("message_received", json!({}));
        log.append("message_received", json!({}));
        log.append("dispatch", json!({}));

        let summary = log.finalize(0);
        assert_eq!(summary.event_counts["message_received"], 2);
        assert_eq!(summary.event_counts["dispatch"], 1);
        assert_eq!(summary.event_counts["session_end"], 1);
        assert_eq!(summary.total_events, 4);
    }

    #[test]
    fn appends_after_finalize_are_dropped() {
        let log = SessionLogger::open(None, "s1", Utc::now()).unwrap();
        log.finalize(0);
        log.append("dispatch", json!({}));
        assert!(log.is_closed());
        assert_eq!(log.count("dispatch"), 0);
    }

    #[test]
    fn writes_jsonl_and_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLogger::open(Some(dir.path()), "abc", Utc::now()).unwrap();
        log.append("session_start", json!({"peer": "test"}));
        log.finalize(2);

        let lines = std::fs::read_to_string(log.log_path().unwrap()).unwrap();
        let events: Vec<SessionEvent> = lines
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "session_start");
        assert_eq!(events[1].event_type, "session_end");

        let summary: SessionSummary =
            serde_json::from_slice(&std::fs::read(log.summary_path().unwrap()).unwrap()).unwrap();
        assert_eq!(summary.results_logged, 2);
        assert_eq!(summary.total_events, 2);
    }
}
