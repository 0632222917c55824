use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::error::AuthError;
use super::protocol::{ServerInfo, ServerMessage, SUPPORTED_VERSIONS};
use super::results::TestResult;
use super::session_log::{SessionLogger, SessionSummary};

/// State of one authenticated connection
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    log: SessionLogger,
    results: Mutex<HashMap<String, TestResult>>,
}

impl Session {
    pub fn log(&self) -> &SessionLogger {
        &self.log
    }

    /// Store an outcome in this session's map, returning the one it replaced
    pub fn record_result(&self, result: TestResult) -> Option<TestResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.test_id.clone(), result)
    }

    pub fn result(&self, test_id: &str) -> Option<TestResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(test_id)
            .cloned()
    }

    pub fn results(&self) -> Vec<TestResult> {
        let mut results: Vec<TestResult> = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        super::results::sort_chronologically(&mut results);
        results
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Authenticates connections and owns the registry of live sessions
pub struct SessionManager {
    auth_token: String,
    log_dir: Option<PathBuf>,
    server_info: ServerInfo,
    live: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(auth_token: String, log_dir: Option<PathBuf>, server_info: ServerInfo) -> Self {
        Self {
            auth_token,
            log_dir,
            server_info,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Check a presented bearer token against the shared secret
    pub fn authenticate(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let presented = match presented.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingToken),
        };
        if self.auth_token.is_empty()
            || !constant_time_eq::constant_time_eq(presented.as_bytes(), self.auth_token.as_bytes())
        {
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }

    pub fn create_session(&self) -> std::io::Result<Arc<Session>> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let log = SessionLogger::open(self.log_dir.as_deref(), &id, created_at)?;
        log.append(
            "session_start",
            json!({ "created_at": created_at, "log_path": log.log_path() }),
        );

        let session = Arc::new(Session {
            id: id.clone(),
            created_at,
            log,
            results: Mutex::new(HashMap::new()),
        });

        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());

        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    pub fn init_message(&self, session: &Session) -> ServerMessage {
        ServerMessage::SessionInit {
            session_id: session.id.clone(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            server_info: self.server_info.clone(),
        }
    }

    /// Finalize the session log, then drop the session from the live registry.
    /// The summary artifact exists by the time the session stops being live.
    pub fn close_session(&self, session_id: &str) -> Option<SessionSummary> {
        let session = self.get(session_id)?;
        let summary = session.log().finalize(session.result_count());
        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)?;

        tracing::info!(
            session_id = %summary.session_id,
            duration_seconds = summary.duration_seconds,
            total_events = summary.total_events,
            "Session closed"
        );
        Some(summary)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    pub fn live_count(&self) -> usize {
        self.live.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}
