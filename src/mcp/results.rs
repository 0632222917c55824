//! Process-wide test result store.
//!
//! Results are keyed by `test_id` only; the last write wins, whichever
//! session it came from. Each entry remembers the session that wrote it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Partial,
    Inconclusive,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Partial => "partial",
            Self::Inconclusive => "inconclusive",
        }
    }

    /// Fail and partial results are reported as issues
    pub fn is_issue(&self) -> bool {
        matches!(self, Self::Fail | Self::Partial)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "partial" => Ok(Self::Partial),
            "inconclusive" => Ok(Self::Inconclusive),
            other => Err(format!(
                "`{}` is not one of pass, fail, partial, inconclusive",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub result: Outcome,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub notes: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Storage backend for result artifacts
pub trait ResultPersistence: Send + Sync {
    /// Write (or overwrite) the artifact for one result and return its location
    fn persist(&self, result: &TestResult) -> std::io::Result<PathBuf>;

    /// Read back every stored artifact
    fn load_all(&self) -> std::io::Result<Vec<TestResult>>;
}

/// One pretty-printed JSON file per `test_id`
#[derive(Debug, Clone)]
pub struct FileResultPersistence {
    dir: PathBuf,
}

impl FileResultPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, test_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_stem(test_id)))
    }
}

impl ResultPersistence for FileResultPersistence {
    fn persist(&self, result: &TestResult) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.artifact_path(&result.test_id);
        let body = serde_json::to_vec_pretty(result)?;
        std::fs::write(&path, body)?;
        Ok(path)
    }

    fn load_all(&self) -> std::io::Result<Vec<TestResult>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            match serde_json::from_slice::<TestResult>(&bytes) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable result artifact")
                }
            }
        }
        Ok(results)
    }
}

/// Encode a `test_id` as a file stem.
///
/// ASCII letters, digits and `-` pass through. Every other byte becomes
/// `_XX` (uppercase hex), so distinct ids always map to distinct stems.
pub fn sanitize_file_stem(raw: &str) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// An entry with the same `test_id` was overwritten
    pub replaced: bool,
    pub artifact: Option<PathBuf>,
}

pub struct ResultStore {
    entries: RwLock<HashMap<String, TestResult>>,
    persistence: Option<Arc<dyn ResultPersistence>>,
}

impl ResultStore {
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    pub fn with_persistence(persistence: Arc<dyn ResultPersistence>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: Some(persistence),
        }
    }

    /// Store a result, persisting it first so a failed write leaves no entry
    pub fn record(&self, result: TestResult) -> std::io::Result<RecordOutcome> {
        let artifact = match &self.persistence {
            Some(backend) => Some(backend.persist(&result)?),
            None => None,
        };

        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.test_id.clone(), result)
            .is_some();

        Ok(RecordOutcome { replaced, artifact })
    }

    /// Load previously persisted artifacts into memory, returning how many
    pub fn restore(&self) -> std::io::Result<usize> {
        let Some(backend) = &self.persistence else {
            return Ok(0);
        };
        let loaded = backend.load_all()?;
        let count = loaded.len();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for result in loaded {
            entries.insert(result.test_id.clone(), result);
        }
        Ok(count)
    }

    pub fn get(&self, test_id: &str) -> Option<TestResult> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(test_id)
            .cloned()
    }

    /// All results ordered by timestamp, then id
    pub fn all(&self) -> Vec<TestResult> {
        let mut results: Vec<TestResult> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sort_chronologically(&mut results);
        results
    }

    /// Results for the given ids, plus the ids that have no entry
    pub fn select(&self, test_ids: &[String]) -> (Vec<TestResult>, Vec<String>) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in test_ids {
            match entries.get(id) {
                Some(result) => {
                    if !found.iter().any(|r: &TestResult| &r.test_id == id) {
                        found.push(result.clone());
                    }
                }
                None => missing.push(id.clone()),
            }
        }
        sort_chronologically(&mut found);
        (found, missing)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

pub fn sort_chronologically(results: &mut [TestResult]) {
    results.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.test_id.cmp(&b.test_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, outcome: Outcome, notes: &str) -> TestResult {
        TestResult {
            test_id: id.to_string(),
            result: outcome,
            details: json!({}),
            notes: notes.to_string(),
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    #[test]
    fn relogging_overwrites_the_entry() {
        let store = ResultStore::in_memory();
        let first = store.record(result("t1", Outcome::Fail, "first")).unwrap();
        let second = store.record(result("t1", Outcome::Pass, "second")).unwrap();

        assert!(!first.replaced);
        assert!(second.replaced);
        assert_eq!(store.len(), 1);
        let stored = store.get("t1").unwrap();
        assert_eq!(stored.result, Outcome::Pass);
        assert_eq!(stored.notes, "second");
    }

    #[test]
    fn select_reports_missing_ids() {
        let store = ResultStore::in_memory();
        store.record(result("a", Outcome::Pass, "")).unwrap();
        let (found, missing) = store.select(&["a".to_string(), "zzz".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(missing, vec!["zzz".to_string()]);
    }

    #[test]
    fn file_persistence_round_trips_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileResultPersistence::new(dir.path().join("results")));
        let store = ResultStore::with_persistence(backend.clone());

        let outcome = store.record(result("suite/login #1", Outcome::Partial, "n")).unwrap();
        let path = outcome.artifact.unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "suite_2Flogin_20_231.json");

        let fresh = ResultStore::with_persistence(backend);
        assert_eq!(fresh.restore().unwrap(), 1);
        assert_eq!(fresh.get("suite/login #1").unwrap().result, Outcome::Partial);
    }

    #[test]
    fn outcome_parsing_is_closed() {
        assert_eq!("partial".parse::<Outcome>().unwrap(), Outcome::Partial);
        assert!("passed".parse::<Outcome>().is_err());
    }

    #[test]
    fn file_stems_escape_unsafe_bytes() {
        assert_eq!(sanitize_file_stem("t-1"), "t-1");
        assert_eq!(sanitize_file_stem("a_b.c"), "a_5Fb_2Ec");
        assert_eq!(sanitize_file_stem("../etc"), "_2E_2E_2Fetc");
        assert_eq!(sanitize_file_stem("é"), "_C3_A9");
        assert_eq!(sanitize_file_stem(""), "_");
    }

    #[test]
    fn similar_ids_get_separate_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileResultPersistence::new(dir.path().join("results")));
        let store = ResultStore::with_persistence(backend.clone());

        let slash = store.record(result("suite/login", Outcome::Pass, "a")).unwrap();
        let underscore = store.record(result("suite_login", Outcome::Fail, "b")).unwrap();
        assert_ne!(slash.artifact, underscore.artifact);
        assert!(!underscore.replaced);

        let fresh = ResultStore::with_persistence(backend);
        assert_eq!(fresh.restore().unwrap(), 2);
        assert_eq!(fresh.get("suite/login").unwrap().result, Outcome::Pass);
        assert_eq!(fresh.get("suite_login").unwrap().result, Outcome::Fail);
    }
}
