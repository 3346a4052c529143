//! Knowledge sources.

use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::KnowledgeRecord;
use crate::error::{Error, Result};

/// Supplies the raw entries the index is built from.
///
/// Entries are untyped JSON; decoding and validation happen per entry in
/// [`validate_records`](super::validate_records). A source that has no data
/// available returns an empty list; only unreadable data or a document that
/// is not a JSON array is an error.
pub trait KnowledgeSource: Send + Sync {
    /// Load every entry, in source order.
    fn load(&self) -> Result<Vec<JsonValue>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Knowledge stored as a JSON array in a file.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeSource for JsonFileSource {
    fn load(&self) -> Result<Vec<JsonValue>> {
        if !self.path.exists() {
            warn!(
                "Knowledge file {} not found, starting with an empty index",
                self.path.display()
            );
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::KnowledgeSource(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let entries: Vec<JsonValue> = serde_json::from_str(&content).map_err(|e| {
            Error::KnowledgeSource(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        info!(
            "Loaded {} knowledge records from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Records held in memory, mostly useful for embedding the service in tests.
impl KnowledgeSource for Vec<KnowledgeRecord> {
    fn load(&self) -> Result<Vec<JsonValue>> {
        self.iter()
            .map(|record| serde_json::to_value(record).map_err(Error::from))
            .collect()
    }

    fn describe(&self) -> String {
        format!("{} in-memory records", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{load_items, InvalidRecordPolicy};

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("knowledge.json"));

        let records = source.load().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_reads_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(
            &path,
            r#"[
                {"role": "CITIZEN", "question": "q1", "answer": "a1"},
                {"question": "q2", "answer": "a2", "action": {"type": "open"}}
            ]"#,
        )
        .unwrap();

        let entries = JsonFileSource::new(&path).load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["question"], "q1");
        assert!(entries[1].get("role").is_none());
        assert!(entries[1]["action"].is_object());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileSource::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::KnowledgeSource(_)));
    }

    #[test]
    fn test_non_array_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, r#"{"question": "q", "answer": "a"}"#).unwrap();

        let err = JsonFileSource::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::KnowledgeSource(_)));
    }

    #[test]
    fn test_wrong_typed_records_follow_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(
            &path,
            r#"[
                {"question": "good", "answer": "ok"},
                {"question": 42, "answer": "x"},
                "not an object",
                {"question": "q", "answer": "a", "action": 5}
            ]"#,
        )
        .unwrap();
        let source = JsonFileSource::new(&path);

        let items = load_items(&source, InvalidRecordPolicy::Skip).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "good");
        assert_eq!(items[0].answer, "ok");

        let err = load_items(&source, InvalidRecordPolicy::Abort).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { index: 1, .. }));
    }

    #[test]
    fn test_in_memory_records_round_trip() {
        let records = vec![KnowledgeRecord {
            question: Some("q".into()),
            answer: Some("a".into()),
            ..Default::default()
        }];

        let items = load_items(&records, InvalidRecordPolicy::Abort).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].role, "CITIZEN");
    }
}
