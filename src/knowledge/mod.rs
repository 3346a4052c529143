//! Knowledge base records and sources.
//!
//! A knowledge base is a JSON array of FAQ entries:
//!
//! ```json
//! [
//!   {
//!     "role": "CITIZEN",
//!     "question": "How do I pay my tax?",
//!     "answer": "Use portal X.",
//!     "action": { "type": "navigate", "target": "/tax" }
//!   }
//! ]
//! ```
//!
//! `role` defaults to [`DEFAULT_ROLE`] and `action` is optional. Records are
//! validated into [`KnowledgeItem`]s before they reach the index.

mod source;

pub use source::{JsonFileSource, KnowledgeSource};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{Error, Result};

/// Role used when a record or a request does not name one.
pub const DEFAULT_ROLE: &str = "CITIZEN";

/// Structured payload attached to an answer, opaque to the engine.
pub type Action = serde_json::Map<String, JsonValue>;

/// A raw record as stored in the knowledge file.
///
/// Every field is optional here so that validation can report exactly what is
/// missing. Sources hand over untyped JSON entries and each one is decoded on
/// its own, so a wrong-typed field only invalidates its own record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<JsonValue>,
}

/// One retrievable FAQ entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub role: String,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

impl KnowledgeItem {
    /// Create an item for the given role (normalized to uppercase).
    pub fn new(
        role: impl AsRef<str>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            role: normalize_role(role.as_ref()),
            question: question.into(),
            answer: answer.into(),
            action: None,
        }
    }

    /// Attach an action payload.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

impl KnowledgeRecord {
    /// Decode one raw knowledge entry.
    pub fn from_json(entry: JsonValue) -> std::result::Result<Self, String> {
        if !entry.is_object() {
            return Err(format!(
                "record must be an object, got {}",
                json_type_name(&entry)
            ));
        }
        serde_json::from_value(entry).map_err(|e| e.to_string())
    }
}

impl TryFrom<KnowledgeRecord> for KnowledgeItem {
    type Error = String;

    fn try_from(record: KnowledgeRecord) -> std::result::Result<Self, Self::Error> {
        let question = required_text(record.question, "question")?;
        let answer = required_text(record.answer, "answer")?;

        let action = match record.action {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(map)) => Some(map),
            Some(other) => {
                return Err(format!(
                    "action must be an object, got {}",
                    json_type_name(&other)
                ))
            }
        };

        let role = record
            .role
            .as_deref()
            .map(normalize_role)
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());

        Ok(Self {
            role,
            question,
            answer,
            action,
        })
    }
}

/// How to treat records that fail validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRecordPolicy {
    /// Log a warning and leave the record out of the index
    #[default]
    Skip,
    /// Fail the whole load
    Abort,
}

/// Uppercase and trim a role name.
pub fn normalize_role(role: &str) -> String {
    role.trim().to_uppercase()
}

/// Read all records from a source and validate them into items.
///
/// Source order is preserved for the records that pass validation.
pub fn load_items(
    source: &dyn KnowledgeSource,
    policy: InvalidRecordPolicy,
) -> Result<Vec<KnowledgeItem>> {
    let entries = source.load()?;
    validate_records(entries, policy)
}

/// Decode and validate raw entries according to `policy`.
///
/// An entry that is not an object, has a wrong-typed field or misses a
/// required field is handled the same way: dropped under
/// [`InvalidRecordPolicy::Skip`], fatal under [`InvalidRecordPolicy::Abort`].
pub fn validate_records(
    entries: Vec<JsonValue>,
    policy: InvalidRecordPolicy,
) -> Result<Vec<KnowledgeItem>> {
    let mut items = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let item = KnowledgeRecord::from_json(entry).and_then(KnowledgeItem::try_from);
        match item {
            Ok(item) => items.push(item),
            Err(reason) => match policy {
                InvalidRecordPolicy::Skip => {
                    warn!("Skipping knowledge record #{}: {}", index, reason);
                }
                InvalidRecordPolicy::Abort => {
                    return Err(Error::InvalidRecord { index, reason });
                }
            },
        }
    }

    Ok(items)
}

fn required_text(value: Option<String>, field: &str) -> std::result::Result<String, String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(format!("{} is empty", field)),
        None => Err(format!("missing {}", field)),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> KnowledgeRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_role_defaults_to_citizen() {
        let item = KnowledgeItem::try_from(record(json!({
            "question": "How do I file a case?",
            "answer": "Open the case form."
        })))
        .unwrap();

        assert_eq!(item.role, "CITIZEN");
        assert!(item.action.is_none());
    }

    #[test]
    fn test_role_is_normalized() {
        let item = KnowledgeItem::try_from(record(json!({
            "role": " lawyer ",
            "question": "q",
            "answer": "a"
        })))
        .unwrap();

        assert_eq!(item.role, "LAWYER");
    }

    #[test]
    fn test_blank_role_defaults() {
        let item = KnowledgeItem::try_from(record(json!({
            "role": "  ",
            "question": "q",
            "answer": "a"
        })))
        .unwrap();

        assert_eq!(item.role, DEFAULT_ROLE);
    }

    #[test]
    fn test_action_object_kept() {
        let item = KnowledgeItem::try_from(record(json!({
            "question": "q",
            "answer": "a",
            "action": {"type": "navigate", "target": "/tax"}
        })))
        .unwrap();

        let action = item.action.unwrap();
        assert_eq!(action["type"], "navigate");
        assert_eq!(action["target"], "/tax");
    }

    #[test]
    fn test_null_action_is_none() {
        let item = KnowledgeItem::try_from(record(json!({
            "question": "q",
            "answer": "a",
            "action": null
        })))
        .unwrap();

        assert!(item.action.is_none());
    }

    #[test]
    fn test_rejects_missing_fields() {
        let err = KnowledgeItem::try_from(record(json!({"answer": "a"}))).unwrap_err();
        assert!(err.contains("missing question"));

        let err = KnowledgeItem::try_from(record(json!({"question": "q", "answer": " "})))
            .unwrap_err();
        assert!(err.contains("answer is empty"));
    }

    #[test]
    fn test_rejects_non_object_action() {
        let err = KnowledgeItem::try_from(record(json!({
            "question": "q",
            "answer": "a",
            "action": "navigate"
        })))
        .unwrap_err();

        assert!(err.contains("action must be an object"));
    }

    #[test]
    fn test_skip_policy_drops_invalid_records() {
        let entries = vec![
            json!({"question": "first", "answer": "1"}),
            json!({"question": "broken"}),
            json!({"question": "third", "answer": "3"}),
        ];

        let items = validate_records(entries, InvalidRecordPolicy::Skip).unwrap();
        let questions: Vec<_> = items.iter().map(|i| i.question.as_str()).collect();
        assert_eq!(questions, vec!["first", "third"]);
    }

    #[test]
    fn test_skip_policy_drops_wrong_typed_entries() {
        let entries = vec![
            json!({"question": 42, "answer": "x"}),
            json!({"role": 7, "question": "q", "answer": "a"}),
            json!("not an object"),
            json!(null),
            json!({"question": "good", "answer": "ok"}),
        ];

        let items = validate_records(entries, InvalidRecordPolicy::Skip).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "good");
    }

    #[test]
    fn test_abort_policy_reports_index() {
        let entries = vec![
            json!({"question": "first", "answer": "1"}),
            json!({"answer": "orphan"}),
        ];

        let err = validate_records(entries, InvalidRecordPolicy::Abort).unwrap_err();
        match err {
            Error::InvalidRecord { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("question"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_abort_policy_on_non_object_entry() {
        let entries = vec![json!({"question": "q", "answer": "a"}), json!([1, 2])];

        let err = validate_records(entries, InvalidRecordPolicy::Abort).unwrap_err();
        match err {
            Error::InvalidRecord { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("must be an object"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
