use super::event::{ChangeEvent, ChangeHeader};
use crate::error::{Result, StreamdexError};
use crate::types::Operation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw capture record as emitted by the capture source (Debezium JSON).
///
/// `value` carries `{before, after, source: {db, table}, op}`, optionally
/// wrapped in a `{schema, payload}` envelope. A missing `value` is a
/// tombstone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Identifies the captured database. Records are accepted only when their
/// topic starts with `{server_name}.{database_name}.`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    pub server_name: String,
    pub database_name: String,
}

impl Default for SourceFilter {
    fn default() -> Self {
        SourceFilter {
            server_name: "dbserver1".to_string(),
            database_name: "inventory".to_string(),
        }
    }
}

impl SourceFilter {
    pub fn topic_prefix(&self) -> String {
        format!("{}.{}.", self.server_name, self.database_name)
    }
}

pub struct Normalizer {
    topic_prefix: String,
}

impl Normalizer {
    pub fn new(filter: &SourceFilter) -> Self {
        Normalizer {
            topic_prefix: filter.topic_prefix(),
        }
    }

    /// Convert a capture record into a [`ChangeEvent`].
    ///
    /// Returns `None` for records that belong to another source, carry an
    /// unsupported operation code, or are malformed. Never fails.
    pub fn normalize(&self, record: &RawRecord) -> Option<ChangeEvent> {
        let topic = match record.topic.as_deref() {
            Some(topic) if topic.starts_with(&self.topic_prefix) => topic,
            other => {
                tracing::debug!("[CDC] ignoring record from topic {:?}", other);
                return None;
            }
        };

        let payload = match record.value.as_ref().map(unwrap_envelope) {
            Some(Value::Object(payload)) => payload,
            _ => {
                tracing::debug!("[CDC] ignoring tombstone on {}", topic);
                return None;
            }
        };

        let operation = match payload.get("op").and_then(Value::as_str) {
            Some(code) => match Operation::from_code(code) {
                Some(op) => op,
                None => {
                    tracing::debug!("[CDC] ignoring op '{}' on {}", code, topic);
                    return None;
                }
            },
            None => {
                tracing::debug!("[CDC] ignoring record without op on {}", topic);
                return None;
            }
        };

        match build_event(operation, payload, record.key.as_ref()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("[CDC] skipping malformed record on {}: {}", topic, e);
                None
            }
        }
    }
}

fn build_event(
    operation: Operation,
    payload: &Map<String, Value>,
    key: Option<&Value>,
) -> Result<ChangeEvent> {
    let source = payload
        .get("source")
        .and_then(Value::as_object)
        .ok_or_else(|| StreamdexError::MalformedEntry("missing 'source' block".to_string()))?;
    let source_database = required_str(source, "db")?;
    let source_table = required_str(source, "table")?;

    let key_fields = match key.map(unwrap_envelope) {
        Some(Value::Object(key)) => key.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let (body, before) = match operation {
        Operation::Create => (image(payload, "after")?, None),
        Operation::Update => (image(payload, "after")?, Some(image(payload, "before")?)),
        Operation::Delete => (image(payload, "before")?, None),
    };

    Ok(ChangeEvent {
        header: ChangeHeader {
            source_database,
            source_table,
            operation,
            key_fields,
        },
        body,
        before,
    })
}

fn required_str(source: &Map<String, Value>, name: &str) -> Result<String> {
    source
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StreamdexError::MalformedEntry(format!("missing 'source.{}'", name)))
}

fn image(payload: &Map<String, Value>, name: &str) -> Result<IndexMap<String, Value>> {
    match payload.get(name) {
        Some(Value::Object(row)) => Ok(row
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        _ => Err(StreamdexError::MalformedEntry(format!(
            "missing '{}' image",
            name
        ))),
    }
}

/// Debezium's JSON converter with schemas enabled wraps every key and value
/// as `{"schema": ..., "payload": ...}`.
fn unwrap_envelope(value: &Value) -> &Value {
    match value {
        Value::Object(obj) if obj.contains_key("schema") && obj.contains_key("payload") => {
            &obj["payload"]
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(&SourceFilter::default())
    }

    fn record(op: &str, before: Value, after: Value) -> RawRecord {
        RawRecord {
            topic: Some("dbserver1.inventory.movies".to_string()),
            key: Some(json!({"movie_id": 1})),
            value: Some(json!({
                "before": before,
                "after": after,
                "source": {"db": "inventory", "table": "movies"},
                "op": op,
            })),
        }
    }

    #[test]
    fn test_create_has_no_before() {
        let event = normalizer()
            .normalize(&record("c", Value::Null, json!({"movie_id": 1, "title": "A"})))
            .unwrap();

        assert_eq!(event.operation(), Operation::Create);
        assert!(event.before.is_none());
        assert_eq!(event.body["title"], json!("A"));
        assert_eq!(event.header.key_fields, vec!["movie_id".to_string()]);
    }

    #[test]
    fn test_update_carries_both_images() {
        let event = normalizer()
            .normalize(&record(
                "u",
                json!({"movie_id": 1, "title": "Old"}),
                json!({"movie_id": 1, "title": "New"}),
            ))
            .unwrap();

        assert_eq!(event.operation(), Operation::Update);
        assert_eq!(event.body["title"], json!("New"));
        assert_eq!(event.before.as_ref().unwrap()["title"], json!("Old"));
    }

    #[test]
    fn test_delete_body_is_pre_image() {
        let pre = json!({"movie_id": 1, "title": "Gone"});
        let event = normalizer()
            .normalize(&record("d", pre.clone(), Value::Null))
            .unwrap();

        assert_eq!(event.operation(), Operation::Delete);
        assert!(event.before.is_none());
        assert_eq!(serde_json::to_value(&event.body).unwrap(), pre);
    }

    #[test]
    fn test_foreign_topic_is_filtered() {
        let mut rec = record("c", Value::Null, json!({"movie_id": 1}));
        rec.topic = Some("otherserver.inventory.movies".to_string());
        assert!(normalizer().normalize(&rec).is_none());

        rec.topic = None;
        assert!(normalizer().normalize(&rec).is_none());
    }

    #[test]
    fn test_unknown_operation_is_dropped() {
        let rec = record("r", Value::Null, json!({"movie_id": 1}));
        assert!(normalizer().normalize(&rec).is_none());

        let mut rec = record("c", Value::Null, json!({"movie_id": 1}));
        rec.value.as_mut().unwrap().as_object_mut().unwrap().remove("op");
        assert!(normalizer().normalize(&rec).is_none());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        // update without a pre-image
        let rec = record("u", Value::Null, json!({"movie_id": 1}));
        assert!(normalizer().normalize(&rec).is_none());

        let mut rec = record("c", Value::Null, json!({"movie_id": 1}));
        rec.value.as_mut().unwrap()["source"] = json!({"db": "inventory"});
        assert!(normalizer().normalize(&rec).is_none());

        let tombstone = RawRecord {
            topic: Some("dbserver1.inventory.movies".to_string()),
            key: Some(json!({"movie_id": 1})),
            value: None,
        };
        assert!(normalizer().normalize(&tombstone).is_none());
    }

    #[test]
    fn test_schema_envelope_is_unwrapped() {
        let rec = RawRecord {
            topic: Some("dbserver1.inventory.actors".to_string()),
            key: Some(json!({"schema": {}, "payload": {"actor_id": 3}})),
            value: Some(json!({
                "schema": {"type": "struct"},
                "payload": {
                    "before": null,
                    "after": {"actor_id": 3, "first_name": "Ada"},
                    "source": {"db": "inventory", "table": "actors"},
                    "op": "c"
                }
            })),
        };

        let event = normalizer().normalize(&rec).unwrap();
        assert_eq!(event.table(), "actors");
        assert_eq!(event.header.key_fields, vec!["actor_id".to_string()]);
        assert_eq!(event.body["first_name"], json!("Ada"));
    }
}
