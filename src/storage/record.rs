//! Record representation
//!
//! A record is a flat JSON object serialized as one file. Field order is
//! preserved so files stay readable after a rewrite.

use serde_json::{Map, Value};
use std::path::Path;

/// A record: string keys mapped to JSON values
pub type Record = Map<String, Value>;

/// Decode file content into a record.
///
/// Empty, whitespace-only, corrupt (including non-UTF-8) and non-object
/// files are all "absent".
pub(crate) fn decode(path: &Path, content: &[u8]) -> Option<Record> {
    if is_blank(content) {
        tracing::debug!("Empty record file {:?} treated as absent", path);
        return None;
    }

    match serde_json::from_slice::<Value>(content) {
        Ok(Value::Object(record)) => Some(record),
        Ok(Value::Null) => None,
        Ok(other) => {
            tracing::debug!(
                "Record file {:?} holds a {} rather than an object, skipping",
                path,
                type_name(&other)
            );
            None
        }
        Err(e) => {
            tracing::debug!("Corrupt record file {:?} skipped: {}", path, e);
            None
        }
    }
}

/// True for empty or whitespace-only file content
pub(crate) fn is_blank(content: &[u8]) -> bool {
    content.iter().all(u8::is_ascii_whitespace)
}

/// Serialize a record the way it is stored on disk (2-space pretty JSON)
pub(crate) fn encode(record: &Record) -> serde_json::Result<String> {
    serde_json::to_string_pretty(record)
}

/// Decode a JSON-typed column.
///
/// Columns such as ban lists are stored as JSON text. An empty string is an
/// empty array, a string holding valid JSON is decoded, and anything else is
/// returned unchanged.
pub fn parse_json_column(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Array(Vec::new()),
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_object() {
        let record = decode(Path::new("t/1.json"), br#"{"user_id": 1, "role_id": 80}"#).unwrap();
        assert_eq!(record.get("role_id"), Some(&json!(80)));
    }

    #[test]
    fn test_decode_absent_cases() {
        let path = Path::new("t/1.json");
        assert!(decode(path, b"").is_none());
        assert!(decode(path, b"  \n\t").is_none());
        assert!(decode(path, b"{\"user_id\": ").is_none());
        assert!(decode(path, b"null").is_none());
        assert!(decode(path, b"[1, 2]").is_none());
        assert!(decode(path, &[0xff, 0xfe, b'{', b'}']).is_none());
    }

    #[test]
    fn test_encode_preserves_field_order() {
        let mut record = Record::new();
        record.insert("user_id".into(), json!(42));
        record.insert("access".into(), json!(4));
        record.insert("added".into(), json!("today"));

        let text = encode(&record).unwrap();
        assert_eq!(text, "{\n  \"user_id\": 42,\n  \"access\": 4,\n  \"added\": \"today\"\n}");
    }

    #[test]
    fn test_parse_json_column() {
        assert_eq!(parse_json_column(&json!("")), json!([]));
        assert_eq!(parse_json_column(&json!("[1, 2, 3]")), json!([1, 2, 3]));
        assert_eq!(parse_json_column(&json!("not json")), json!("not json"));
        assert_eq!(parse_json_column(&json!([4])), json!([4]));
        assert_eq!(parse_json_column(&json!(null)), json!(null));
    }
}
