//! Telemetry readings.
//!
//! A reading is whatever JSON object a sensor client posts: temperature,
//! humidity, a device identifier, a timestamp, or any other producer-defined
//! fields. No schema is enforced beyond "a JSON object". The submitted text is
//! kept so subscribers receive the payload exactly as it was submitted.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::ReadingError;

/// One structured telemetry payload.
///
/// Cheap to clone: the wire text is reference counted.
#[derive(Clone, Debug)]
pub struct Reading {
    fields: Map<String, Value>,
    wire: Arc<str>,
}

impl Reading {
    /// Parse a request body into a reading.
    ///
    /// The body must be a UTF-8 JSON object. Surrounding whitespace is
    /// trimmed from the wire text; everything else is kept verbatim.
    pub fn parse(body: &[u8]) -> Result<Self, ReadingError> {
        let text = std::str::from_utf8(body).map_err(|_| ReadingError::InvalidUtf8)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ReadingError::Empty);
        }

        let value: Value =
            serde_json::from_str(text).map_err(|e| ReadingError::Syntax(e.to_string()))?;
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                wire: Arc::from(text),
            }),
            other => Err(ReadingError::NotAnObject(json_kind(&other))),
        }
    }

    /// Look up a single field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The producer's `device_id`, if it sent one as a string.
    pub fn device_id(&self) -> Option<&str> {
        self.get("device_id").and_then(Value::as_str)
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the payload is `{}`.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The payload's JSON text, as pushed to subscribers.
    pub fn wire(&self) -> &Arc<str> {
        &self.wire
    }

    /// Names from `required` that are absent or `null` in this reading.
    pub fn missing_fields<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| self.get(name).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect()
    }
}

impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn json_kind(value: &Value) -> &'static str {
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
    fn parse_object() {
        let r = Reading::parse(br#"{"temperature":21.5,"device_id":"d1","timestamp":1000}"#)
            .unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.get("temperature"), Some(&json!(21.5)));
        assert_eq!(r.device_id(), Some("d1"));
    }

    #[test]
    fn wire_text_is_verbatim() {
        let body = br#"  {"b": 2, "a": 1}
"#;
        let r = Reading::parse(body).unwrap();
        assert_eq!(&**r.wire(), r#"{"b": 2, "a": 1}"#);
    }

    #[test]
    fn parse_empty_body() {
        assert_eq!(Reading::parse(b"").unwrap_err(), ReadingError::Empty);
        assert_eq!(Reading::parse(b"  \n ").unwrap_err(), ReadingError::Empty);
    }

    #[test]
    fn parse_invalid_utf8() {
        let err = Reading::parse(&[0x7b, 0xff, 0x7d]).unwrap_err();
        assert_eq!(err, ReadingError::InvalidUtf8);
    }

    #[test]
    fn parse_malformed_json() {
        let err = Reading::parse(b"{temperature: 21.5").unwrap_err();
        assert!(matches!(err, ReadingError::Syntax(_)));
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert_eq!(
            Reading::parse(b"[1,2,3]").unwrap_err(),
            ReadingError::NotAnObject("array")
        );
        assert_eq!(
            Reading::parse(b"42").unwrap_err(),
            ReadingError::NotAnObject("number")
        );
        assert_eq!(
            Reading::parse(b"null").unwrap_err(),
            ReadingError::NotAnObject("null")
        );
    }

    #[test]
    fn empty_object_is_a_reading() {
        let r = Reading::parse(b"{}").unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn non_string_device_id_is_ignored() {
        let r = Reading::parse(br#"{"device_id": 7}"#).unwrap();
        assert_eq!(r.device_id(), None);
    }

    #[test]
    fn missing_fields_reports_absent_and_null() {
        let r = Reading::parse(br#"{"temperature": 20, "humidity": null}"#).unwrap();
        let required = vec![
            "temperature".to_string(),
            "humidity".to_string(),
            "light".to_string(),
        ];
        assert_eq!(r.missing_fields(&required), vec!["humidity", "light"]);
        assert!(r.missing_fields(&[]).is_empty());
    }

    #[test]
    fn equality_ignores_formatting() {
        let a = Reading::parse(br#"{"a":1,"b":2}"#).unwrap();
        let b = Reading::parse(br#"{ "b": 2, "a": 1 }"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_as_object() {
        let r = Reading::parse(br#"{"sound": 41.2}"#).unwrap();
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"sound": 41.2}));
    }
}
