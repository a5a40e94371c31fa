/*!
# Stream Tuple Model

The value types that flow through the middleware: a [`StreamElement`] is one
timestamped measurement tuple produced by a wrapper, carrying named
[`FieldValue`]s. [`DataField`] describes one field of a wrapper's output
format and doubles as the column descriptor handed to the storage backend.
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Data types a sensor field can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point number
    Float,
    /// UTF-8 string
    Varchar,
    /// Boolean value
    Boolean,
}

/// One field of a wrapper's output format: a name plus its type.
///
/// The field list returned by `Wrapper::output_format()` determines the
/// columns of the per-source raw table (the `timed` timestamp column is
/// always added implicitly by the storage backend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub name: String,
    pub field_type: FieldType,
}

impl DataField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        DataField {
            name: name.into(),
            field_type,
        }
    }
}

/// A single measurement value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Absent / unknown measurement
    Null,
}

impl FieldValue {
    /// Render this value as a SQL literal for the emitted statement dialect.
    ///
    /// Strings are single-quoted with embedded quotes doubled; `Null`
    /// renders as `NULL`.
    pub fn to_sql_literal(&self) -> String {
        match self {
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            FieldValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            FieldValue::Null => "NULL".to_string(),
        }
    }

    /// Interpret this value as an i64 if it is numeric.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a field value. Wrappers reading JSON
    /// device payloads use this to map measurements field by field; JSON
    /// arrays and objects have no tuple representation and map to `Null`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            _ => FieldValue::Null,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

/// One measurement tuple: a timestamp plus named field values.
///
/// The timestamp is epoch milliseconds and is the tuple's position on the
/// window time axis; for wrappers in remote-timestamp mode it comes from the
/// device, otherwise from the local clock at arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamElement {
    /// Epoch-millisecond timestamp of the measurement
    pub timestamp: i64,
    /// The field data for this tuple
    pub fields: HashMap<String, FieldValue>,
}

impl StreamElement {
    /// Create an element with no fields, timestamped at `timestamp`.
    pub fn new(timestamp: i64) -> Self {
        StreamElement {
            timestamp,
            fields: HashMap::new(),
        }
    }

    /// Create an element timestamped at the local wall clock, for wrappers
    /// not running in remote-timestamp mode.
    pub fn now() -> Self {
        StreamElement::new(chrono::Utc::now().timestamp_millis())
    }

    /// Create an element from a field map.
    pub fn with_fields(timestamp: i64, fields: HashMap<String, FieldValue>) -> Self {
        StreamElement { timestamp, fields }
    }

    /// Builder-style field insertion.
    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literal_rendering() {
        assert_eq!(FieldValue::Integer(42).to_sql_literal(), "42");
        assert_eq!(FieldValue::Boolean(true).to_sql_literal(), "TRUE");
        assert_eq!(FieldValue::Null.to_sql_literal(), "NULL");
        assert_eq!(
            FieldValue::String("it's".to_string()).to_sql_literal(),
            "'it''s'"
        );
    }

    #[test]
    fn test_from_json_scalars() {
        let payload: serde_json::Value =
            serde_json::from_str(r#"{"temp": 21.5, "seq": 7, "ok": true, "gap": null}"#).unwrap();
        assert_eq!(
            FieldValue::from_json(&payload["temp"]),
            FieldValue::Float(21.5)
        );
        assert_eq!(FieldValue::from_json(&payload["seq"]), FieldValue::Integer(7));
        assert_eq!(
            FieldValue::from_json(&payload["ok"]),
            FieldValue::Boolean(true)
        );
        assert_eq!(FieldValue::from_json(&payload["gap"]), FieldValue::Null);
    }

    #[test]
    fn test_element_builder() {
        let el = StreamElement::new(1000).field("temp", FieldValue::Float(21.5));
        assert_eq!(el.timestamp, 1000);
        assert_eq!(el.fields.get("temp"), Some(&FieldValue::Float(21.5)));
    }
}
