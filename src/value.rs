//! Record data model
//!
//! Alert records are a tree of [`Value`]s. Widths (int vs long, float vs
//! double) and union branches are not part of the value; the schema decides
//! them when the record is encoded.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{AlertError, Result};

/// A single field value
///
/// A JSON object loads as a `Record` but decodes from a map-typed field as a
/// `Map`; the two compare equal when their entries do.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Record(Record),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Convert an arbitrary JSON value. Objects become records.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as JSON. Bytes become arrays of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(r), Value::Map(m)) | (Value::Map(m), Value::Record(r)) => r.fields == *m,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Field name to value mapping. Equality ignores field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match Value::from_json(json) {
            Value::Record(r) => Ok(r),
            other => Err(AlertError::decoding(format!(
                "expected a JSON object for a record, found {}",
                other.kind()
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this record without the named fields
    pub fn without(&self, names: &[&str]) -> Record {
        self.fields
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nested_objects_become_records() {
        let record = Record::from_json(&json!({
            "alertId": 1,
            "candidate": {"ra": 150.25, "filter": "o"},
            "tags": [1, null]
        }))
        .unwrap();

        assert_eq!(record.get("alertId"), Some(&Value::Int(1)));
        let candidate = record.get("candidate").and_then(Value::as_record).unwrap();
        assert_eq!(candidate.get("ra"), Some(&Value::Float(150.25)));
        assert_eq!(
            record.get("tags"),
            Some(&Value::Array(vec![Value::Int(1), Value::Null]))
        );
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Record::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_equality_ignores_insert_order() {
        let a = Record::new().with("x", 1i64).with("y", "two");
        let b = Record::new().with("y", "two").with("x", 1i64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_without_drops_named_fields() {
        let record = Record::new()
            .with("alertId", 7i64)
            .with("cutoutScience", Value::Null);
        let shown = record.without(&["cutoutScience"]);
        assert!(!shown.contains("cutoutScience"));
        assert_eq!(shown.len(), 1);
    }

    #[test]
    fn test_to_json_renders_plain_values() {
        let record = Record::new()
            .with("a", Value::Null)
            .with("b", vec![1u8, 2])
            .with("c", Some("x"));
        assert_eq!(record.to_json(), json!({"a": null, "b": [1, 2], "c": "x"}));
    }
}
