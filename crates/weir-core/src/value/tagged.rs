//! Runtime values and tagged query values.
//!
//! `Value` is what items carry at runtime; `TaggedValue` is what query tags
//! carry. The two are converted at the engine's edges: tags are unwrapped
//! into values before they reach a callback, and raw values are re-tagged
//! when the engine synthesizes query tuples (e.g. for dynamic joins).

use crate::error::Error;
use crate::query::{Query, QueryTuple};
use crate::stream::Stream;
use crate::value::Item;

/// A runtime value stored in an [`Item`] attribute.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque structured object.
    Object(serde_json::Value),
    /// Nested item.
    Item(Item),
    /// Nested query tuple.
    Tuple(QueryTuple),
    /// Nested query.
    Query(Query),
    /// Live stream handle (runtime only, never serializable).
    Stream(Stream),
}

impl Value {
    /// Whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64 (parses strings, since query literals are text).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a stream handle.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form, used for index keys and attribute-equality
    /// filtering. Two values filter-match when their canonical strings are
    /// equal, so query literals (always text) compare against typed values.
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(v) => v.to_string(),
            Value::Item(item) => item
                .to_json()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "<item>".to_string()),
            Value::Tuple(t) => t.to_query_string(),
            Value::Query(q) => q.to_query_string(),
            Value::Stream(_) => "<stream>".to_string(),
        }
    }

    /// Convert to plain JSON data. Fails for stream handles.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => Ok(serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Object(v) => Ok(v.clone()),
            Value::Item(item) => item.to_json(),
            Value::Tuple(t) => t.to_plain_data(),
            Value::Query(q) => q.to_plain_data(),
            Value::Stream(_) => Err(Error::Serialization(
                "can't convert a stream to plain data".to_string(),
            )),
        }
    }

    /// Build a value from plain JSON data.
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Object(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Item(a), Value::Item(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Query(a), Value::Query(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a.same_channel(b),
            _ => false,
        }
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A value carried by a query tag.
///
/// Only `NoValue` may appear where "not provided" is meaningful; `Abstract`
/// marks a placeholder that can never be unwrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    /// No value provided.
    NoValue,
    /// Placeholder that can never be unwrapped.
    Abstract,
    /// String literal. Numbers in queries are carried as strings.
    String(String),
    /// Boolean literal.
    Bool(bool),
    /// Opaque structured object.
    Object(serde_json::Value),
    /// Nested item.
    Item(Item),
    /// Nested query tuple.
    Tuple(QueryTuple),
    /// Nested query.
    Query(Query),
}

impl TaggedValue {
    /// Whether this tag provides no value.
    pub fn is_no_value(&self) -> bool {
        matches!(self, TaggedValue::NoValue)
    }

    /// Wrap a runtime value. Numbers become strings (query literals are
    /// text); nulls become `NoValue`; stream handles have no tagged form
    /// and degrade to `NoValue`.
    pub fn from_value(value: &Value) -> TaggedValue {
        match value {
            Value::Null => TaggedValue::NoValue,
            Value::Bool(b) => TaggedValue::Bool(*b),
            Value::Int(i) => TaggedValue::String(i.to_string()),
            Value::Float(f) => TaggedValue::String(f.to_string()),
            Value::String(s) => TaggedValue::String(s.clone()),
            Value::Object(v) => TaggedValue::Object(v.clone()),
            Value::Item(item) => TaggedValue::Item(item.clone()),
            Value::Tuple(t) => TaggedValue::Tuple(t.clone()),
            Value::Query(q) => TaggedValue::Query(q.clone()),
            Value::Stream(_) => TaggedValue::NoValue,
        }
    }

    /// Unwrap into a runtime value. `NoValue` unwraps to null; `Abstract`
    /// fails with [`Error::InvalidState`].
    pub fn unwrap(&self) -> Result<Value, Error> {
        match self {
            TaggedValue::NoValue => Ok(Value::Null),
            TaggedValue::Abstract => Err(Error::InvalidState(
                "can't unwrap an abstract value".to_string(),
            )),
            TaggedValue::String(s) => Ok(Value::String(s.clone())),
            TaggedValue::Bool(b) => Ok(Value::Bool(*b)),
            TaggedValue::Object(v) => Ok(Value::Object(v.clone())),
            TaggedValue::Item(item) => Ok(Value::Item(item.clone())),
            TaggedValue::Tuple(t) => Ok(Value::Tuple(t.clone())),
            TaggedValue::Query(q) => Ok(Value::Query(q.clone())),
        }
    }

    /// Display form used in canonical query strings.
    pub fn to_display_string(&self) -> String {
        match self {
            TaggedValue::NoValue => "<no_value>".to_string(),
            TaggedValue::Abstract => "<abstract>".to_string(),
            TaggedValue::String(s) => s.clone(),
            TaggedValue::Bool(b) => b.to_string(),
            TaggedValue::Object(v) => v.to_string(),
            TaggedValue::Item(item) => item
                .to_json()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "<item>".to_string()),
            TaggedValue::Tuple(t) => format!("({})", t.to_query_string()),
            TaggedValue::Query(q) => format!("({})", q.to_query_string()),
        }
    }
}

impl From<&str> for TaggedValue {
    fn from(s: &str) -> Self {
        TaggedValue::String(s.to_string())
    }
}

impl From<String> for TaggedValue {
    fn from(s: String) -> Self {
        TaggedValue::String(s)
    }
}

impl From<i64> for TaggedValue {
    fn from(i: i64) -> Self {
        TaggedValue::String(i.to_string())
    }
}

impl From<bool> for TaggedValue {
    fn from(b: bool) -> Self {
        TaggedValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_never_unwraps() {
        let err = TaggedValue::Abstract.unwrap().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_numbers_tag_as_strings() {
        assert_eq!(
            TaggedValue::from_value(&Value::Int(5)),
            TaggedValue::String("5".to_string())
        );
    }

    #[test]
    fn test_no_value_unwraps_to_null() {
        assert_eq!(TaggedValue::NoValue.unwrap().unwrap(), Value::Null);
    }

    #[test]
    fn test_canonical_string_matches_across_types() {
        // "5" (query literal) and Int(5) (callback output) must filter-match.
        assert_eq!(
            Value::String("5".into()).canonical_string(),
            Value::Int(5).canonical_string()
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let v = Value::from_json(serde_json::json!({"a": 1}));
        assert!(matches!(v, Value::Object(_)));
        assert_eq!(v.to_json().unwrap(), serde_json::json!({"a": 1}));

        assert_eq!(Value::from_json(serde_json::json!(7)), Value::Int(7));
    }
}
