//! Scalar values exchanged between records and the store.

use datafusion::prelude::{lit, Expr};
use datafusion::scalar::ScalarValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A scalar field value.
///
/// Records are JSON documents while store rows come back as Arrow cells; both
/// are normalized into this type. Two values are considered the same
/// candidate when their [`match_key`](Value::match_key)s are equal, so a
/// numeric `42` in a record matches a `"42"` read from a text column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Converts a JSON value. Arrays and objects are not scalars and yield `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Value::Null),
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            JsonValue::String(s) => Some(Value::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// Converts a DataFusion scalar read back from the store.
    pub fn from_scalar(scalar: &ScalarValue) -> Self {
        if scalar.is_null() {
            return Value::Null;
        }
        match scalar {
            ScalarValue::Boolean(Some(b)) => Value::Bool(*b),
            ScalarValue::Int8(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::Int16(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::Int32(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::Int64(Some(v)) => Value::Int(*v),
            ScalarValue::UInt8(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::UInt16(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::UInt32(Some(v)) => Value::Int(i64::from(*v)),
            ScalarValue::UInt64(Some(v)) => match i64::try_from(*v) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(v.to_string()),
            },
            ScalarValue::Float32(Some(v)) => Value::Float(f64::from(*v)),
            ScalarValue::Float64(Some(v)) => Value::Float(*v),
            ScalarValue::Utf8(Some(s))
            | ScalarValue::LargeUtf8(Some(s))
            | ScalarValue::Utf8View(Some(s)) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical text used to compare candidates with store results.
    ///
    /// Integral floats render without a fractional part so `3.0` and `3` match.
    pub fn match_key(&self) -> String {
        match self {
            Value::Null => "\u{0}".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                (*f as i64).to_string()
            }
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Builds a DataFusion literal for this value.
    pub fn to_literal(&self) -> Expr {
        match self {
            Value::Null => lit(ScalarValue::Null),
            Value::Bool(b) => lit(*b),
            Value::Int(i) => lit(*i),
            Value::Float(f) => lit(*f),
            Value::Text(s) => lit(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.match_key()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// An insertion-ordered set of distinct values, keyed by [`Value::match_key`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
    entries: IndexMap<String, Value>,
}

impl ValueSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning false if an equal value was already present.
    pub fn insert(&mut self, value: Value) -> bool {
        let key = value.match_key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    /// Returns true if an equal value is present.
    pub fn contains(&self, value: &Value) -> bool {
        self.entries.contains_key(&value.match_key())
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Values of `self` that are not in `other`.
    pub fn difference(&self, other: &ValueSet) -> ValueSet {
        self.iter()
            .filter(|v| !other.contains(v))
            .cloned()
            .collect()
    }

    /// Values of `self` that are also in `other`, in `self`'s order.
    pub fn intersection(&self, other: &ValueSet) -> ValueSet {
        self.iter().filter(|v| other.contains(v)).cloned().collect()
    }

    /// Builds one literal per value, for an `IN (...)` list.
    pub fn to_literals(&self) -> Vec<Expr> {
        self.iter().map(Value::to_literal).collect()
    }
}

impl FromIterator<Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = ValueSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = &'a Value;
    type IntoIter = indexmap::map::Values<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
