//! The tagged value union shared by context attributes and object-typed
//! evaluation results, with conversions from and to JSON trees.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;

/// A value as seen by the host runtime.
///
/// The union is closed so conversion branch coverage is checked statically.
/// `Date` is the one variant without a direct JSON counterpart; it is
/// rendered as an RFC 3339 string on the way out.
///
/// Conveniently implements `From` conversions for the scalar payload types.
///
/// Examples:
/// ```
/// # use flagbridge::Value;
/// let string_attr: Value = "example".into();
/// let int_attr: Value = 42i64.into();
/// let bool_attr: Value = true.into();
/// ```
#[derive(Debug, Clone, PartialEq, From)]
pub enum Value {
    /// A null value or absence of value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
    /// A point in time.
    Date(DateTime<Utc>),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed structure of values.
    Struct(HashMap<String, Value>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Convert a parsed JSON tree into a [`Value`].
    ///
    /// Numbers become [`Value::Int`] when integer-representable and
    /// [`Value::Float`] otherwise, so small integers round-trip as integers.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(number) => {
                if let Some(i) = number.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = number.as_f64() {
                    Value::Float(f)
                } else {
                    // u64 beyond i64 range with no f64 reading; should not
                    // occur for well-formed input.
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(members) => Value::Struct(
                members
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON tree.
    ///
    /// `Date` is rendered as an RFC 3339 string. Non-finite floats become
    /// null as JSON cannot represent them.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => s.clone().into(),
            Value::Date(date) => date.to_rfc3339().into(),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Render as JSON text.
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}
