//! The user model consumed by the engine's targeting evaluation.

use std::collections::HashMap;

use derive_more::From;
use serde::Serialize;

use crate::Str;

/// Subject of flag evaluation as the engine sees it.
///
/// Derived deterministically from an
/// [`EvaluationContext`](crate::EvaluationContext) and held as the current
/// user until superseded by the next context change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineUser {
    /// Unique subject identifier. May be empty; the engine treats an empty
    /// identifier specially.
    pub identifier: Str,
    pub email: Option<String>,
    pub country: Option<String>,
    /// Remaining attributes, restricted to primitives and lists of
    /// primitives. Null-valued attributes are never stored here.
    pub custom: HashMap<String, UserValue>,
}

/// A custom attribute value: a primitive or a list of primitives.
#[derive(Debug, Clone, PartialEq, From, Serialize)]
#[serde(untagged)]
pub enum UserValue {
    /// A string value.
    String(String),
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// A list of values.
    List(Vec<UserValue>),
}

impl From<&str> for UserValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
