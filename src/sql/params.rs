//! Typed request parameters and the sources a function call can draw them from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a request parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Null,
    Boolean,
    String,
    Array,
    Object,
    Integer,
    Float,
}

impl ParamType {
    /// Type implied by a JSON value.
    pub fn of(value: &Value) -> ParamType {
        match value {
            Value::Null => ParamType::Null,
            Value::Bool(_) => ParamType::Boolean,
            Value::String(_) => ParamType::String,
            Value::Array(_) => ParamType::Array,
            Value::Object(_) => ParamType::Object,
            Value::Number(n) if n.is_f64() => ParamType::Float,
            Value::Number(_) => ParamType::Integer,
        }
    }
}

/// One inbound request argument. Read-only to this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub value: Value,
    /// Where the param was declared (e.g. "query", "body"). None when the host has no notion of location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Param {
    /// Param whose type is inferred from its value.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Param {
            name: name.into(),
            kind: ParamType::of(&value),
            value,
            location: None,
        }
    }

    pub fn typed(name: impl Into<String>, kind: ParamType, value: Value) -> Self {
        Param {
            name: name.into(),
            kind,
            value,
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Which parameters are passed to a SQL function call.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ParamSource {
    /// Every declared request param.
    #[default]
    All,
    /// Declared params from one location only.
    Location(String),
    /// Caller-supplied name/value pairs, in order.
    Explicit(Vec<(String, Value)>),
    /// No params: the function is called as `func()`.
    None,
}

impl ParamSource {
    pub fn location(name: impl Into<String>) -> Self {
        ParamSource::Location(name.into())
    }

    pub fn explicit<K, I>(items: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        ParamSource::Explicit(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for ParamSource {
    fn from(pass: bool) -> Self {
        if pass {
            ParamSource::All
        } else {
            ParamSource::None
        }
    }
}

impl From<&str> for ParamSource {
    fn from(location: &str) -> Self {
        ParamSource::Location(location.to_string())
    }
}

impl From<serde_json::Map<String, Value>> for ParamSource {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        ParamSource::Explicit(map.into_iter().collect())
    }
}
