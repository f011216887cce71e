//! Builds `SELECT * FROM func(p_name := literal, ...)` calls from typed params.

use crate::error::Error;
use crate::sql::params::{Param, ParamType};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Prefix applied to every named argument.
pub const PARAM_PREFIX: &str = "p_";

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("static pattern")
    })
}

fn check_identifier(name: &str) -> Result<(), Error> {
    if identifier_re().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Quote text as a PostgreSQL string literal (same rules as `quote_literal`).
pub fn quote_literal(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

fn bool_literal(b: bool) -> String {
    let literal = if b { "TRUE" } else { "FALSE" };
    literal.to_string()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "t" | "true" | "y" | "yes" | "on"
        ),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text form of a value before quoting: strings as-is, everything else as JSON.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Literal for a caller-supplied value: text is quoted, other scalars pass through.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => bool_literal(*b),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        Value::Array(_) | Value::Object(_) => quote_literal(&value.to_string()),
    }
}

/// Literal for a declared request param, chosen by its declared type.
pub fn param_literal(param: &Param) -> String {
    match param.kind {
        ParamType::Null => "NULL".to_string(),
        ParamType::Boolean => bool_literal(truthy(&param.value)),
        ParamType::String | ParamType::Array | ParamType::Object => quote_literal(&text(&param.value)),
        ParamType::Integer | ParamType::Float => match &param.value {
            Value::Number(n) => n.to_string(),
            Value::Null => "NULL".to_string(),
            other => quote_literal(&text(other)),
        },
    }
}

fn token(name: &str, literal: String) -> Result<String, Error> {
    check_identifier(name)?;
    Ok(format!("{}{} := {}", PARAM_PREFIX, name, literal))
}

/// Marshal caller-supplied pairs. Empty input gives an empty string.
pub fn marshal_explicit(items: &[(String, Value)]) -> Result<String, Error> {
    let tokens = items
        .iter()
        .map(|(name, value)| token(name, literal(value)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens.join(", "))
}

/// Marshal declared request params. Empty input gives an empty string.
pub fn marshal_params(params: &[Param]) -> Result<String, Error> {
    let tokens = params
        .iter()
        .map(|p| token(&p.name, param_literal(p)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens.join(", "))
}

/// `SELECT * FROM <function>(<params>)`. `function` may be schema-qualified.
pub fn function_call(function: &str, params: &str) -> Result<String, Error> {
    if !function_re().is_match(function) {
        return Err(Error::InvalidIdentifier(function.to_string()));
    }
    Ok(format!("SELECT * FROM {}({})", function, params))
}
