use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The three value shapes a feature flag can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    String,
    Number,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Number => "number",
        }
    }

    pub fn parse(s: &str) -> Option<ValueType> {
        match s {
            "boolean" => Some(ValueType::Boolean),
            "string" => Some(ValueType::String),
            "number" => Some(ValueType::Number),
            _ => None,
        }
    }
}

/// A named, typed, resource-scoped configuration value.
/// `value` is always kept in agreement with `value_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: Uuid,
    pub name: String,
    pub resource_id: String,
    pub value_type: ValueType,
    pub value: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Canonical zero-value for each type.
pub fn default_for(ty: ValueType) -> Value {
    match ty {
        ValueType::Boolean => Value::Bool(false),
        ValueType::String => Value::String(String::new()),
        ValueType::Number => Value::from(0),
    }
}

/// Convert an arbitrary JSON value to the target type. Total: never fails,
/// always yields a value of the declared type.
pub fn coerce(value: &Value, ty: ValueType) -> Value {
    match ty {
        ValueType::Boolean => Value::Bool(truthy(value)),
        ValueType::String => match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
        ValueType::Number => match value {
            Value::Number(n) => Value::Number(n.clone()),
            Value::String(s) => parse_number(s),
            Value::Bool(b) => Value::from(if *b { 1 } else { 0 }),
            _ => Value::from(0),
        },
    }
}

/// Map a runtime value back to a declared type. Used when rehydrating
/// persisted rows whose stored type tag is missing or unreadable.
pub fn infer_type(value: &Value) -> ValueType {
    match value {
        Value::Bool(_) => ValueType::Boolean,
        Value::Number(_) => ValueType::Number,
        _ => ValueType::String,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_number(s: &str) -> Value {
    if let Ok(i) = s.trim().parse::<i64>() {
        return Value::from(i);
    }
    match s.trim().parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0)),
        _ => Value::from(0),
    }
}
