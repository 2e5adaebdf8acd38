//! Return-type coercion for card results.
//!
//! A card may declare a `returnType`; the raw value produced by its rule
//! body is parsed into that shape. When coercion fails (or the body
//! produced `null`) and the card enables a custom fallback, the configured
//! `fallbackValue` is used instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::Card;

/// Declared shape of a card result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    Auto,
    Number,
    String,
    Boolean,
    Object,
    Array,
}

/// A value that could not be converted to the declared type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot coerce {found} to {expected:?}")]
pub struct CoerceError {
    pub expected: ReturnType,
    pub found: &'static str,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl ReturnType {
    /// Convert `value` into this type.
    pub fn coerce(self, value: Value) -> Result<Value, CoerceError> {
        let fail = |found: &'static str| CoerceError {
            expected: self,
            found,
        };

        match (self, value) {
            (ReturnType::Auto, Value::String(s)) => Ok(parse_auto(s)),
            (ReturnType::Auto, other) => Ok(other),

            (ReturnType::Number, v @ Value::Number(_)) => Ok(v),
            (ReturnType::Number, Value::Bool(b)) => Ok(Value::from(u8::from(b))),
            (ReturnType::Number, Value::String(s)) => parse_number(&s).ok_or(fail("string")),

            (ReturnType::String, Value::String(s)) => Ok(Value::String(s)),
            (ReturnType::String, Value::Null) => Err(fail("null")),
            (ReturnType::String, other) => Ok(Value::String(other.to_string())),

            (ReturnType::Boolean, v @ Value::Bool(_)) => Ok(v),
            (ReturnType::Boolean, Value::Number(n)) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
            (ReturnType::Boolean, Value::String(s)) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(fail("string")),
            },

            (ReturnType::Object, v @ Value::Object(_)) => Ok(v),
            (ReturnType::Array, v @ Value::Array(_)) => Ok(v),
            (expected @ (ReturnType::Object | ReturnType::Array), Value::String(s)) => {
                match serde_json::from_str::<Value>(&s) {
                    Ok(v @ Value::Object(_)) if expected == ReturnType::Object => Ok(v),
                    Ok(v @ Value::Array(_)) if expected == ReturnType::Array => Ok(v),
                    _ => Err(fail("string")),
                }
            }

            (_, other) => Err(fail(kind_of(&other))),
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    s.parse::<i64>().map(Value::from).ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    })
}

/// Strings that look like JSON scalars or containers are parsed.
fn parse_auto(s: String) -> Value {
    let trimmed = s.trim();
    let looks_structured = trimmed.starts_with('{') || trimmed.starts_with('[');
    let looks_scalar = trimmed == "true" || trimmed == "false" || parse_number(trimmed).is_some();

    if looks_structured || looks_scalar {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            return parsed;
        }
    }
    Value::String(s)
}

/// Apply a card's declared return handling to a raw rule result.
///
/// 1. coerce through `returnType` (if declared);
/// 2. substitute `fallbackValue` when enabled and coercion failed or the
///    result is `null`;
/// 3. unwrap `responseKey` when the result is an object holding that key.
pub fn post_process(card: &Card, raw: Value) -> Value {
    let (mut value, failed) = match card.return_type {
        Some(kind) => match kind.coerce(raw.clone()) {
            Ok(v) => (v, false),
            Err(e) => {
                if !card.enable_return_custom_fallback {
                    tracing::warn!(card = %card.name, error = %e, "Return coercion failed, keeping raw value");
                }
                (raw, true)
            }
        },
        None => (raw, false),
    };

    if card.enable_return_custom_fallback && (failed || value.is_null()) {
        value = card.fallback_value.clone();
    }

    if let Some(key) = &card.response_key {
        if let Some(inner) = value.as_object().and_then(|o| o.get(key)) {
            return inner.clone();
        }
    }

    value
}
