//! Effective parameter resolution for an action call.
//!
//! For every declared `configParams` entry the caller's value wins unless
//! the param is hidden, in which case the configured default is forced.
//! Defaults of the form `board.<card>[.<path>]` are substituted with the
//! live state value of that card.

use serde_json::Value;

use crate::board::{Card, ConfigParam};
use crate::types::JsonMap;

/// Prefix marking a default that references board state.
pub const BOARD_STATE_PREFIX: &str = "board.";

/// Resolve the params an action body will see.
///
/// `user_params` are the caller-supplied values; `board_state` is the flat
/// `cardName -> value` map of the board the action lives on. Undeclared
/// user params pass through untouched.
pub fn resolve_params(card: &Card, user_params: &JsonMap, board_state: &JsonMap) -> JsonMap {
    let mut resolved = user_params.clone();

    for (name, config) in &card.config_params {
        let explicit = user_params.get(name).filter(|v| is_present(v));

        let value = match explicit {
            Some(value) if config.visible => value.clone(),
            _ => {
                if config.default_value.is_null() {
                    resolved.remove(name);
                    continue;
                }
                substitute_state_ref(&config.default_value, board_state)
            }
        };

        resolved.insert(name.clone(), coerce_param(value, config));
    }

    resolved
}

/// Treat `null` and empty strings as "not provided".
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Replace a `board.<card>[.<path>...]` reference with the live value.
///
/// Unknown cards resolve to `null`; non-reference values are returned as-is.
pub fn substitute_state_ref(value: &Value, board_state: &JsonMap) -> Value {
    let Some(path) = value.as_str().and_then(|s| s.strip_prefix(BOARD_STATE_PREFIX)) else {
        return value.clone();
    };

    let mut segments = path.split('.');
    let Some(card) = segments.next() else {
        return Value::Null;
    };

    let mut current = board_state.get(card).cloned().unwrap_or(Value::Null);
    for segment in segments {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            Value::Array(mut items) => match segment.parse::<usize>() {
                Ok(i) if i < items.len() => items.swap_remove(i),
                _ => Value::Null,
            },
            _ => Value::Null,
        };
    }
    current
}

/// Coerce a string value to the param's declared type.
///
/// Non-string values and values that fail to parse are returned unchanged.
pub fn coerce_param(value: Value, config: &ConfigParam) -> Value {
    let text = match value {
        Value::String(text) => text,
        other => return other,
    };
    let trimmed = text.trim();

    let coerced = match config.kind.as_deref() {
        Some("number") => trimmed.parse::<i64>().map(Value::from).ok().or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        }),
        Some("boolean") => match trimmed {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Some("json") | Some("object") | Some("array") => serde_json::from_str(&text).ok(),
        _ => None,
    };

    coerced.unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::board::CardType;

    fn map(value: Value) -> JsonMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn card_with(name: &str, config: ConfigParam) -> Card {
        let mut card = Card::new("k1", "echo", CardType::Action);
        card.config_params.insert(name.into(), config);
        card
    }

    #[test]
    fn board_reference_default_uses_live_state() {
        let card = card_with(
            "msg",
            ConfigParam {
                default_value: json!("board.greeting"),
                ..Default::default()
            },
        );
        let state = map(json!({"greeting": "hi"}));

        let params = resolve_params(&card, &JsonMap::new(), &state);
        assert_eq!(params["msg"], "hi");
    }

    #[test]
    fn explicit_value_wins_when_visible() {
        let card = card_with(
            "msg",
            ConfigParam {
                default_value: json!("board.greeting"),
                ..Default::default()
            },
        );
        let params = resolve_params(
            &card,
            &map(json!({"msg": "yo"})),
            &map(json!({"greeting": "hi"})),
        );
        assert_eq!(params["msg"], "yo");
    }

    #[test]
    fn hidden_param_forces_default() {
        let card = card_with(
            "level",
            ConfigParam {
                visible: false,
                default_value: json!(5),
                kind: None,
            },
        );
        let params = resolve_params(&card, &map(json!({"level": 99})), &JsonMap::new());
        assert_eq!(params["level"], 5);
    }

    #[test]
    fn empty_string_falls_back_to_default() {
        let card = card_with(
            "level",
            ConfigParam {
                default_value: json!("7"),
                kind: Some("number".into()),
                ..Default::default()
            },
        );
        let params = resolve_params(&card, &map(json!({"level": ""})), &JsonMap::new());
        assert_eq!(params["level"], 7);
    }

    #[test]
    fn undeclared_params_pass_through() {
        let card = Card::new("k1", "echo", CardType::Action);
        let params = resolve_params(&card, &map(json!({"extra": 1})), &JsonMap::new());
        assert_eq!(params["extra"], 1);
    }

    #[test]
    fn nested_state_reference() {
        let state = map(json!({"sensor": {"readings": [1, 2, 3]}}));
        assert_eq!(
            substitute_state_ref(&json!("board.sensor.readings.1"), &state),
            json!(2)
        );
        assert_eq!(substitute_state_ref(&json!("board.missing"), &state), Value::Null);
        assert_eq!(substitute_state_ref(&json!("plain"), &state), json!("plain"));
    }

    #[test]
    fn coercion_by_declared_type() {
        let number = ConfigParam {
            kind: Some("number".into()),
            ..Default::default()
        };
        assert_eq!(coerce_param(json!("3"), &number), json!(3));
        assert_eq!(coerce_param(json!("2.5"), &number), json!(2.5));
        assert_eq!(coerce_param(json!("abc"), &number), json!("abc"));

        let boolean = ConfigParam {
            kind: Some("boolean".into()),
            ..Default::default()
        };
        assert_eq!(coerce_param(json!("true"), &boolean), json!(true));

        let object = ConfigParam {
            kind: Some("json".into()),
            ..Default::default()
        };
        assert_eq!(coerce_param(json!("{\"a\":1}"), &object), json!({"a": 1}));
    }
}
