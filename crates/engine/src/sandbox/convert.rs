//! JSON <-> Lua value conversion.
//!
//! `null` maps to `nil`. Tables with a positive sequence length become
//! arrays; every other table (including the empty one) becomes an object.

use boardwise_core::types::JsonMap;
use mlua::{Lua, Result as LuaResult, Value as LuaValue};
use serde_json::Value;

/// Nesting limit, also the guard against self-referencing tables.
const MAX_DEPTH: usize = 64;

pub fn json_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    Ok(match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(map) => json_map_to_lua(lua, map)?,
    })
}

pub fn json_map_to_lua(lua: &Lua, map: &JsonMap) -> LuaResult<LuaValue> {
    let table = lua.create_table()?;
    for (key, value) in map {
        table.raw_set(key.as_str(), json_to_lua(lua, value)?)?;
    }
    Ok(LuaValue::Table(table))
}

pub fn lua_to_json(value: LuaValue) -> LuaResult<Value> {
    to_json(value, 0)
}

fn to_json(value: LuaValue, depth: usize) -> LuaResult<Value> {
    if depth > MAX_DEPTH {
        return Err(mlua::Error::runtime(format!(
            "value nested deeper than {MAX_DEPTH} levels"
        )));
    }

    match value {
        LuaValue::Nil => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::from(i)),
        LuaValue::Number(n) => Ok(serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
        LuaValue::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut items = Vec::with_capacity(len);
                for i in 1..=len {
                    items.push(to_json(table.raw_get::<LuaValue>(i)?, depth + 1)?);
                }
                Ok(Value::Array(items))
            } else {
                let mut map = JsonMap::new();
                for pair in table.pairs::<LuaValue, LuaValue>() {
                    let (key, value) = pair?;
                    let key = match key {
                        LuaValue::String(s) => s.to_str()?.to_string(),
                        LuaValue::Integer(i) => i.to_string(),
                        LuaValue::Number(n) => n.to_string(),
                        LuaValue::Boolean(b) => b.to_string(),
                        other => {
                            return Err(mlua::Error::runtime(format!(
                                "unsupported table key type '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, to_json(value, depth + 1)?);
                }
                Ok(Value::Object(map))
            }
        }
        other => Err(mlua::Error::runtime(format!(
            "cannot convert {} to JSON",
            other.type_name()
        ))),
    }
}
