//! The whitelist-only global environment of a rule body, plus the
//! collaborator tables (`logger`, `http`, `api`) handed in as parameters.

use std::sync::Arc;

use boardwise_core::types::JsonMap;
use boardwise_core::CallStack;
use mlua::{Lua, MultiValue, Result as LuaResult, Table, Value as LuaValue};
use serde_json::Value;

use super::convert::{json_to_lua, lua_to_json};
use super::host::ActionHost;

/// Globals copied from the base Lua state.
const SAFE_GLOBALS: &[&str] = &[
    "tostring",
    "tonumber",
    "type",
    "pairs",
    "ipairs",
    "next",
    "select",
    "error",
    "pcall",
    "assert",
    "setmetatable",
    "getmetatable",
    "rawget",
    "rawset",
    "rawlen",
    "rawequal",
];

/// Standard libraries exposed as-is.
const SAFE_LIBS: &[&str] = &["math", "string", "table"];

/// Board and card a rule runs for; tagged onto every log line.
#[derive(Debug, Clone)]
pub struct LogTarget {
    pub board: String,
    pub card: String,
}

fn display(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::String(s) => s
            .to_str()
            .map_or_else(|_| "<invalid utf8>".into(), |s| s.to_string()),
        LuaValue::Table(_) => match lua_to_json(value.clone()) {
            Ok(json) => json.to_string(),
            Err(_) => "<table>".to_string(),
        },
        other => other.type_name().to_string(),
    }
}

fn join(args: &MultiValue) -> String {
    args.iter().map(display).collect::<Vec<_>>().join("\t")
}

/// Build the global environment table of a rule chunk.
pub fn build_env(lua: &Lua, target: &LogTarget) -> LuaResult<Table> {
    let env = lua.create_table()?;
    let globals = lua.globals();

    for name in SAFE_GLOBALS.iter().chain(SAFE_LIBS) {
        let value = globals.get::<LuaValue>(*name)?;
        if !value.is_nil() {
            env.set(*name, value)?;
        }
    }

    let print_target = target.clone();
    let print = lua.create_function(move |_, args: MultiValue| {
        tracing::info!(
            board = %print_target.board,
            card = %print_target.card,
            "{}",
            join(&args)
        );
        Ok(())
    })?;
    env.set("print", print)?;

    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|_, value: LuaValue| {
            let json = lua_to_json(value)?;
            serde_json::to_string(&json).map_err(mlua::Error::external)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let json: Value = serde_json::from_str(&text).map_err(mlua::Error::external)?;
            json_to_lua(lua, &json)
        })?,
    )?;
    env.set("json", json)?;

    Ok(env)
}

/// `logger.debug/info/warn/error(...)`.
pub fn logger_table(lua: &Lua, target: &LogTarget) -> LuaResult<Table> {
    let logger = lua.create_table()?;
    for level in ["debug", "info", "warn", "error"] {
        let target = target.clone();
        let log = lua.create_function(move |_, args: MultiValue| {
            let message = join(&args);
            let (board, card) = (&target.board, &target.card);
            match level {
                "debug" => tracing::debug!(%board, %card, "{message}"),
                "info" => tracing::info!(%board, %card, "{message}"),
                "warn" => tracing::warn!(%board, %card, "{message}"),
                _ => tracing::error!(%board, %card, "{message}"),
            }
            Ok(())
        })?;
        logger.set(level, log)?;
    }
    Ok(logger)
}

async fn decode_body(response: reqwest::Response) -> reqwest::Result<Value> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// `http.get(url)` and `http.post(url, body)`.
pub fn http_table(lua: &Lua, client: &reqwest::Client) -> LuaResult<Table> {
    let http = lua.create_table()?;

    let get_client = client.clone();
    http.set(
        "get",
        lua.create_async_function(move |lua, url: String| {
            let client = get_client.clone();
            async move {
                let response = client.get(&url).send().await.map_err(mlua::Error::external)?;
                let body = decode_body(response).await.map_err(mlua::Error::external)?;
                json_to_lua(&lua, &body)
            }
        })?,
    )?;

    let post_client = client.clone();
    http.set(
        "post",
        lua.create_async_function(move |lua, (url, body): (String, LuaValue)| {
            let client = post_client.clone();
            async move {
                let request = match lua_to_json(body)? {
                    Value::String(text) => client.post(&url).body(text),
                    Value::Null => client.post(&url),
                    json => client.post(&url).json(&json),
                };
                let response = request.send().await.map_err(mlua::Error::external)?;
                let body = decode_body(response).await.map_err(mlua::Error::external)?;
                json_to_lua(&lua, &body)
            }
        })?,
    )?;

    Ok(http)
}

/// `api.run(boardId, action, params)` and `api.value(boardId, card)`.
pub fn api_table(lua: &Lua, host: Arc<dyn ActionHost>, call_stack: CallStack) -> LuaResult<Table> {
    let api = lua.create_table()?;

    let run_host = Arc::clone(&host);
    api.set(
        "run",
        lua.create_async_function(
            move |lua, (board, action, params): (String, String, Option<LuaValue>)| {
                let host = Arc::clone(&run_host);
                let call_stack = call_stack.clone();
                async move {
                    let params = match params.map(lua_to_json).transpose()? {
                        Some(Value::Object(map)) => map,
                        None | Some(Value::Null) => JsonMap::new(),
                        Some(_) => {
                            return Err(mlua::Error::RuntimeError(
                                "api.run: params must be a table".into(),
                            ))
                        }
                    };
                    let value = host
                        .run_action(&board, &action, params, call_stack)
                        .await
                        .map_err(mlua::Error::external)?;
                    json_to_lua(&lua, &value)
                }
            },
        )?,
    )?;

    api.set(
        "value",
        lua.create_function(move |lua, (board, card): (String, String)| {
            let value = host.state_value(&board, &card).unwrap_or(Value::Null);
            json_to_lua(lua, &value)
        })?,
    )?;

    Ok(api)
}
