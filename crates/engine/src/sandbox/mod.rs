//! Rule execution sandbox.
//!
//! Every execution gets a fresh Lua state on a blocking thread, a
//! whitelist-only environment and two limits: a wall-clock timeout and an
//! instruction budget enforced by a VM hook. Collaborators that do I/O
//! (`http`, `api.run`) are async Lua functions driven by the same thread.

pub mod convert;
pub mod env;
pub mod host;
pub mod source;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use boardwise_core::types::JsonMap;
use boardwise_core::CallStack;
use mlua::{Function, HookTriggers, Lua, MultiValue, Value as LuaValue, VmState};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::ActionError;

pub use env::LogTarget;
pub use host::ActionHost;
pub use source::{PreparedRule, RuleCache, RuleKind};

use convert::{json_map_to_lua, json_to_lua, lua_to_json};

/// Instructions between two limit checks.
const CHECK_EVERY: u32 = 10_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a rule did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("{message}")]
    Runtime { message: String, traceback: String },

    #[error("rule timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("instruction limit exceeded ({0})")]
    InstructionLimit(u64),

    /// A nested `api.run` failed; the inner failure is kept intact.
    #[error(transparent)]
    Nested(Box<ActionError>),

    #[error("sandbox failure: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Traceback text, when the failure carries one.
    pub fn traceback(&self) -> String {
        match self {
            Self::Runtime { traceback, .. } => traceback.clone(),
            _ => String::new(),
        }
    }
}

/// Raised from the VM hook.
#[derive(Debug, Clone, thiserror::Error)]
enum LimitExceeded {
    #[error("rule exceeded its time budget")]
    Deadline(Duration),
    #[error("rule exceeded its instruction budget")]
    Instructions(u64),
}

fn find_external<T: std::error::Error + 'static>(err: &mlua::Error) -> Option<&T> {
    match err {
        mlua::Error::ExternalError(inner) => inner.as_ref().downcast_ref::<T>(),
        mlua::Error::CallbackError { cause, .. } => find_external(cause),
        mlua::Error::WithContext { cause, .. } => find_external(cause),
        _ => None,
    }
}

fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        mlua::Error::WithContext { cause, .. } => root_message(cause),
        other => other.to_string(),
    }
}

impl From<mlua::Error> for SandboxError {
    fn from(err: mlua::Error) -> Self {
        if let Some(nested) = find_external::<ActionError>(&err) {
            return Self::Nested(Box::new(nested.clone()));
        }
        if let Some(limit) = find_external::<LimitExceeded>(&err) {
            return match limit {
                LimitExceeded::Deadline(d) => Self::Timeout(*d),
                LimitExceeded::Instructions(n) => Self::InstructionLimit(*n),
            };
        }
        if let mlua::Error::SyntaxError { message, .. } = &err {
            return Self::Compile(message.clone());
        }

        let full = root_message(&err);
        let message = full
            .split_once("\nstack traceback:")
            .map(|(head, _)| head.to_string())
            .unwrap_or_else(|| full.clone());
        Self::Runtime {
            message,
            traceback: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// Everything an action rule receives.
pub struct ActionScope {
    pub board_id: String,
    pub name: String,
    /// `req`: method, path and query of the triggering request.
    pub request: Value,
    pub states: Value,
    pub board_actions: Value,
    pub board: JsonMap,
    pub user_params: JsonMap,
    pub params: JsonMap,
    pub token: String,
    pub context: Value,
    /// Stack including the running action's own frame.
    pub call_stack: CallStack,
    pub host: Arc<dyn ActionHost>,
}

/// Result of an action rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub value: Value,
    /// The shared context as the body left it.
    pub context: Value,
}

/// Everything a value-card rule receives.
pub struct ValueScope {
    pub board_id: String,
    pub card_name: String,
    pub params: JsonMap,
    pub states: Value,
    pub board: JsonMap,
    pub card: Value,
    pub memory: Value,
}

/// Result of a value-card rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueOutcome {
    pub value: Value,
    /// Scratch memory as the body left it.
    pub memory: Value,
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

pub struct Sandbox {
    cache: RuleCache,
    http: reqwest::Client,
    timeout: Duration,
    max_instructions: u64,
}

impl Sandbox {
    pub fn new(config: &EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.rule_timeout)
            .build()
            .unwrap_or_default();
        Self {
            cache: RuleCache::default(),
            http,
            timeout: config.rule_timeout,
            max_instructions: config.max_instructions,
        }
    }

    /// Run an action rule body.
    pub async fn run_action(&self, body: &str, scope: ActionScope) -> Result<ActionOutcome, SandboxError> {
        let rule = self.cache.get_or_prepare(RuleKind::Action, body)?;
        let http = self.http.clone();

        self.isolated(move |lua, limits| async move {
            let target = LogTarget {
                board: scope.board_id.clone(),
                card: scope.name.clone(),
            };
            let func = lua
                .load(rule.chunk.as_str())
                .set_name(format!("={}/{}", scope.board_id, scope.name))
                .set_environment(env::build_env(&lua, &target)?)
                .into_function()?;

            let context = json_to_lua(&lua, &scope.context)?;
            let context = match context {
                LuaValue::Nil => LuaValue::Table(lua.create_table()?),
                other => other,
            };
            let stack_trace = serde_json::to_value(&scope.call_stack)
                .map_err(|e| SandboxError::Internal(e.to_string()))?;

            let args: MultiValue = [
                json_to_lua(&lua, &scope.request)?,
                LuaValue::Table(lua.create_table()?),
                json_to_lua(&lua, &Value::String(scope.board_id.clone()))?,
                json_to_lua(&lua, &Value::String(scope.name.clone()))?,
                json_to_lua(&lua, &scope.states)?,
                json_to_lua(&lua, &scope.board_actions)?,
                json_map_to_lua(&lua, &scope.board)?,
                json_map_to_lua(&lua, &scope.user_params)?,
                json_map_to_lua(&lua, &scope.params)?,
                json_to_lua(&lua, &Value::String(scope.token.clone()))?,
                context.clone(),
                LuaValue::Table(env::http_table(&lua, &http)?),
                LuaValue::Table(env::api_table(&lua, scope.host, scope.call_stack.clone())?),
                LuaValue::Table(env::logger_table(&lua, &target)?),
                json_to_lua(&lua, &stack_trace)?,
            ]
            .into_iter()
            .collect();

            let returned: LuaValue = limits.drive(&lua, func, args).await?;
            Ok(ActionOutcome {
                value: lua_to_json(returned)?,
                context: lua_to_json(context)?,
            })
        })
        .await
    }

    /// Run a value-card rule body.
    pub async fn run_value(&self, body: &str, scope: ValueScope) -> Result<ValueOutcome, SandboxError> {
        let rule = self.cache.get_or_prepare(RuleKind::Value, body)?;

        self.isolated(move |lua, limits| async move {
            let target = LogTarget {
                board: scope.board_id.clone(),
                card: scope.card_name.clone(),
            };
            let func = lua
                .load(rule.chunk.as_str())
                .set_name(format!("={}/{}", scope.board_id, scope.card_name))
                .set_environment(env::build_env(&lua, &target)?)
                .into_function()?;

            let memory = match json_to_lua(&lua, &scope.memory)? {
                LuaValue::Table(t) => LuaValue::Table(t),
                _ => LuaValue::Table(lua.create_table()?),
            };

            let args: MultiValue = [
                json_map_to_lua(&lua, &scope.params)?,
                json_to_lua(&lua, &scope.states)?,
                json_map_to_lua(&lua, &scope.board)?,
                json_to_lua(&lua, &scope.card)?,
                memory.clone(),
            ]
            .into_iter()
            .collect();

            let returned: LuaValue = limits.drive(&lua, func, args).await?;
            Ok(ValueOutcome {
                value: lua_to_json(returned)?,
                memory: lua_to_json(memory)?,
            })
        })
        .await
    }

    /// Run `job` against a fresh Lua state on a blocking thread.
    async fn isolated<T, F, Fut>(&self, job: F) -> Result<T, SandboxError>
    where
        T: Send + 'static,
        F: FnOnce(Lua, Limits) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SandboxError>>,
    {
        let limits = Limits {
            timeout: self.timeout,
            max_instructions: self.max_instructions,
        };
        let handle = tokio::runtime::Handle::current();

        let task = tokio::task::spawn_blocking(move || {
            let lua = Lua::new();
            handle.block_on(async move {
                match tokio::time::timeout(limits.timeout, job(lua, limits)).await {
                    Ok(result) => result,
                    Err(_) => Err(SandboxError::Timeout(limits.timeout)),
                }
            })
        });

        task.await
            .map_err(|e| SandboxError::Internal(format!("rule task failed: {e}")))?
    }
}

/// Budgets for one rule run.
///
/// The outer timeout only fires while the rule is parked on I/O; CPU-bound
/// code is stopped by the VM hook, which must sit on the coroutine that
/// actually executes the body.
#[derive(Debug, Clone, Copy)]
struct Limits {
    timeout: Duration,
    max_instructions: u64,
}

impl Limits {
    /// Run `func` as a coroutine with the limit hook attached.
    async fn drive(self, lua: &Lua, func: Function, args: MultiValue) -> mlua::Result<LuaValue> {
        let thread = lua.create_thread(func)?;
        let deadline = Instant::now() + self.timeout;
        let executed = AtomicU64::new(0);
        let Limits {
            timeout,
            max_instructions,
        } = self;

        thread.set_hook(
            HookTriggers::new().every_nth_instruction(CHECK_EVERY),
            move |_lua, _debug| {
                let total = executed.fetch_add(u64::from(CHECK_EVERY), Ordering::Relaxed)
                    + u64::from(CHECK_EVERY);
                if total > max_instructions {
                    return Err(mlua::Error::external(LimitExceeded::Instructions(max_instructions)));
                }
                if Instant::now() >= deadline {
                    return Err(mlua::Error::external(LimitExceeded::Deadline(timeout)));
                }
                Ok(VmState::Continue)
            },
        );

        thread.into_async(args).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
