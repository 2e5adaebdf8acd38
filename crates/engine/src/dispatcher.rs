//! Action dispatcher.
//!
//! Runs one action invocation end to end: resolve the card (or preset
//! alias) on the live board document, refuse recursive calls, resolve
//! params, fire pre-triggers, execute the rule body, coerce and store the
//! result, announce it, then fire post-triggers. Failures after resolution
//! are published on the bus and returned as [`ActionError`]; nothing
//! escapes as a panic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boardwise_core::preset::resolve_action;
use boardwise_core::types::JsonMap;
use boardwise_core::{params, returns, CallFrame, CallStack, LockManager, TriggerKind};
use boardwise_events::topics::{self, ActionPhase};
use boardwise_events::{BoardEvent, EventBus, Report, StateStore, BOARDS_GROUP};
use boardwise_store::Store;
use serde_json::{json, Value};

use crate::catalog::ActionCatalog;
use crate::error::ActionError;
use crate::memory::SharedContext;
use crate::sandbox::{ActionHost, ActionScope, Sandbox, SandboxError};
use crate::status::StatusTable;
use crate::token::{Access, TokenSigner};

/// One action invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub board: String,
    /// Card name or `card.preset` alias.
    pub action: String,
    pub params: JsonMap,
    /// Frames already in flight for this external request.
    pub call_stack: CallStack,
    /// Request shape handed to the body as `req`.
    pub request: Value,
    pub access: Access,
}

impl RunRequest {
    /// A top-level request with an empty call stack.
    pub fn new(board: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            action: action.into(),
            params: JsonMap::new(),
            call_stack: CallStack::new(),
            request: json!({}),
            access: Access::Privileged,
        }
    }

    pub fn with_params(mut self, params: JsonMap) -> Self {
        self.params = params;
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = request;
        self
    }

    pub fn with_call_stack(mut self, call_stack: CallStack) -> Self {
        self.call_stack = call_stack;
        self
    }
}

pub struct Dispatcher {
    store: Store,
    locks: Arc<LockManager>,
    states: Arc<StateStore>,
    bus: Arc<EventBus>,
    sandbox: Arc<Sandbox>,
    catalog: Arc<ActionCatalog>,
    status: StatusTable,
    context: SharedContext,
    signer: TokenSigner,
    lock_timeout: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        locks: Arc<LockManager>,
        states: Arc<StateStore>,
        sandbox: Arc<Sandbox>,
        catalog: Arc<ActionCatalog>,
        signer: TokenSigner,
        lock_timeout: Duration,
    ) -> Self {
        let bus = Arc::clone(states.bus());
        Self {
            status: StatusTable::new(Arc::clone(&bus)),
            context: SharedContext::new(),
            store,
            locks,
            states,
            bus,
            sandbox,
            catalog,
            signer,
            lock_timeout,
        }
    }

    pub fn status(&self) -> &StatusTable {
        &self.status
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    fn host(self: &Arc<Self>) -> Arc<dyn ActionHost> {
        Arc::new(DispatchHost(Arc::clone(self)))
    }

    fn publish(&self, board: &str, action: &str, phase: ActionPhase, payload: Value) {
        self.bus.publish(
            BoardEvent::new(topics::action(board, action, phase))
                .with_from("dispatcher")
                .with_payload(payload),
        );
    }

    /// Run an action and return its post-processed value.
    pub async fn run(self: &Arc<Self>, req: RunRequest) -> Result<Value, ActionError> {
        let board_id = req.board.as_str();

        let board = match self.store.boards.read(board_id).await {
            Ok(board) => board,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(board = %board_id, error = %e, "Board unreadable, treating as missing");
                }
                return Err(ActionError::NotFound {
                    board: board_id.to_string(),
                    action: req.action.clone(),
                });
            }
        };

        let Some(resolved) = resolve_action(&board, &req.action) else {
            return Err(ActionError::NotFound {
                board: board_id.to_string(),
                action: req.action.clone(),
            });
        };
        let alias = resolved.alias();
        let card = resolved.card;

        if !req.access.permits(card.tokens.run.as_deref()) {
            return Err(ActionError::Forbidden(format!(
                "a valid run token is required for '{alias}'"
            )));
        }

        if req.call_stack.contains(&card.name, board_id) {
            let err = ActionError::RecursiveCall {
                board: board_id.to_string(),
                action: card.name.clone(),
                call_stack: req.call_stack.clone(),
            };
            tracing::warn!(board = %board_id, action = %alias, depth = req.call_stack.len(), "Recursive action call refused");
            self.publish(board_id, &alias, ActionPhase::Error, err.payload());
            return Err(err);
        }
        let stack = req.call_stack.push(CallFrame::new(card.name.clone(), board_id));

        let board_state = self.states.get_by_tag(BOARDS_GROUP, board_id);
        let resolved_params = params::resolve_params(&card, &req.params, &board_state);
        let host = self.host();

        self.fire_triggers(&host, board_id, &card.name, card.trigger_names(TriggerKind::Pre), &req.params, &stack)
            .await;

        self.status.set_running(board_id, &alias);
        self.publish(
            board_id,
            &alias,
            ActionPhase::Run,
            json!({ "params": resolved_params, "callStack": req.call_stack }),
        );

        let result = self
            .execute(&req, &alias, &card, board_state, resolved_params.clone(), &stack, Arc::clone(&host))
            .await;

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    board = %board_id,
                    action = %alias,
                    kind = err.kind(),
                    error = %err,
                    "Action failed",
                );
                self.status.set_error(board_id, &alias, &err.to_string());
                self.publish(board_id, &alias, ActionPhase::Error, err.payload());
                return Err(err);
            }
        };

        self.publish(
            board_id,
            &alias,
            ActionPhase::Done,
            json!({ "value": value, "params": resolved_params, "callStack": req.call_stack }),
        );

        self.fire_triggers(&host, board_id, &card.name, card.trigger_names(TriggerKind::Post), &req.params, &stack)
            .await;

        Ok(value)
    }

    /// Execute, post-process and persist. Every error here is reported.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        req: &RunRequest,
        alias: &str,
        card: &boardwise_core::Card,
        board_state: JsonMap,
        resolved_params: JsonMap,
        stack: &CallStack,
        host: Arc<dyn ActionHost>,
    ) -> Result<Value, ActionError> {
        let board_id = req.board.as_str();

        let token = self
            .signer
            .service_token(board_id, alias)
            .map_err(|e| ActionError::general(format!("failed to mint service token: {e}"), stack))?;

        let scope = ActionScope {
            board_id: board_id.to_string(),
            name: alias.to_string(),
            request: req.request.clone(),
            states: self.states.get_state_tree(),
            board_actions: self.catalog.to_json(board_id),
            board: board_state,
            user_params: req.params.clone(),
            params: resolved_params,
            token,
            context: self.context.snapshot(),
            call_stack: stack.clone(),
            host,
        };

        let outcome = self
            .sandbox
            .run_action(&card.rules_code, scope)
            .await
            .map_err(|e| match e {
                SandboxError::Nested(inner) => nested_failure(*inner, stack),
                other => ActionError::CodeExecution {
                    message: other.to_string(),
                    stack: other.traceback(),
                    call_stack: stack.clone(),
                },
            })?;

        self.context.replace(outcome.context);
        let value = returns::post_process(card, outcome.value);

        let report = if card.always_report_value {
            Report::Always
        } else {
            Report::OnChange
        };
        let changed = self
            .states
            .set(BOARDS_GROUP, board_id, &card.name, value.clone(), report);
        if changed || card.always_report_value {
            tracing::debug!(board = %board_id, action = %alias, "Action value stored");
        }
        self.status.set_idle(board_id, alias);

        if card.persist_value {
            self.persist(board_id, &card.name, &value)
                .await
                .map_err(|message| ActionError::general(message, stack))?;
        }

        Ok(value)
    }

    async fn persist(&self, board: &str, card: &str, value: &Value) -> Result<(), String> {
        let key = self.store.layout.kv_lock_key(board);
        let _guard = self
            .locks
            .acquire_timeout(&key, self.lock_timeout)
            .await
            .map_err(|e| e.to_string())?;
        self.store
            .kv
            .set(board, card, value.clone())
            .await
            .map_err(|e| format!("failed to persist value: {e}"))
    }

    /// Invoke triggers sequentially; failures are logged only.
    async fn fire_triggers<'a>(
        &self,
        host: &Arc<dyn ActionHost>,
        board: &str,
        source: &str,
        names: impl Iterator<Item = &'a str>,
        user_params: &JsonMap,
        stack: &CallStack,
    ) {
        let names: Vec<String> = names.map(str::to_string).collect();
        for name in names {
            if let Err(e) = host
                .run_action(board, &name, user_params.clone(), stack.clone())
                .await
            {
                tracing::warn!(
                    board = %board,
                    action = %source,
                    trigger = %name,
                    error = %e,
                    "Trigger failed",
                );
            }
        }
    }

    /// Last stored value of `card` on `board`.
    pub fn state_value(&self, board: &str, card: &str) -> Option<Value> {
        self.states.get(BOARDS_GROUP, board, card)
    }
}

/// A failed `api.run` fails the calling body. Recursion refusals keep
/// their own shape; anything else becomes an execution error of the
/// caller, carrying the caller's call stack.
fn nested_failure(inner: ActionError, stack: &CallStack) -> ActionError {
    match inner {
        recursive @ ActionError::RecursiveCall { .. } => recursive,
        inner => ActionError::CodeExecution {
            message: format!("nested action failed: {inner}"),
            stack: inner.stack().to_string(),
            call_stack: stack.clone(),
        },
    }
}

/// Nested invocations from rule bodies and triggers. They run privileged
/// with the caller's call stack.
struct DispatchHost(Arc<Dispatcher>);

#[async_trait]
impl ActionHost for DispatchHost {
    async fn run_action(
        &self,
        board: &str,
        action: &str,
        params: JsonMap,
        call_stack: CallStack,
    ) -> Result<Value, ActionError> {
        let req = RunRequest::new(board, action)
            .with_params(params)
            .with_call_stack(call_stack)
            .with_request(json!({ "method": "INTERNAL" }));
        self.0.run(req).await
    }

    fn state_value(&self, board: &str, card: &str) -> Option<Value> {
        self.0.state_value(board, card)
    }
}
