use async_trait::async_trait;
use boardwise_core::types::JsonMap;
use boardwise_core::CallStack;
use serde_json::Value;

use crate::error::ActionError;

/// What a running rule body may call back into.
///
/// Implemented by the action dispatcher; `api.run` and `api.value` in the
/// rule environment go through this trait so nested invocations carry the
/// caller's call stack.
#[async_trait]
pub trait ActionHost: Send + Sync {
    /// Invoke `action` on `board` as a nested call of `call_stack`.
    async fn run_action(
        &self,
        board: &str,
        action: &str,
        params: JsonMap,
        call_stack: CallStack,
    ) -> Result<Value, ActionError>;

    /// Last stored value of a card.
    fn state_value(&self, board: &str, card: &str) -> Option<Value>;
}
