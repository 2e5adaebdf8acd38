use boardwise_core::CallStack;
use serde_json::{json, Value};

/// Failure of one action invocation.
///
/// `RecursiveCall`, `CodeExecution` and `GeneralExecution` are published
/// on the bus as well as returned; `NotFound` and `Forbidden` are returned
/// only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Action '{action}' not found on board '{board}'")]
    NotFound { board: String, action: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Recursive action call: {board}/{action} is already running in {call_stack}")]
    RecursiveCall {
        board: String,
        action: String,
        call_stack: CallStack,
    },

    #[error("{message}")]
    CodeExecution {
        message: String,
        stack: String,
        call_stack: CallStack,
    },

    #[error("{message}")]
    GeneralExecution {
        message: String,
        call_stack: CallStack,
    },
}

impl ActionError {
    /// The `errorKind` string reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Forbidden(_) => "Forbidden",
            Self::RecursiveCall { .. } => "RecursiveCallError",
            Self::CodeExecution { .. } => "CodeExecutionError",
            Self::GeneralExecution { .. } => "GeneralExecutionError",
        }
    }

    /// Whether observers are told about this failure.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::RecursiveCall { .. } | Self::CodeExecution { .. } | Self::GeneralExecution { .. }
        )
    }

    pub fn call_stack(&self) -> Option<&CallStack> {
        match self {
            Self::RecursiveCall { call_stack, .. }
            | Self::CodeExecution { call_stack, .. }
            | Self::GeneralExecution { call_stack, .. } => Some(call_stack),
            _ => None,
        }
    }

    /// Rule traceback, empty for failures outside a body.
    pub fn stack(&self) -> &str {
        match self {
            Self::CodeExecution { stack, .. } => stack,
            _ => "",
        }
    }

    /// `{errorKind, message, stack, callStack}`.
    pub fn payload(&self) -> Value {
        json!({
            "errorKind": self.kind(),
            "message": self.to_string(),
            "stack": self.stack(),
            "callStack": self.call_stack().cloned().unwrap_or_default(),
        })
    }

    pub(crate) fn general(message: impl Into<String>, call_stack: &CallStack) -> Self {
        Self::GeneralExecution {
            message: message.into(),
            call_stack: call_stack.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use boardwise_core::CallFrame;

    use super::*;

    #[test]
    fn payload_carries_kind_and_stack() {
        let err = ActionError::RecursiveCall {
            board: "b".into(),
            action: "a".into(),
            call_stack: CallStack::new().push(CallFrame::new("a", "b")),
        };
        let payload = err.payload();
        assert_eq!(payload["errorKind"], "RecursiveCallError");
        assert_eq!(payload["callStack"][0]["name"], "a");
        assert!(err.is_broadcast());
    }

    #[test]
    fn not_found_is_not_broadcast() {
        let err = ActionError::NotFound {
            board: "b".into(),
            action: "a".into(),
        };
        assert_eq!(err.kind(), "NotFound");
        assert!(!err.is_broadcast());
        assert_eq!(err.payload()["callStack"], serde_json::json!([]));
    }
}
