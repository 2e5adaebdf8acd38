//! Explicit action call stacks.
//!
//! Every external request starts with an empty [`CallStack`]. Each nested
//! action invocation receives the caller's stack with the caller's frame
//! prepended, so recursion detection is a pure function of its input.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One in-flight action invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Action (card) name.
    pub name: String,
    /// Board the action lives on.
    pub board: String,
}

impl CallFrame {
    pub fn new(name: impl Into<String>, board: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            board: board.into(),
        }
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board, self.name)
    }
}

/// Ordered list of frames, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallStack(Vec<CallFrame>);

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `(name, board)` is already in flight.
    pub fn contains(&self, name: &str, board: &str) -> bool {
        self.0.iter().any(|f| f.name == name && f.board == board)
    }

    /// A new stack with `frame` on top. `self` is left untouched.
    pub fn push(&self, frame: CallFrame) -> Self {
        let mut frames = Vec::with_capacity(self.0.len() + 1);
        frames.push(frame);
        frames.extend(self.0.iter().cloned());
        Self(frames)
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<CallFrame>> for CallStack {
    fn from(frames: Vec<CallFrame>) -> Self {
        Self(frames)
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(" <- "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_prepends_without_mutating() {
        let root = CallStack::new();
        let one = root.push(CallFrame::new("a", "b1"));
        let two = one.push(CallFrame::new("c", "b1"));

        assert!(root.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.frames()[0].name, "c");
        assert_eq!(two.frames()[1].name, "a");
    }

    #[test]
    fn contains_matches_name_and_board() {
        let stack = CallStack::new().push(CallFrame::new("a", "b1"));
        assert!(stack.contains("a", "b1"));
        assert!(!stack.contains("a", "b2"));
        assert!(!stack.contains("x", "b1"));
    }

    #[test]
    fn serializes_as_plain_array() {
        let stack = CallStack::new().push(CallFrame::new("a", "b1"));
        let json = serde_json::to_value(&stack).unwrap();
        assert_eq!(json, serde_json::json!([{"name": "a", "board": "b1"}]));
    }

    #[test]
    fn display_lists_frames_top_first() {
        let stack = CallStack::new()
            .push(CallFrame::new("a", "b1"))
            .push(CallFrame::new("c", "b2"));
        assert_eq!(stack.to_string(), "[b2/c <- b1/a]");
    }
}
