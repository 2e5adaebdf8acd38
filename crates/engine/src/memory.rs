//! Process-lifetime scratch data visible to rule bodies.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

/// Per-card scratch memory. Card keys are only unique within a board, so
/// entries are grouped by board id first.
#[derive(Debug, Default)]
pub struct ScratchMemory {
    boards: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl ScratchMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory of one card; `{}` when nothing has been stored yet.
    pub fn get(&self, board: &str, card_key: &str) -> Value {
        self.boards
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(board)
            .and_then(|cards| cards.get(card_key))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn put(&self, board: &str, card_key: &str, memory: Value) {
        self.boards
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(board.to_string())
            .or_default()
            .insert(card_key.to_string(), memory);
    }

    /// Drop the memory of every card of `board` whose key fails `keep`.
    pub fn retain(&self, board: &str, keep: impl Fn(&str) -> bool) {
        let mut boards = self.boards.write().unwrap_or_else(|p| p.into_inner());
        if let Some(cards) = boards.get_mut(board) {
            cards.retain(|key, _| keep(key));
            if cards.is_empty() {
                boards.remove(board);
            }
        }
    }

    pub fn forget_board(&self, board: &str) {
        self.boards
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(board);
    }
}

/// The `context` table shared by every action body. Last writer wins.
#[derive(Debug)]
pub struct SharedContext {
    value: RwLock<Value>,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self {
            value: RwLock::new(Value::Object(Default::default())),
        }
    }
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Value {
        self.value.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Store what a body left behind. Non-objects are ignored.
    pub fn replace(&self, value: Value) {
        if value.is_object() {
            *self.value.write().unwrap_or_else(|p| p.into_inner()) = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scratch_memory_defaults_to_empty_object() {
        let memory = ScratchMemory::new();
        assert_eq!(memory.get("demo", "k1"), json!({}));
        memory.put("demo", "k1", json!({"count": 3}));
        assert_eq!(memory.get("demo", "k1"), json!({"count": 3}));
        memory.forget_board("demo");
        assert_eq!(memory.get("demo", "k1"), json!({}));
    }

    #[test]
    fn same_key_on_two_boards_is_separate() {
        let memory = ScratchMemory::new();
        memory.put("one", "k1", json!({"n": 1}));
        memory.put("two", "k1", json!({"n": 7}));
        assert_eq!(memory.get("one", "k1"), json!({"n": 1}));
        assert_eq!(memory.get("two", "k1"), json!({"n": 7}));

        memory.forget_board("one");
        assert_eq!(memory.get("two", "k1"), json!({"n": 7}));
    }

    #[test]
    fn retain_drops_removed_cards() {
        let memory = ScratchMemory::new();
        memory.put("demo", "k1", json!({"n": 1}));
        memory.put("demo", "k2", json!({"n": 2}));
        memory.retain("demo", |key| key == "k2");
        assert_eq!(memory.get("demo", "k1"), json!({}));
        assert_eq!(memory.get("demo", "k2"), json!({"n": 2}));
    }

    #[test]
    fn shared_context_keeps_objects_only() {
        let context = SharedContext::new();
        context.replace(json!({"a": 1}));
        context.replace(json!(null));
        assert_eq!(context.snapshot(), json!({"a": 1}));
    }
}
