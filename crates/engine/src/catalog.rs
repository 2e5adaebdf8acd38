//! Registered actions per board.
//!
//! The catalog is the observable list of what can be invoked on a board:
//! one entry per action card plus one aliased entry per preset. Rule
//! bodies see it as `boardActions`; the HTTP layer lists it.

use std::collections::BTreeMap;
use std::sync::RwLock;

use boardwise_core::preset::{alias_name, apply_preset};
use boardwise_core::Board;
use serde::Serialize;
use serde_json::Value;

/// One invokable address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    /// Address: `card` or `card.preset`.
    pub name: String,
    /// Base card name.
    pub card: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter descriptions.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ActionCatalog {
    boards: RwLock<BTreeMap<String, Vec<ActionEntry>>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry of `board.name` with the board's current actions.
    pub fn register_board(&self, board: &Board) -> usize {
        let mut entries = Vec::new();
        for card in board.actions() {
            entries.push(ActionEntry {
                name: card.name.clone(),
                card: card.name.clone(),
                preset: None,
                description: card.description.clone(),
                params: card.params.clone(),
            });
            for preset in card.presets.keys() {
                let Some(merged) = apply_preset(card, preset) else {
                    continue;
                };
                entries.push(ActionEntry {
                    name: alias_name(&card.name, preset),
                    card: card.name.clone(),
                    preset: Some(preset.clone()),
                    description: merged.description,
                    params: merged.params,
                });
            }
        }

        let count = entries.len();
        self.boards
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(board.name.clone(), entries);
        tracing::debug!(board = %board.name, actions = count, "Registered board actions");
        count
    }

    /// Forget a board. Returns how many entries were dropped.
    pub fn unregister_board(&self, board: &str) -> usize {
        self.boards
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(board)
            .map_or(0, |entries| entries.len())
    }

    pub fn list(&self, board: &str) -> Vec<ActionEntry> {
        self.boards
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(board)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, board: &str, name: &str) -> bool {
        self.boards
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(board)
            .is_some_and(|entries| entries.iter().any(|e| e.name == name))
    }

    /// The board's entries as JSON, as handed to rule bodies.
    pub fn to_json(&self, board: &str) -> Value {
        serde_json::to_value(self.list(board)).unwrap_or(Value::Array(Vec::new()))
    }
}
