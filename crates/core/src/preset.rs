//! Preset overlays and aliased actions.
//!
//! A preset is a named partial override stored on an action card. At
//! dispatch time the overlay is deep-merged onto the card, producing an
//! aliased action addressable as `"<cardName>.<presetName>"`.

use serde_json::Value;

use crate::board::{Board, Card};

/// Separator between a card name and a preset name in an alias.
pub const ALIAS_SEPARATOR: char = '.';

/// Card fields a preset may never override.
const PROTECTED_FIELDS: &[&str] = &["key", "name", "type", "rulesCode", "presets"];

/// An action resolved by name, possibly through a preset alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    /// The effective card (preset already merged).
    pub card: Card,
    /// Preset name when resolved through an alias.
    pub preset: Option<String>,
}

impl ResolvedAction {
    /// The name the action was addressed by (`card` or `card.preset`).
    pub fn alias(&self) -> String {
        match &self.preset {
            Some(preset) => alias_name(&self.card.name, preset),
            None => self.card.name.clone(),
        }
    }
}

/// Build the alias for a card preset.
pub fn alias_name(card: &str, preset: &str) -> String {
    format!("{card}{ALIAS_SEPARATOR}{preset}")
}

/// Split `"card.preset"` into its parts. Plain names yield `(name, None)`.
pub fn split_alias(name: &str) -> (&str, Option<&str>) {
    match name.split_once(ALIAS_SEPARATOR) {
        Some((card, preset)) if !preset.is_empty() => (card, Some(preset)),
        _ => (name, None),
    }
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; every other value (arrays included) replaces
/// the base value outright.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Apply the named preset of `card`, returning the merged card.
///
/// Returns `None` if the preset does not exist or the merged document no
/// longer describes a valid card.
pub fn apply_preset(card: &Card, preset: &str) -> Option<Card> {
    let overlay = card.presets.get(preset)?;
    let mut doc = serde_json::to_value(card).ok()?;

    let mut overlay = overlay.clone();
    if let Value::Object(map) = &mut overlay {
        for field in PROTECTED_FIELDS {
            map.remove(*field);
        }
    }
    deep_merge(&mut doc, &overlay);

    match serde_json::from_value(doc) {
        Ok(merged) => Some(merged),
        Err(e) => {
            tracing::warn!(card = %card.name, preset, error = %e, "Preset produced an invalid card");
            None
        }
    }
}

/// Find an action card on `board` by exact name or by `card.preset` alias.
pub fn resolve_action(board: &Board, name: &str) -> Option<ResolvedAction> {
    if let Some(card) = board.actions().find(|c| c.name == name) {
        return Some(ResolvedAction {
            card: card.clone(),
            preset: None,
        });
    }

    let (card_name, preset) = split_alias(name);
    let preset = preset?;
    let base = board.actions().find(|c| c.name == card_name)?;
    apply_preset(base, preset).map(|card| ResolvedAction {
        card,
        preset: Some(preset.to_string()),
    })
}

/// Every address an action is reachable by: its own name plus one alias
/// per preset.
pub fn action_aliases(card: &Card) -> Vec<String> {
    std::iter::once(card.name.clone())
        .chain(card.presets.keys().map(|p| alias_name(&card.name, p)))
        .collect()
}
