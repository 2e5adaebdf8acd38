//! Board and card documents.
//!
//! A [`Board`] is the unit of persistence and versioning. It owns an
//! ordered list of [`Card`]s; each card is either a passive `value` card
//! re-evaluated by the autopilot or an invokable `action` card.
//!
//! Fields this engine does not interpret (icons, colors, grid sizes, ...)
//! are preserved verbatim through the `extra` maps so presentation data
//! survives a load/save cycle untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::returns::ReturnType;
use crate::types::{JsonMap, Timestamp};

/// Maximum length of a card name.
pub const MAX_CARD_NAME_LEN: usize = 128;

/// Board ids double as file names, so they are restricted to a safe set.
static BOARD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid board id regex"));

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// Whether a card produces a value passively or runs on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Value,
    Action,
}

/// Per-parameter configuration of an action card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigParam {
    /// Hidden params always take their configured default.
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub default_value: Value,
    /// Declared type: `string`, `number`, `boolean`, `json`/`object`/`array`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn default_visible() -> bool {
    true
}

impl Default for ConfigParam {
    fn default() -> Self {
        Self {
            visible: true,
            default_value: Value::Null,
            kind: None,
        }
    }
}

/// When a trigger fires relative to the owning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Pre,
    Post,
}

/// An action on the same board to invoke before or after a card runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    pub name: String,
}

/// Access tokens gating reads and runs of a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

/// A card instance attached to a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Stable instance id, unique within the board.
    pub key: String,
    /// Logical id used for state and action addressing.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CardType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub config_params: BTreeMap<String, ConfigParam>,
    #[serde(default)]
    pub presets: BTreeMap<String, Value>,
    #[serde(default)]
    pub rules_code: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub tokens: CardTokens,
    #[serde(default)]
    pub persist_value: bool,
    #[serde(default)]
    pub autorun: bool,
    #[serde(default)]
    pub always_report_value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    #[serde(default)]
    pub enable_return_custom_fallback: bool,
    #[serde(default)]
    pub fallback_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_key: Option<String>,
    /// Set by editors when the card was renamed in this save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
    /// Last known value; merged in on reads, stripped on writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Card {
    /// Build a minimal card of the given kind. Mostly useful in tests and
    /// when instantiating registry templates.
    pub fn new(key: impl Into<String>, name: impl Into<String>, kind: CardType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind,
            description: None,
            params: BTreeMap::new(),
            config_params: BTreeMap::new(),
            presets: BTreeMap::new(),
            rules_code: String::new(),
            html: String::new(),
            triggers: Vec::new(),
            tokens: CardTokens::default(),
            persist_value: false,
            autorun: false,
            always_report_value: false,
            return_type: None,
            enable_return_custom_fallback: false,
            fallback_value: Value::Null,
            response_key: None,
            previous_name: None,
            value: None,
            extra: JsonMap::new(),
        }
    }

    /// Builder: set the rule body.
    pub fn with_rules(mut self, rules_code: impl Into<String>) -> Self {
        self.rules_code = rules_code.into();
        self
    }

    pub fn is_action(&self) -> bool {
        self.kind == CardType::Action
    }

    pub fn is_value(&self) -> bool {
        self.kind == CardType::Value
    }

    /// Names of triggers of the given kind, in declaration order.
    pub fn trigger_names(&self, kind: TriggerKind) -> impl Iterator<Item = &str> {
        self.triggers
            .iter()
            .filter(move |t| t.kind == kind)
            .map(|t| t.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A named collection of cards plus settings and layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub name: String,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default = "empty_object")]
    pub settings: Value,
    #[serde(default)]
    pub layouts: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<Timestamp>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

fn empty_object() -> Value {
    Value::Object(JsonMap::new())
}

impl Board {
    /// Create an empty board at version 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cards: Vec::new(),
            settings: empty_object(),
            layouts: BTreeMap::new(),
            version: 0,
            saved_at: None,
            rules: Vec::new(),
            extra: JsonMap::new(),
        }
    }

    /// Builder: append a card.
    pub fn with_card(mut self, card: Card) -> Self {
        self.cards.push(card);
        self
    }

    /// Find a card by logical name.
    pub fn card(&self, name: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.name == name)
    }

    /// All action-type cards.
    pub fn actions(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter().filter(|c| c.is_action())
    }

    /// All value-type cards.
    pub fn values(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter().filter(|c| c.is_value())
    }

    /// Drop client-supplied `value` fields before persisting.
    pub fn strip_values(&mut self) {
        for card in &mut self.cards {
            card.value = None;
        }
    }

    /// Collect `(previous_name, name)` pairs for cards renamed in this save
    /// and clear the transient `previous_name` markers.
    pub fn take_renames(&mut self) -> Vec<(String, String)> {
        self.cards
            .iter_mut()
            .filter_map(|card| {
                let previous = card.previous_name.take()?;
                (previous != card.name).then(|| (previous, card.name.clone()))
            })
            .collect()
    }

    /// Check every save-time invariant, collecting all violations.
    ///
    /// - the board id is a safe file name;
    /// - every card name is well-formed;
    /// - card names are unique among cards with different keys;
    /// - card keys are unique.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut errors = Vec::new();

        if let Err(CoreError::Validation(mut msgs)) = validate_board_id(&self.name) {
            errors.append(&mut msgs);
        }

        let mut names: HashMap<&str, &str> = HashMap::new();
        let mut keys: HashMap<&str, usize> = HashMap::new();
        for card in &self.cards {
            if let Err(CoreError::Validation(mut msgs)) = validate_card_name(&card.name) {
                errors.append(&mut msgs);
            }
            if card.key.trim().is_empty() {
                errors.push(format!("Card '{}' has an empty key", card.name));
            }
            *keys.entry(card.key.as_str()).or_default() += 1;

            match names.get(card.name.as_str()) {
                Some(existing_key) if *existing_key != card.key => {
                    errors.push(format!("Duplicate card name '{}'", card.name));
                }
                _ => {
                    names.insert(card.name.as_str(), card.key.as_str());
                }
            }
        }
        for (key, count) in keys {
            if count > 1 && !key.trim().is_empty() {
                errors.push(format!("Duplicate card key '{key}'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(errors))
        }
    }
}

/// Validate a board id: non-empty, `[A-Za-z0-9_-]` only.
pub fn validate_board_id(id: &str) -> Result<(), CoreError> {
    if BOARD_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(CoreError::invalid(format!(
            "Invalid board name '{id}': use letters, digits, '-' or '_'"
        )))
    }
}

/// Validate a card name: non-empty, bounded, and free of the `.` preset
/// separator and the `/` state-path separator.
pub fn validate_card_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::invalid("Card name must not be empty"));
    }
    if name.len() > MAX_CARD_NAME_LEN {
        return Err(CoreError::invalid(format!(
            "Card name too long: {} chars (max {MAX_CARD_NAME_LEN})",
            name.len()
        )));
    }
    if name.contains('.') || name.contains('/') {
        return Err(CoreError::invalid(format!(
            "Card name '{name}' must not contain '.' or '/'"
        )));
    }
    Ok(())
}
