//! Catalog of card templates.
//!
//! Editors instantiate new cards from these templates; the engine itself
//! only registers and lists them. Registration is idempotent by id, so the
//! built-ins can be (re)registered at every process start.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::board::{Card, CardType};
use crate::error::CoreError;
use crate::preset::deep_merge;

/// A registered card template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTemplate {
    /// Top-level grouping, e.g. `"cards"`.
    pub group: String,
    /// Sub-grouping, `"value"` or `"action"` for the built-ins.
    pub tag: String,
    /// Unique id, e.g. `"action/toggle"`.
    pub id: String,
    /// Human-readable template name.
    pub template_name: String,
    /// Suggested card name for new instances.
    pub name: String,
    /// Partial card document applied on instantiation.
    pub defaults: Value,
}

/// Process-scoped template registry.
#[derive(Debug, Default)]
pub struct CardRegistry {
    entries: RwLock<BTreeMap<String, CardTemplate>>,
}

impl CardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with [`builtin_templates`].
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for template in builtin_templates() {
            registry.register(template);
        }
        registry
    }

    /// Add or replace a template (keyed by `id`).
    pub fn register(&self, template: CardTemplate) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(template.id.clone(), template);
    }

    /// Look up a single template.
    pub fn get(&self, id: &str) -> Option<CardTemplate> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// All templates grouped by `group`, each group ordered by id.
    pub fn list(&self) -> BTreeMap<String, Vec<CardTemplate>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut grouped: BTreeMap<String, Vec<CardTemplate>> = BTreeMap::new();
        for template in entries.values() {
            grouped
                .entry(template.group.clone())
                .or_default()
                .push(template.clone());
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a new card instance from template `id`.
    pub fn instantiate(&self, id: &str, key: &str, name: &str) -> Result<Card, CoreError> {
        let template = self
            .get(id)
            .ok_or_else(|| CoreError::not_found("Card template", id))?;

        let kind = match template.tag.as_str() {
            "action" => CardType::Action,
            _ => CardType::Value,
        };
        let mut doc = serde_json::to_value(Card::new(key, name, kind))
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        deep_merge(&mut doc, &template.defaults);
        if let Value::Object(map) = &mut doc {
            map.insert("key".into(), json!(key));
            map.insert("name".into(), json!(name));
        }
        serde_json::from_value(doc).map_err(|e| {
            CoreError::invalid(format!("Template '{id}' produced an invalid card: {e}"))
        })
    }
}

fn template(tag: &str, id: &str, template_name: &str, name: &str, defaults: Value) -> CardTemplate {
    CardTemplate {
        group: "cards".into(),
        tag: tag.into(),
        id: id.into(),
        template_name: template_name.into(),
        name: name.into(),
        defaults,
    }
}

/// The templates registered at engine start.
pub fn builtin_templates() -> Vec<CardTemplate> {
    vec![
        template(
            "value",
            "value/basic",
            "Static value",
            "value",
            json!({"type": "value", "rulesCode": "return 0"}),
        ),
        template(
            "value",
            "value/counter",
            "Tick counter",
            "ticks",
            json!({
                "type": "value",
                "rulesCode": "memory.count = (memory.count or 0) + 1\nreturn memory.count"
            }),
        ),
        template(
            "value",
            "value/state",
            "Mirror another card",
            "mirror",
            json!({
                "type": "value",
                "rulesCode": "return board[params.source]",
                "configParams": {"source": {"visible": true, "defaultValue": ""}}
            }),
        ),
        template(
            "action",
            "action/basic",
            "Basic action",
            "action",
            json!({"type": "action", "rulesCode": "return params"}),
        ),
        template(
            "action",
            "action/toggle",
            "Toggle",
            "toggle",
            json!({
                "type": "action",
                "rulesCode": "return not board[name]",
                "returnType": "boolean",
                "persistValue": true
            }),
        ),
        template(
            "action",
            "action/set-value",
            "Set value",
            "setValue",
            json!({
                "type": "action",
                "rulesCode": "return params.value",
                "params": {"value": "value to store"},
                "configParams": {"value": {"visible": true, "defaultValue": ""}},
                "returnType": "auto"
            }),
        ),
        template(
            "action",
            "action/http-get",
            "HTTP GET",
            "fetch",
            json!({
                "type": "action",
                "rulesCode": "return http.get(params.url)",
                "params": {"url": "url to fetch"},
                "configParams": {"url": {"visible": true, "defaultValue": ""}}
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_grouped() {
        let registry = CardRegistry::with_builtins();
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed["cards"].len(), builtin_templates().len());
    }

    #[test]
    fn register_is_idempotent_by_id() {
        let registry = CardRegistry::with_builtins();
        let before = registry.len();
        for template in builtin_templates() {
            registry.register(template);
        }
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn register_replaces_existing_entry() {
        let registry = CardRegistry::new();
        registry.register(template("action", "x", "First", "x", json!({})));
        registry.register(template("action", "x", "Second", "x", json!({})));
        assert_eq!(registry.get("x").unwrap().template_name, "Second");
    }

    #[test]
    fn instantiate_applies_defaults() {
        let registry = CardRegistry::with_builtins();
        let card = registry.instantiate("action/toggle", "k9", "lights").unwrap();
        assert_eq!(card.key, "k9");
        assert_eq!(card.name, "lights");
        assert!(card.is_action());
        assert!(card.persist_value);
        assert_eq!(card.rules_code, "return not board[name]");
    }

    #[test]
    fn instantiate_unknown_template_is_not_found() {
        let registry = CardRegistry::new();
        assert!(matches!(
            registry.instantiate("nope", "k", "n"),
            Err(CoreError::NotFound { .. })
        ));
    }
}
