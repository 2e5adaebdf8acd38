//! Last-known card values, keyed by `(group, tag, name)`.
//!
//! Boards live under group [`BOARDS_GROUP`] with the board id as tag and
//! the card name as name. Every mutation can announce itself on the
//! [`EventBus`]; a set that does not change the stored value (by deep
//! equality) is silent unless the caller asks for [`Report::Always`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use boardwise_core::types::JsonMap;
use serde_json::Value;

use crate::bus::{BoardEvent, EventBus};
use crate::topics;

/// Group holding per-board card values.
pub const BOARDS_GROUP: &str = "boards";

/// Event emission policy for [`StateStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Report {
    /// Store without publishing.
    Silent,
    /// Publish only when the stored value actually changes.
    #[default]
    OnChange,
    /// Publish even when the value is unchanged (`alwaysReportValue`).
    Always,
}

type Tree = BTreeMap<String, BTreeMap<String, JsonMap>>;

/// Process-wide state store.
pub struct StateStore {
    tree: RwLock<Tree>,
    bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_update(&self, group: &str, tag: &str, name: &str, value: &Value) {
        self.bus.publish(
            BoardEvent::new(topics::state_update(group, tag, name))
                .with_from("states")
                .with_payload(value.clone()),
        );
    }

    fn publish_delete(&self, group: &str, tag: &str, name: &str) {
        self.bus.publish(BoardEvent::new(topics::state_delete(group, tag, name)).with_from("states"));
    }

    pub fn get(&self, group: &str, tag: &str, name: &str) -> Option<Value> {
        self.read()
            .get(group)
            .and_then(|tags| tags.get(tag))
            .and_then(|names| names.get(name))
            .cloned()
    }

    /// Upsert a value. Returns whether the stored value changed.
    pub fn set(&self, group: &str, tag: &str, name: &str, value: Value, report: Report) -> bool {
        let mut tree = self.write();
        let slot = tree
            .entry(group.to_string())
            .or_default()
            .entry(tag.to_string())
            .or_default();

        let changed = slot.get(name) != Some(&value);
        let publish = match report {
            Report::Silent => false,
            Report::OnChange => changed,
            Report::Always => true,
        };
        if publish {
            self.publish_update(group, tag, name, &value);
        }
        if changed {
            slot.insert(name.to_string(), value);
        }
        changed
    }

    /// Delete a value, publishing a delete event when `emit` is set and
    /// something was removed.
    pub fn remove(&self, group: &str, tag: &str, name: &str, emit: bool) -> Option<Value> {
        let mut tree = self.write();
        let removed = tree
            .get_mut(group)
            .and_then(|tags| tags.get_mut(tag))
            .and_then(|names| names.remove(name));
        if removed.is_some() && emit {
            self.publish_delete(group, tag, name);
        }
        removed
    }

    /// Apply a batch of `(from, to)` renames in one step. Every `from`
    /// value is taken out before any is inserted, so swaps and chains keep
    /// all values. Publishes a delete per old name and an update per new
    /// one.
    ///
    /// Returns the pairs that actually moved a value.
    pub fn rename(&self, group: &str, tag: &str, renames: &[(String, String)]) -> Vec<(String, String)> {
        let mut tree = self.write();
        let Some(names) = tree.get_mut(group).and_then(|tags| tags.get_mut(tag)) else {
            return Vec::new();
        };

        let taken: Vec<(&(String, String), Value)> = renames
            .iter()
            .filter_map(|pair| names.remove(&pair.0).map(|value| (pair, value)))
            .collect();
        for ((from, _), _) in &taken {
            self.publish_delete(group, tag, from);
        }

        let mut moved = Vec::with_capacity(taken.len());
        for ((from, to), value) in taken {
            self.publish_update(group, tag, to, &value);
            names.insert(to.clone(), value);
            moved.push((from.clone(), to.clone()));
        }
        moved
    }

    /// Remove every entry under `tag` whose name fails `keep`, publishing a
    /// delete for each. Returns the removed names.
    pub fn retain(&self, group: &str, tag: &str, keep: impl Fn(&str) -> bool) -> Vec<String> {
        let mut tree = self.write();
        let Some(names) = tree.get_mut(group).and_then(|tags| tags.get_mut(tag)) else {
            return Vec::new();
        };
        let doomed: Vec<String> = names.keys().filter(|n| !keep(n)).cloned().collect();
        for name in &doomed {
            names.remove(name);
            self.publish_delete(group, tag, name);
        }
        doomed
    }

    /// Drop a whole tag, publishing a delete per entry.
    pub fn remove_tag(&self, group: &str, tag: &str) -> usize {
        let mut tree = self.write();
        let Some(names) = tree.get_mut(group).and_then(|tags| tags.remove(tag)) else {
            return 0;
        };
        for name in names.keys() {
            self.publish_delete(group, tag, name);
        }
        names.len()
    }

    /// All entries of one tag as a flat `name -> value` map.
    pub fn get_by_tag(&self, group: &str, tag: &str) -> JsonMap {
        self.read()
            .get(group)
            .and_then(|tags| tags.get(tag))
            .cloned()
            .unwrap_or_default()
    }

    /// The full `{group: {tag: {name: value}}}` tree.
    pub fn get_state_tree(&self) -> Value {
        let tree = self.read();
        let groups: JsonMap = tree
            .iter()
            .map(|(group, tags)| {
                let tags: JsonMap = tags
                    .iter()
                    .map(|(tag, names)| (tag.clone(), Value::Object(names.clone())))
                    .collect();
                (group.clone(), Value::Object(tags))
            })
            .collect();
        Value::Object(groups)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn store() -> (StateStore, tokio::sync::broadcast::Receiver<BoardEvent>) {
        let bus = Arc::new(EventBus::default());
        let rx = bus.subscribe();
        (StateStore::new(bus), rx)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<BoardEvent>) -> Vec<String> {
        let mut topics = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => topics.push(event.topic),
                Err(TryRecvError::Empty) => return topics,
                Err(e) => panic!("unexpected receive error: {e}"),
            }
        }
    }

    #[test]
    fn unchanged_set_broadcasts_once() {
        let (store, mut rx) = store();
        assert!(store.set(BOARDS_GROUP, "demo", "x", json!({"a": 1}), Report::OnChange));
        assert!(!store.set(BOARDS_GROUP, "demo", "x", json!({"a": 1}), Report::OnChange));
        assert_eq!(drain(&mut rx), vec!["states/boards/demo/x/update"]);
    }

    #[test]
    fn always_report_rebroadcasts_unchanged_values() {
        let (store, mut rx) = store();
        store.set(BOARDS_GROUP, "demo", "x", json!(1), Report::Always);
        store.set(BOARDS_GROUP, "demo", "x", json!(1), Report::Always);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn silent_set_stores_without_event() {
        let (store, mut rx) = store();
        assert!(store.set(BOARDS_GROUP, "demo", "x", json!(1), Report::Silent));
        assert_eq!(store.get(BOARDS_GROUP, "demo", "x"), Some(json!(1)));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn remove_emits_delete_only_when_present() {
        let (store, mut rx) = store();
        store.set(BOARDS_GROUP, "demo", "x", json!(1), Report::Silent);
        assert_eq!(store.remove(BOARDS_GROUP, "demo", "x", true), Some(json!(1)));
        assert_eq!(store.remove(BOARDS_GROUP, "demo", "x", true), None);
        assert_eq!(drain(&mut rx), vec!["states/boards/demo/x/delete"]);
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn rename_moves_value_and_emits_both_events() {
        let (store, mut rx) = store();
        store.set(BOARDS_GROUP, "demo", "x", json!(5), Report::Silent);
        let moved = store.rename(BOARDS_GROUP, "demo", &pairs(&[("x", "y"), ("missing", "z")]));
        assert_eq!(moved, pairs(&[("x", "y")]));

        assert_eq!(store.get(BOARDS_GROUP, "demo", "x"), None);
        assert_eq!(store.get(BOARDS_GROUP, "demo", "y"), Some(json!(5)));
        assert_eq!(store.get(BOARDS_GROUP, "demo", "z"), None);
        assert_eq!(
            drain(&mut rx),
            vec!["states/boards/demo/x/delete", "states/boards/demo/y/update"]
        );
    }

    #[test]
    fn swapped_names_keep_both_values() {
        let (store, _rx) = store();
        store.set(BOARDS_GROUP, "demo", "x", json!("X"), Report::Silent);
        store.set(BOARDS_GROUP, "demo", "y", json!("Y"), Report::Silent);

        let moved = store.rename(BOARDS_GROUP, "demo", &pairs(&[("x", "y"), ("y", "x")]));
        assert_eq!(moved.len(), 2);
        assert_eq!(store.get(BOARDS_GROUP, "demo", "x"), Some(json!("Y")));
        assert_eq!(store.get(BOARDS_GROUP, "demo", "y"), Some(json!("X")));
    }

    #[test]
    fn retain_prunes_orphans() {
        let (store, mut rx) = store();
        store.set(BOARDS_GROUP, "demo", "keep", json!(1), Report::Silent);
        store.set(BOARDS_GROUP, "demo", "gone", json!(2), Report::Silent);

        let removed = store.retain(BOARDS_GROUP, "demo", |name| name == "keep");
        assert_eq!(removed, vec!["gone"]);
        assert_eq!(drain(&mut rx), vec!["states/boards/demo/gone/delete"]);
        assert_eq!(store.get_by_tag(BOARDS_GROUP, "demo").len(), 1);
    }

    #[test]
    fn tree_and_tag_views() {
        let (store, _rx) = store();
        store.set(BOARDS_GROUP, "a", "x", json!(1), Report::Silent);
        store.set(BOARDS_GROUP, "b", "y", json!(2), Report::Silent);
        store.set("system", "info", "started", json!(true), Report::Silent);

        assert_eq!(
            store.get_state_tree(),
            json!({
                "boards": {"a": {"x": 1}, "b": {"y": 2}},
                "system": {"info": {"started": true}}
            })
        );
        assert_eq!(Value::Object(store.get_by_tag(BOARDS_GROUP, "b")), json!({"y": 2}));
        assert!(store.get_by_tag(BOARDS_GROUP, "missing").is_empty());
    }

    #[test]
    fn remove_tag_clears_board() {
        let (store, mut rx) = store();
        store.set(BOARDS_GROUP, "demo", "x", json!(1), Report::Silent);
        store.set(BOARDS_GROUP, "demo", "y", json!(2), Report::Silent);
        assert_eq!(store.remove_tag(BOARDS_GROUP, "demo"), 2);
        assert_eq!(drain(&mut rx).len(), 2);
        assert!(store.get_by_tag(BOARDS_GROUP, "demo").is_empty());
    }
}
