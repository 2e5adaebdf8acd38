//! Per-action run status.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use boardwise_core::types::Timestamp;
use boardwise_events::topics::{self, ActionPhase};
use boardwise_events::{BoardEvent, EventBus};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatus {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            last_run: None,
            last_error: None,
        }
    }
}

/// Status records keyed by `(board, action)`. Every change is published
/// on `actions/<board>/<action>/status`.
pub struct StatusTable {
    records: RwLock<BTreeMap<(String, String), ActionStatus>>,
    bus: Arc<EventBus>,
}

impl StatusTable {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            bus,
        }
    }

    pub fn get(&self, board: &str, action: &str) -> ActionStatus {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(board.to_string(), action.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn update(&self, board: &str, action: &str, apply: impl FnOnce(&mut ActionStatus)) {
        let snapshot = {
            let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
            let record = records
                .entry((board.to_string(), action.to_string()))
                .or_default();
            apply(record);
            record.clone()
        };
        self.bus.publish(
            BoardEvent::new(topics::action(board, action, ActionPhase::Status))
                .with_from("dispatcher")
                .with_payload(serde_json::to_value(&snapshot).unwrap_or_default()),
        );
    }

    pub fn set_running(&self, board: &str, action: &str) {
        self.update(board, action, |r| {
            r.state = RunState::Running;
            r.last_run = Some(Utc::now());
        });
    }

    pub fn set_idle(&self, board: &str, action: &str) {
        self.update(board, action, |r| {
            r.state = RunState::Idle;
            r.last_error = None;
        });
    }

    pub fn set_error(&self, board: &str, action: &str, error: &str) {
        let error = error.to_string();
        self.update(board, action, |r| {
            r.state = RunState::Error;
            r.last_error = Some(error);
        });
    }

    /// Drop every record of a board.
    pub fn forget_board(&self, board: &str) {
        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|(b, _), _| b != board);
    }
}
