//! Topic builders.
//!
//! Every topic the engine publishes on is built here so producers and
//! subscribers agree on the exact shape.

use std::fmt;

/// Phase of an action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Run,
    Done,
    Error,
    Status,
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionPhase::Run => "run",
            ActionPhase::Done => "done",
            ActionPhase::Error => "error",
            ActionPhase::Status => "status",
        })
    }
}

/// `states/<group>/<tag>/<name>/update`
pub fn state_update(group: &str, tag: &str, name: &str) -> String {
    format!("states/{group}/{tag}/{name}/update")
}

/// `states/<group>/<tag>/<name>/delete`
pub fn state_delete(group: &str, tag: &str, name: &str) -> String {
    format!("states/{group}/{tag}/{name}/delete")
}

/// `actions/<board>/<action>/<phase>`
pub fn action(board: &str, action: &str, phase: ActionPhase) -> String {
    format!("actions/{board}/{action}/{phase}")
}

/// `boards/<board>/update`
pub fn board_update(board: &str) -> String {
    format!("boards/{board}/update")
}

/// `boards/<board>/delete`
pub fn board_delete(board: &str) -> String {
    format!("boards/{board}/delete")
}

/// `autopilot/<board>/<card>/update`
pub fn autopilot_update(board: &str, card: &str) -> String {
    format!("autopilot/{board}/{card}/update")
}
