//! Boardwise core domain.
//!
//! Pure, I/O-free building blocks shared by the store, engine and API
//! crates:
//!
//! - [`board`]: board and card documents plus save-time validation.
//! - [`preset`]: deep-merge of preset overlays and alias resolution.
//! - [`params`]: effective config-param resolution for an action call.
//! - [`returns`]: return-type coercion and fallback handling.
//! - [`call_stack`]: explicit call frames used for recursion detection.
//! - [`registry`]: catalog of built-in card templates.
//! - [`lock`]: per-key async mutual exclusion with scoped release.

pub mod board;
pub mod call_stack;
pub mod error;
pub mod lock;
pub mod params;
pub mod preset;
pub mod registry;
pub mod returns;
pub mod types;

pub use board::{Board, Card, CardTokens, CardType, ConfigParam, Trigger, TriggerKind};
pub use call_stack::{CallFrame, CallStack};
pub use error::CoreError;
pub use lock::{LockGuard, LockManager, LockTimeout};
pub use registry::{CardRegistry, CardTemplate};
pub use returns::ReturnType;
