//! Boardwise event bus and state store.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`BoardEvent`]: the topic-addressed event envelope.
//! - [`topics`]: builders for every topic the engine publishes on.
//! - [`StateStore`]: last-known card values keyed by group/tag/name,
//!   announcing every change on the bus.

pub mod bus;
pub mod state;
pub mod topics;

pub use bus::{BoardEvent, EventBus};
pub use state::{Report, StateStore, BOARDS_GROUP};
pub use topics::ActionPhase;
