//! WebSocket event stream.
//!
//! Clients connect to `/api/v1/ws` and receive every [`BoardEvent`] as a
//! JSON text frame. A client may narrow the stream by sending
//! `{"subscribe": ["states/boards/demo", ...]}`; an empty list restores
//! the full stream.
//!
//! [`BoardEvent`]: boardwise_events::BoardEvent

mod bridge;
mod handler;
mod heartbeat;
pub mod manager;

pub use bridge::start_event_bridge;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
