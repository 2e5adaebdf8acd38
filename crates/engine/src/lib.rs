//! Boardwise engine.
//!
//! Runs rule bodies in a Lua sandbox and orchestrates everything around
//! them: action dispatch with recursion detection, board writes with
//! state reconciliation, version history and the autopilot poller.
//! [`Engine`] wires the services together over one data directory.

pub mod autopilot;
pub mod boards;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod memory;
pub mod sandbox;
pub mod status;
pub mod token;
pub mod versions;

pub use autopilot::{AutopilotPoller, LocalProcessManager, ProcessManager};
pub use boards::{BoardService, BoardView, PutOutcome};
pub use catalog::{ActionCatalog, ActionEntry};
pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, RunRequest};
pub use engine::Engine;
pub use error::ActionError;
pub use status::{ActionStatus, RunState};
pub use token::{Access, Claims, TokenSigner};
pub use versions::VersionManager;
