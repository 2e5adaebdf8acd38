pub mod actions;
pub mod autopilot;
pub mod boards;
pub mod cards;
pub mod states;
pub mod templates;
pub mod versions;
