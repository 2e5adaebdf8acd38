//! File-backed persistence for boards.
//!
//! Everything lives under one data directory (see [`DataLayout`]):
//!
//! ```text
//! boards/<id>.json                 board document
//! boards/<id>.automation.lua       automation entry point
//! boards/<id>.ui.html              UI entry point
//! boards/<id>/cards/<card>.lua     per-card rule body mirror
//! boards/<id>/cards/<card>.html    per-card markup mirror
//! versions/<id>/<n>.json           snapshot n
//! kv/board_<id>.json               persistValue namespace
//! ```
//!
//! This crate does plain file I/O only. Callers serialize read-modify-write
//! cycles with `boardwise_core::LockManager`, keyed by the paths returned
//! from [`DataLayout`].

pub mod boards;
pub mod error;
pub mod fs;
pub mod kv;
pub mod layout;
pub mod snapshots;

pub use boards::BoardFiles;
pub use error::StoreError;
pub use kv::KvFiles;
pub use layout::DataLayout;
pub use snapshots::SnapshotFiles;

use std::path::PathBuf;

/// All file stores over one data directory.
#[derive(Debug, Clone)]
pub struct Store {
    pub layout: DataLayout,
    pub boards: BoardFiles,
    pub snapshots: SnapshotFiles,
    pub kv: KvFiles,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let layout = DataLayout::new(root);
        Self {
            boards: BoardFiles::new(layout.clone()),
            snapshots: SnapshotFiles::new(layout.clone()),
            kv: KvFiles::new(layout.clone()),
            layout,
        }
    }
}
