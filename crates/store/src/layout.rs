//! Path layout of the data directory.

use std::path::{Path, PathBuf};

/// Extension of the automation entry point companion file.
pub const AUTOMATION_EXT: &str = "automation.lua";
/// Extension of the UI entry point companion file.
pub const UI_EXT: &str = "ui.html";

/// Resolves every on-disk path from the data root.
///
/// Ids passed in must already be validated (`validate_board_id`,
/// `validate_card_name`); this type does no checking of its own.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn boards_dir(&self) -> PathBuf {
        self.root.join("boards")
    }

    pub fn board_doc(&self, board: &str) -> PathBuf {
        self.boards_dir().join(format!("{board}.json"))
    }

    pub fn automation(&self, board: &str) -> PathBuf {
        self.boards_dir().join(format!("{board}.{AUTOMATION_EXT}"))
    }

    pub fn ui(&self, board: &str) -> PathBuf {
        self.boards_dir().join(format!("{board}.{UI_EXT}"))
    }

    pub fn board_dir(&self, board: &str) -> PathBuf {
        self.boards_dir().join(board)
    }

    pub fn cards_dir(&self, board: &str) -> PathBuf {
        self.board_dir(board).join("cards")
    }

    pub fn card_file(&self, board: &str, card: &str, ext: &str) -> PathBuf {
        self.cards_dir(board).join(format!("{card}.{ext}"))
    }

    pub fn versions_dir(&self, board: &str) -> PathBuf {
        self.root.join("versions").join(board)
    }

    pub fn snapshot(&self, board: &str, version: u64) -> PathBuf {
        self.versions_dir(board).join(format!("{version}.json"))
    }

    pub fn kv_dir(&self) -> PathBuf {
        self.root.join("kv")
    }

    pub fn kv_file(&self, board: &str) -> PathBuf {
        self.kv_dir().join(format!("{}.json", kv_namespace(board)))
    }

    /// Lock key for a board's version list.
    pub fn versions_lock_key(&self, board: &str) -> String {
        self.versions_dir(board).display().to_string()
    }

    /// Lock key for a board document.
    pub fn board_lock_key(&self, board: &str) -> String {
        self.board_doc(board).display().to_string()
    }

    /// Lock key for a board's key-value namespace.
    pub fn kv_lock_key(&self, board: &str) -> String {
        self.kv_file(board).display().to_string()
    }
}

/// Name of a board's `persistValue` namespace.
pub fn kv_namespace(board: &str) -> String {
    format!("board_{board}")
}
