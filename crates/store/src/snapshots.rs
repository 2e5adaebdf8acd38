//! Per-board version snapshots, one JSON file per version number.

use boardwise_core::board::validate_board_id;
use boardwise_core::Board;

use crate::error::StoreError;
use crate::fs::{file_names, read_json, remove_dir, write_json};
use crate::layout::DataLayout;

#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    layout: DataLayout,
}

impl SnapshotFiles {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    fn check_id(id: &str) -> Result<(), StoreError> {
        validate_board_id(id).map_err(|e| StoreError::InvalidName(e.to_string()))
    }

    /// Stored version numbers, ascending.
    pub async fn list(&self, board: &str) -> Result<Vec<u64>, StoreError> {
        Self::check_id(board)?;
        let mut versions: Vec<u64> = file_names(&self.layout.versions_dir(board))
            .await?
            .iter()
            .filter_map(|n| n.strip_suffix(".json"))
            .filter_map(|n| n.parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    pub async fn read(&self, board: &str, version: u64) -> Result<Board, StoreError> {
        Self::check_id(board)?;
        read_json(&self.layout.snapshot(board, version))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Version",
                id: format!("{board}@{version}"),
            })
    }

    pub async fn write(&self, board: &str, version: u64, doc: &Board) -> Result<(), StoreError> {
        Self::check_id(board)?;
        write_json(&self.layout.snapshot(board, version), doc).await
    }

    pub async fn exists(&self, board: &str, version: u64) -> bool {
        Self::check_id(board).is_ok()
            && tokio::fs::try_exists(self.layout.snapshot(board, version))
                .await
                .unwrap_or(false)
    }

    /// Drop a board's whole history.
    pub async fn delete_all(&self, board: &str) -> Result<bool, StoreError> {
        Self::check_id(board)?;
        remove_dir(&self.layout.versions_dir(board)).await
    }
}
