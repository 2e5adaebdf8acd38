//! Per-board key-value namespaces for `persistValue` actions.
//!
//! Each namespace is a single JSON object file. Updates are
//! read-modify-write; callers hold the `kv_lock_key` lock around them.

use boardwise_core::board::validate_board_id;
use boardwise_core::types::JsonMap;
use serde_json::Value;

use crate::error::StoreError;
use crate::fs::{read_json, remove_file, write_json};
use crate::layout::DataLayout;

#[derive(Debug, Clone)]
pub struct KvFiles {
    layout: DataLayout,
}

impl KvFiles {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    fn check_id(id: &str) -> Result<(), StoreError> {
        validate_board_id(id).map_err(|e| StoreError::InvalidName(e.to_string()))
    }

    /// The whole namespace. Missing namespaces are empty.
    pub async fn read_all(&self, board: &str) -> Result<JsonMap, StoreError> {
        Self::check_id(board)?;
        Ok(read_json(&self.layout.kv_file(board)).await?.unwrap_or_default())
    }

    pub async fn get(&self, board: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all(board).await?.remove(key))
    }

    pub async fn set(&self, board: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut all = self.read_all(board).await?;
        all.insert(key.to_string(), value);
        write_json(&self.layout.kv_file(board), &all).await
    }

    /// Replace the whole namespace.
    pub async fn write_all(&self, board: &str, all: &JsonMap) -> Result<(), StoreError> {
        Self::check_id(board)?;
        write_json(&self.layout.kv_file(board), all).await
    }

    /// Drop keys not accepted by `keep`. Returns the removed keys.
    pub async fn retain(
        &self,
        board: &str,
        keep: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut all = self.read_all(board).await?;
        let doomed: Vec<String> = all.keys().filter(|k| !keep(k)).cloned().collect();
        if doomed.is_empty() {
            return Ok(doomed);
        }
        for key in &doomed {
            all.remove(key);
        }
        write_json(&self.layout.kv_file(board), &all).await?;
        Ok(doomed)
    }

    pub async fn delete(&self, board: &str) -> Result<bool, StoreError> {
        Self::check_id(board)?;
        remove_file(&self.layout.kv_file(board)).await
    }
}
