//! Linear version history of board documents.
//!
//! Snapshots are append-only copies of the live document keyed by version
//! number. Every operation that touches a board's snapshot list holds that
//! board's versions lock, so snapshot and restore calls never interleave.
//! Restores that also rewrite the live document take the board lock
//! second; board writes never take the versions lock while holding the
//! board lock.

use std::sync::Arc;
use std::time::Duration;

use boardwise_core::{Board, CoreError, LockManager};
use boardwise_events::{topics, BoardEvent, StateStore};
use boardwise_store::Store;

use crate::catalog::ActionCatalog;

pub struct VersionManager {
    store: Store,
    locks: Arc<LockManager>,
    states: Arc<StateStore>,
    catalog: Arc<ActionCatalog>,
    lock_timeout: Duration,
}

impl VersionManager {
    pub fn new(
        store: Store,
        locks: Arc<LockManager>,
        states: Arc<StateStore>,
        catalog: Arc<ActionCatalog>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            states,
            catalog,
            lock_timeout,
        }
    }

    /// Stored versions, ascending.
    pub async fn list(&self, board: &str) -> Result<Vec<u64>, CoreError> {
        Ok(self.store.snapshots.list(board).await?)
    }

    /// Version of the live document, `None` when the board does not exist.
    pub async fn current(&self, board: &str) -> Result<Option<u64>, CoreError> {
        match self.store.boards.read(board).await {
            Ok(doc) => Ok(Some(doc.version)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot the live document under the next free version number and
    /// advance the live document to it.
    pub async fn snapshot(&self, board: &str) -> Result<u64, CoreError> {
        let _versions = self
            .locks
            .acquire_timeout(&self.store.layout.versions_lock_key(board), self.lock_timeout)
            .await?;
        let _doc = self
            .locks
            .acquire_timeout(&self.store.layout.board_lock_key(board), self.lock_timeout)
            .await?;

        let mut doc = self.store.boards.read(board).await?;
        let last = self.store.snapshots.list(board).await?.last().copied();
        let next = last.map_or(doc.version, |v| v.max(doc.version)) + 1;

        doc.version = next;
        self.store.snapshots.write(board, next, &doc).await?;
        self.store.boards.write(&doc).await?;

        tracing::info!(board = %board, version = next, "Snapshot taken");
        Ok(next)
    }

    /// Record the outcome of a board write.
    ///
    /// A snapshot is taken iff the written version is strictly greater than
    /// `previous` (or there was no previous document). Existing snapshots
    /// are never replaced: this runs outside the board lock, so writes can
    /// arrive here out of order. Returns the snapshotted version.
    pub async fn record_write(
        &self,
        previous: Option<u64>,
        doc: &Board,
    ) -> Result<Option<u64>, CoreError> {
        if previous.is_some_and(|p| doc.version <= p) {
            return Ok(None);
        }

        let _versions = self
            .locks
            .acquire_timeout(&self.store.layout.versions_lock_key(&doc.name), self.lock_timeout)
            .await?;
        if self.store.snapshots.exists(&doc.name, doc.version).await {
            tracing::debug!(board = %doc.name, version = doc.version, "Snapshot already recorded");
            return Ok(None);
        }
        self.store.snapshots.write(&doc.name, doc.version, doc).await?;

        tracing::info!(board = %doc.name, version = doc.version, "Snapshot recorded");
        Ok(Some(doc.version))
    }

    /// Overwrite the live document with snapshot `version`. The snapshot
    /// list is left intact so later versions stay reachable.
    pub async fn restore(&self, board: &str, version: u64) -> Result<Board, CoreError> {
        let _versions = self
            .locks
            .acquire_timeout(&self.store.layout.versions_lock_key(board), self.lock_timeout)
            .await?;
        self.restore_locked(board, version).await
    }

    async fn restore_locked(&self, board: &str, version: u64) -> Result<Board, CoreError> {
        let mut doc = self.store.snapshots.read(board, version).await?;
        doc.name = board.to_string();
        doc.version = version;

        {
            let _doc = self
                .locks
                .acquire_timeout(&self.store.layout.board_lock_key(board), self.lock_timeout)
                .await?;
            self.store.boards.write(&doc).await?;
            self.store.boards.sync_card_files(&doc).await?;
            crate::boards::prune_state(&self.states, &doc);
        }

        self.catalog.register_board(&doc);
        self.states.bus().publish(
            BoardEvent::new(topics::board_update(board))
                .with_from("versions")
                .with_payload(serde_json::json!({ "version": version, "restored": true })),
        );
        tracing::info!(board = %board, version, "Version restored");
        Ok(doc)
    }

    /// Step to the nearest older snapshot. `None` at the oldest version.
    pub async fn undo(&self, board: &str) -> Result<Option<Board>, CoreError> {
        self.step(board, |versions, current| {
            versions.iter().rev().copied().find(|v| *v < current)
        })
        .await
    }

    /// Step to the nearest newer snapshot. `None` at the newest version.
    pub async fn redo(&self, board: &str) -> Result<Option<Board>, CoreError> {
        self.step(board, |versions, current| {
            versions.iter().copied().find(|v| *v > current)
        })
        .await
    }

    async fn step(
        &self,
        board: &str,
        pick: impl Fn(&[u64], u64) -> Option<u64>,
    ) -> Result<Option<Board>, CoreError> {
        let _versions = self
            .locks
            .acquire_timeout(&self.store.layout.versions_lock_key(board), self.lock_timeout)
            .await?;

        let current = self
            .current(board)
            .await?
            .ok_or_else(|| CoreError::not_found("Board", board))?;
        let versions = self.store.snapshots.list(board).await?;

        match pick(&versions, current) {
            Some(target) => self.restore_locked(board, target).await.map(Some),
            None => {
                tracing::debug!(board = %board, current, "No version to step to");
                Ok(None)
            }
        }
    }
}
