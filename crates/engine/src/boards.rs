//! Board document orchestration: get, put, delete, list and card reads.
//!
//! A put validates the incoming document, then performs its whole
//! read-modify-write under the board's document lock: companions, the
//! document itself, per-card mirrors and the state reconciliation for
//! renamed and removed cards. The snapshot decision is made after the lock
//! is released.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use boardwise_core::board::validate_board_id;
use boardwise_core::{Board, CoreError, LockManager};
use boardwise_events::{topics, BoardEvent, Report, StateStore, BOARDS_GROUP};
use boardwise_store::Store;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::autopilot::ProcessManager;
use crate::catalog::ActionCatalog;
use crate::memory::ScratchMemory;
use crate::token::Access;
use crate::versions::VersionManager;

/// A board as returned to readers: stored values merged into the cards,
/// plus whether autopilot is on.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub board: Board,
    pub autopilot: bool,
}

/// Result of a put.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub board: Board,
    pub created: bool,
    /// Version snapshotted by this write, if any.
    pub snapshot: Option<u64>,
}

/// Drop state entries of cards that are not on `board`, publishing a
/// delete for each.
pub(crate) fn prune_state(states: &StateStore, board: &Board) -> Vec<String> {
    let names: HashSet<&str> = board.cards.iter().map(|c| c.name.as_str()).collect();
    let pruned = states.retain(BOARDS_GROUP, &board.name, |name| names.contains(name));
    if !pruned.is_empty() {
        tracing::debug!(board = %board.name, pruned = ?pruned, "Pruned orphaned state");
    }
    pruned
}

pub struct BoardService {
    store: Store,
    locks: Arc<LockManager>,
    states: Arc<StateStore>,
    catalog: Arc<ActionCatalog>,
    versions: Arc<VersionManager>,
    processes: Arc<dyn ProcessManager>,
    memory: Arc<ScratchMemory>,
    lock_timeout: Duration,
}

impl BoardService {
    pub fn new(
        store: Store,
        locks: Arc<LockManager>,
        states: Arc<StateStore>,
        catalog: Arc<ActionCatalog>,
        versions: Arc<VersionManager>,
        processes: Arc<dyn ProcessManager>,
        memory: Arc<ScratchMemory>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            states,
            catalog,
            versions,
            processes,
            memory,
            lock_timeout,
        }
    }

    fn publish(&self, topic: String, payload: Value) {
        self.states
            .bus()
            .publish(BoardEvent::new(topic).with_from("boards").with_payload(payload));
    }

    pub async fn get(&self, id: &str) -> Result<BoardView, CoreError> {
        let mut board = self.store.boards.read(id).await?;
        let values = self.states.get_by_tag(BOARDS_GROUP, id);
        for card in &mut board.cards {
            card.value = values.get(&card.name).cloned();
        }
        Ok(BoardView {
            autopilot: self.processes.is_running(id),
            board,
        })
    }

    /// Every readable board. Malformed documents are skipped.
    pub async fn list(&self) -> Result<Vec<Board>, CoreError> {
        Ok(self.store.boards.list().await?)
    }

    /// Upsert a board document.
    pub async fn put(&self, mut board: Board) -> Result<PutOutcome, CoreError> {
        board.validate()?;
        board.strip_values();
        board.saved_at = Some(Utc::now());
        let renames = board.take_renames();
        let id = board.name.clone();

        let (previous, created) = {
            let _guard = self
                .locks
                .acquire_timeout(&self.store.layout.board_lock_key(&id), self.lock_timeout)
                .await?;

            let previous = match self.store.boards.read(&id).await {
                Ok(doc) => Some(doc.version),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    tracing::warn!(board = %id, error = %e, "Existing document unreadable, overwriting");
                    None
                }
            };

            let created = self.store.boards.ensure_companions(&id).await?;
            self.store.boards.write(&board).await?;
            self.store.boards.sync_card_files(&board).await?;

            for (from, to) in self.states.rename(BOARDS_GROUP, &id, &renames) {
                tracing::info!(board = %id, from = %from, to = %to, "Migrated state for renamed card");
            }
            prune_state(&self.states, &board);
            self.memory
                .retain(&id, |key| board.cards.iter().any(|c| c.key == key));

            (previous, created)
        };

        self.reconcile_persisted(&board, &renames).await?;
        self.catalog.register_board(&board);
        self.publish(
            topics::board_update(&id),
            json!({ "version": board.version, "created": created }),
        );
        tracing::info!(board = %id, version = board.version, cards = board.cards.len(), "Board saved");

        let snapshot = self.versions.record_write(previous, &board).await?;
        Ok(PutOutcome {
            board,
            created,
            snapshot,
        })
    }

    /// Keep the `persistValue` namespace in step with the document: carry
    /// renamed keys over, drop keys of removed cards, make sure every
    /// persisting action has an entry, and seed missing state from it.
    async fn reconcile_persisted(&self, board: &Board, renames: &[(String, String)]) -> Result<(), CoreError> {
        let id = &board.name;
        let _guard = self
            .locks
            .acquire_timeout(&self.store.layout.kv_lock_key(id), self.lock_timeout)
            .await?;

        let mut stored = self.store.kv.read_all(id).await?;
        let taken: Vec<(&String, Value)> = renames
            .iter()
            .filter_map(|(from, to)| stored.remove(from).map(|value| (to, value)))
            .collect();
        let mut dirty = !taken.is_empty();
        for (to, value) in taken {
            stored.insert(to.clone(), value);
        }

        let persisting: HashSet<&str> = board
            .actions()
            .filter(|c| c.persist_value)
            .map(|c| c.name.as_str())
            .collect();
        let before = stored.len();
        stored.retain(|k, _| persisting.contains(k.as_str()));
        dirty |= stored.len() != before;

        for name in &persisting {
            if !stored.contains_key(*name) {
                stored.insert((*name).to_string(), Value::Null);
                dirty = true;
            }
        }

        for (name, value) in &stored {
            if !value.is_null() && self.states.get(BOARDS_GROUP, id, name).is_none() {
                self.states.set(BOARDS_GROUP, id, name, value.clone(), Report::Silent);
            }
        }

        if dirty {
            self.store.kv.write_all(id, &stored).await?;
        }
        Ok(())
    }

    /// Remove a board with its companions, history, persisted values,
    /// state and catalog entries.
    pub async fn delete(&self, id: &str) -> Result<(), CoreError> {
        validate_board_id(id)?;
        {
            let _guard = self
                .locks
                .acquire_timeout(&self.store.layout.board_lock_key(id), self.lock_timeout)
                .await?;
            if !self.store.boards.delete(id).await? {
                return Err(CoreError::not_found("Board", id));
            }
        }

        {
            let _guard = self
                .locks
                .acquire_timeout(&self.store.layout.versions_lock_key(id), self.lock_timeout)
                .await?;
            self.store.snapshots.delete_all(id).await?;
        }
        {
            let _guard = self
                .locks
                .acquire_timeout(&self.store.layout.kv_lock_key(id), self.lock_timeout)
                .await?;
            self.store.kv.delete(id).await?;
        }

        self.states.remove_tag(BOARDS_GROUP, id);
        self.memory.forget_board(id);
        self.catalog.unregister_board(id);
        self.processes.stop(id);
        self.publish(topics::board_delete(id), json!({}));
        tracing::info!(board = %id, "Board deleted");
        Ok(())
    }

    /// Last stored value of a card without running it.
    pub async fn read_value(&self, id: &str, card: &str, access: &Access) -> Result<Value, CoreError> {
        let board = self.store.boards.read(id).await?;
        let card = board
            .card(card)
            .ok_or_else(|| CoreError::not_found("Card", format!("{id}/{card}")))?;
        if !access.permits(card.tokens.read.as_deref()) {
            return Err(CoreError::Forbidden(format!(
                "a valid read token is required for '{}'",
                card.name
            )));
        }
        Ok(self
            .states
            .get(BOARDS_GROUP, id, &card.name)
            .unwrap_or(Value::Null))
    }

    /// Register every stored board's actions and seed persisted values.
    /// Returns how many boards were loaded.
    pub async fn load_all(&self) -> Result<usize, CoreError> {
        let boards = self.store.boards.list().await?;
        for board in &boards {
            self.catalog.register_board(board);
            self.reconcile_persisted(board, &[]).await?;
        }
        tracing::info!(boards = boards.len(), "Boards loaded");
        Ok(boards.len())
    }
}
