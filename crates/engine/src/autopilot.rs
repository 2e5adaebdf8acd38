//! Autopilot: background refresh of value cards.
//!
//! [`AutopilotPoller::run`] ticks on a fixed interval. Each tick spawns
//! one refresh task per board that is not still reloading from an earlier
//! tick; busy boards are skipped and picked up again on the next tick.
//! The reloading mark is cleared by a drop guard, so a failing or
//! panicking refresh never locks its board out.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use boardwise_core::types::JsonMap;
use boardwise_core::{params, returns, Board};
use boardwise_events::topics;
use boardwise_events::{BoardEvent, EventBus, Report, StateStore, BOARDS_GROUP};
use boardwise_store::{Store, StoreError};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::memory::ScratchMemory;
use crate::sandbox::{Sandbox, ValueScope};

// ---------------------------------------------------------------------------
// Process manager
// ---------------------------------------------------------------------------

/// Tracks which boards have a background process and hears about every
/// value the poller observes.
pub trait ProcessManager: Send + Sync {
    fn is_running(&self, board: &str) -> bool;

    /// Returns `false` when already running.
    fn start(&self, board: &str) -> bool;

    /// Returns `false` when not running.
    fn stop(&self, board: &str) -> bool;

    fn notify_value(&self, board: &str, card: &str, value: &Value);
}

/// In-process manager: an enabled set plus `autopilot/...` events.
pub struct LocalProcessManager {
    running: RwLock<BTreeSet<String>>,
    bus: Arc<EventBus>,
}

impl LocalProcessManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            running: RwLock::new(BTreeSet::new()),
            bus,
        }
    }
}

impl ProcessManager for LocalProcessManager {
    fn is_running(&self, board: &str) -> bool {
        self.running
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(board)
    }

    fn start(&self, board: &str) -> bool {
        let started = self
            .running
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(board.to_string());
        if started {
            tracing::info!(board = %board, "Autopilot enabled");
        }
        started
    }

    fn stop(&self, board: &str) -> bool {
        let stopped = self
            .running
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(board);
        if stopped {
            tracing::info!(board = %board, "Autopilot disabled");
        }
        stopped
    }

    fn notify_value(&self, board: &str, card: &str, value: &Value) {
        self.bus.publish(
            BoardEvent::new(topics::autopilot_update(board, card))
                .with_from("autopilot")
                .with_payload(value.clone()),
        );
    }
}

// ---------------------------------------------------------------------------
// Reloading set
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Reloading(Arc<Mutex<HashSet<String>>>);

impl Reloading {
    /// Mark `board` busy, or `None` if it already is.
    fn try_mark(&self, board: &str) -> Option<ReloadGuard> {
        let inserted = self
            .0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(board.to_string());
        inserted.then(|| ReloadGuard {
            set: self.clone(),
            board: board.to_string(),
        })
    }

    fn contains(&self, board: &str) -> bool {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).contains(board)
    }
}

struct ReloadGuard {
    set: Reloading,
    board: String,
}

impl Drop for ReloadGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.board);
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct AutopilotPoller {
    store: Store,
    states: Arc<StateStore>,
    sandbox: Arc<Sandbox>,
    processes: Arc<dyn ProcessManager>,
    memory: Arc<ScratchMemory>,
    reloading: Reloading,
    interval: Duration,
}

impl AutopilotPoller {
    pub fn new(
        store: Store,
        states: Arc<StateStore>,
        sandbox: Arc<Sandbox>,
        processes: Arc<dyn ProcessManager>,
        memory: Arc<ScratchMemory>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            states,
            sandbox,
            processes,
            memory,
            reloading: Reloading::default(),
            interval,
        }
    }

    pub fn is_reloading(&self, board: &str) -> bool {
        self.reloading.contains(board)
    }

    /// Run the poll loop until the cancellation token is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Autopilot poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Autopilot poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Autopilot tick failed");
                    }
                }
            }
        }
    }

    /// Start one refresh task per idle board. Returns the spawned tasks.
    pub async fn tick(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, StoreError> {
        let mut tasks = Vec::new();
        for board in self.store.boards.list_ids().await? {
            let Some(guard) = self.reloading.try_mark(&board) else {
                tracing::debug!(board = %board, "Board still reloading, skipping tick");
                continue;
            };

            let poller = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let _guard = guard;
                match poller.refresh_board(&board).await {
                    Ok(0) => {}
                    Ok(changed) => tracing::trace!(board = %board, changed, "Value cards refreshed"),
                    Err(e) => tracing::warn!(board = %board, error = %e, "Board refresh failed"),
                }
            }));
        }
        Ok(tasks)
    }

    /// Refresh one board now unless a refresh of it is already running.
    /// `None` means the board was busy.
    pub async fn refresh_if_idle(&self, board_id: &str) -> Result<Option<usize>, StoreError> {
        let Some(_guard) = self.reloading.try_mark(board_id) else {
            return Ok(None);
        };
        self.refresh_board(board_id).await.map(Some)
    }

    /// Re-evaluate every value card of one board. Returns how many values
    /// changed. A failing card is logged and does not stop the others.
    pub async fn refresh_board(&self, board_id: &str) -> Result<usize, StoreError> {
        let board = self.store.boards.read(board_id).await?;
        self.memory
            .retain(board_id, |key| board.cards.iter().any(|c| c.key == key));
        let mut changed = 0;

        for card in board.values().filter(|c| !c.rules_code.trim().is_empty()) {
            match self.evaluate(&board, card).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    board = %board_id,
                    card = %card.name,
                    error = %e,
                    "Value card failed",
                ),
            }
        }
        Ok(changed)
    }

    async fn evaluate(
        &self,
        board: &Board,
        card: &boardwise_core::Card,
    ) -> Result<bool, crate::sandbox::SandboxError> {
        let board_state = self.states.get_by_tag(BOARDS_GROUP, &board.name);
        let scope = ValueScope {
            board_id: board.name.clone(),
            card_name: card.name.clone(),
            params: params::resolve_params(card, &JsonMap::new(), &board_state),
            states: self.states.get_state_tree(),
            board: board_state,
            card: serde_json::to_value(card).unwrap_or(Value::Null),
            memory: self.memory.get(&board.name, &card.key),
        };

        let outcome = self.sandbox.run_value(&card.rules_code, scope).await?;
        self.memory.put(&board.name, &card.key, outcome.memory);

        let value = returns::post_process(card, outcome.value);
        let report = if card.always_report_value {
            Report::Always
        } else {
            Report::OnChange
        };
        let changed = self
            .states
            .set(BOARDS_GROUP, &board.name, &card.name, value.clone(), report);
        if changed {
            self.processes.notify_value(&board.name, &card.name, &value);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use boardwise_core::{Card, CardType};
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;

    fn poller(dir: &std::path::Path) -> (Arc<AutopilotPoller>, Arc<StateStore>, Store) {
        let store = Store::new(dir);
        let bus = Arc::new(EventBus::default());
        let states = Arc::new(StateStore::new(Arc::clone(&bus)));
        let poller = Arc::new(AutopilotPoller::new(
            store.clone(),
            Arc::clone(&states),
            Arc::new(Sandbox::new(&EngineConfig::with_data_dir(dir))),
            Arc::new(LocalProcessManager::new(bus)),
            Arc::new(ScratchMemory::new()),
            Duration::from_millis(10),
        ));
        (poller, states, store)
    }

    #[test]
    fn local_manager_tracks_running_boards() {
        let manager = LocalProcessManager::new(Arc::new(EventBus::default()));
        assert!(manager.start("demo"));
        assert!(!manager.start("demo"));
        assert!(manager.is_running("demo"));
        assert!(manager.stop("demo"));
        assert!(!manager.stop("demo"));
    }

    #[test]
    fn reload_guard_clears_on_drop() {
        let reloading = Reloading::default();
        let guard = reloading.try_mark("demo").unwrap();
        assert!(reloading.try_mark("demo").is_none());
        drop(guard);
        assert!(reloading.try_mark("demo").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn value_cards_are_refreshed_with_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, states, store) = poller(dir.path());
        let ticks = Card::new("k1", "ticks", CardType::Value)
            .with_rules("memory.n = (memory.n or 0) + 1\nreturn memory.n");
        store
            .boards
            .write(&Board::new("demo").with_card(ticks))
            .await
            .unwrap();

        for _ in 0..3 {
            for task in poller.tick().await.unwrap() {
                task.await.unwrap();
            }
        }
        assert_eq!(states.get(BOARDS_GROUP, "demo", "ticks"), Some(json!(3)));
        assert!(!poller.is_reloading("demo"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn memory_is_private_to_each_board() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, states, store) = poller(dir.path());
        let body = "memory.n = (memory.n or 0) + 1\nreturn memory.n";
        for id in ["one", "two"] {
            let card = Card::new("k1", "ticks", CardType::Value).with_rules(body);
            store.boards.write(&Board::new(id).with_card(card)).await.unwrap();
        }

        poller.refresh_board("one").await.unwrap();
        poller.refresh_board("two").await.unwrap();
        assert_eq!(states.get(BOARDS_GROUP, "one", "ticks"), Some(json!(1)));
        assert_eq!(states.get(BOARDS_GROUP, "two", "ticks"), Some(json!(1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn memory_of_removed_cards_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, states, store) = poller(dir.path());
        let body = "memory.n = (memory.n or 0) + 1\nreturn memory.n";
        let counting = Board::new("demo").with_card(Card::new("k1", "ticks", CardType::Value).with_rules(body));
        store.boards.write(&counting).await.unwrap();
        poller.refresh_board("demo").await.unwrap();
        poller.refresh_board("demo").await.unwrap();
        assert_eq!(states.get(BOARDS_GROUP, "demo", "ticks"), Some(json!(2)));

        store.boards.write(&Board::new("demo")).await.unwrap();
        poller.refresh_board("demo").await.unwrap();
        store.boards.write(&counting).await.unwrap();
        poller.refresh_board("demo").await.unwrap();
        assert_eq!(states.get(BOARDS_GROUP, "demo", "ticks"), Some(json!(1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_cards_do_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, states, store) = poller(dir.path());
        let board = Board::new("demo")
            .with_card(Card::new("k1", "bad", CardType::Value).with_rules("error('x')"))
            .with_card(Card::new("k2", "good", CardType::Value).with_rules("42"));
        store.boards.write(&board).await.unwrap();

        assert_eq!(poller.refresh_board("demo").await.unwrap(), 1);
        assert_eq!(states.get(BOARDS_GROUP, "demo", "good"), Some(json!(42)));

        for task in poller.tick().await.unwrap() {
            task.await.unwrap();
        }
        assert!(!poller.is_reloading("demo"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_if_idle_skips_busy_boards() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, _, store) = poller(dir.path());
        let board = Board::new("demo").with_card(Card::new("k1", "n", CardType::Value).with_rules("1"));
        store.boards.write(&board).await.unwrap();

        let busy = poller.reloading.try_mark("demo").unwrap();
        assert_eq!(poller.refresh_if_idle("demo").await.unwrap(), None);
        drop(busy);
        assert_eq!(poller.refresh_if_idle("demo").await.unwrap(), Some(1));
        assert!(!poller.is_reloading("demo"));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, _, _) = poller(dir.path());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
