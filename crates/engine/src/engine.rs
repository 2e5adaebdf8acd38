use std::sync::Arc;

use boardwise_core::{CardRegistry, CoreError, LockManager};
use boardwise_events::{EventBus, StateStore};
use boardwise_store::Store;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::autopilot::{AutopilotPoller, LocalProcessManager, ProcessManager};
use crate::boards::BoardService;
use crate::catalog::ActionCatalog;
use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, RunRequest};
use crate::error::ActionError;
use crate::memory::ScratchMemory;
use crate::sandbox::Sandbox;
use crate::token::TokenSigner;
use crate::versions::VersionManager;

/// Every engine service over one data directory, wired together.
pub struct Engine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    registry: CardRegistry,
    catalog: Arc<ActionCatalog>,
    signer: TokenSigner,
    dispatcher: Arc<Dispatcher>,
    boards: BoardService,
    versions: Arc<VersionManager>,
    processes: Arc<dyn ProcessManager>,
    poller: Arc<AutopilotPoller>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let store = Store::new(&config.data_dir);
        let bus = Arc::new(EventBus::default());
        let states = Arc::new(StateStore::new(Arc::clone(&bus)));
        let locks = Arc::new(LockManager::new());
        let catalog = Arc::new(ActionCatalog::new());
        let sandbox = Arc::new(Sandbox::new(&config));
        let signer = TokenSigner::new(config.jwt_secret.clone(), config.service_token_expiry_mins);
        let processes: Arc<dyn ProcessManager> = Arc::new(LocalProcessManager::new(Arc::clone(&bus)));
        let memory = Arc::new(ScratchMemory::new());

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::clone(&locks),
            Arc::clone(&states),
            Arc::clone(&sandbox),
            Arc::clone(&catalog),
            signer.clone(),
            config.lock_timeout,
        ));
        let versions = Arc::new(VersionManager::new(
            store.clone(),
            Arc::clone(&locks),
            Arc::clone(&states),
            Arc::clone(&catalog),
            config.lock_timeout,
        ));
        let boards = BoardService::new(
            store.clone(),
            Arc::clone(&locks),
            Arc::clone(&states),
            Arc::clone(&catalog),
            Arc::clone(&versions),
            Arc::clone(&processes),
            Arc::clone(&memory),
            config.lock_timeout,
        );
        let poller = Arc::new(AutopilotPoller::new(
            store,
            Arc::clone(&states),
            sandbox,
            Arc::clone(&processes),
            memory,
            config.autopilot_interval,
        ));

        Self {
            config,
            bus,
            states,
            registry: CardRegistry::with_builtins(),
            catalog,
            signer,
            dispatcher,
            boards,
            versions,
            processes,
            poller,
        }
    }

    /// Load stored boards. Call once before serving.
    pub async fn start(&self) -> Result<usize, CoreError> {
        tracing::info!(data_dir = %self.config.data_dir.display(), "Engine starting");
        self.boards.load_all().await
    }

    /// Spawn the autopilot loop.
    pub fn spawn_autopilot(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.poller).run(cancel))
    }

    pub async fn run_action(&self, req: RunRequest) -> Result<Value, ActionError> {
        self.dispatcher.run(req).await
    }

    /// Delete a board and forget its action status records.
    pub async fn delete_board(&self, id: &str) -> Result<(), CoreError> {
        self.boards.delete(id).await?;
        self.dispatcher.status().forget_board(id);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn boards(&self) -> &BoardService {
        &self.boards
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn processes(&self) -> &Arc<dyn ProcessManager> {
        &self.processes
    }

    pub fn poller(&self) -> &Arc<AutopilotPoller> {
        &self.poller
    }
}
