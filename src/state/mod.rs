pub mod batch_cursor;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    content::QuizCatalog,
    dao::quiz_store::QuizStore,
    delivery::Delivery,
    services::{jobs::JobGates, storage_pool::StoragePool},
};

/// Handle passed to handlers and job loops.
pub type SharedState = Arc<AppState>;
/// Slot holding the active store; empty while degraded.
pub type StoreSlot = Arc<RwLock<Option<Arc<dyn QuizStore>>>>;

/// Central application state shared by the HTTP surface and the job loops.
pub struct AppState {
    store: StoreSlot,
    degraded: watch::Sender<bool>,
    pool: StoragePool,
    catalog: Arc<QuizCatalog>,
    config: AppConfig,
    delivery: Arc<dyn Delivery>,
    gates: JobGates,
    admin_token: Option<String>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    /// Must be called from within a tokio runtime: the storage workers are spawned here.
    pub fn new(
        config: AppConfig,
        catalog: QuizCatalog,
        delivery: Arc<dyn Delivery>,
        admin_token: Option<String>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let store: StoreSlot = Arc::new(RwLock::new(None));
        let pool = StoragePool::new(
            Arc::clone(&store),
            config.storage_workers,
            config.storage_timeout,
        );

        Arc::new(Self {
            store,
            degraded: degraded_tx,
            pool,
            catalog: Arc::new(catalog),
            config,
            delivery,
            gates: JobGates::default(),
            admin_token: admin_token.filter(|token| !token.is_empty()),
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Worker pool every storage call goes through.
    pub fn pool(&self) -> &StoragePool {
        &self.pool
    }

    /// Immutable quiz bank.
    pub fn catalog(&self) -> &Arc<QuizCatalog> {
        &self.catalog
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Outbound channel for questions and announcements.
    pub fn delivery(&self) -> &Arc<dyn Delivery> {
        &self.delivery
    }

    /// Non-overlap gates, one per job kind.
    pub fn gates(&self) -> &JobGates {
        &self.gates
    }

    /// Token required on admin routes; admin routes are closed when unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}
