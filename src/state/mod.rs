pub mod change_bus;
pub mod ownership;
pub mod presence;
pub mod video;

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{feed_provider::FeedProvider, session_store::SessionStore},
    error::ServiceError,
};

pub use self::change_bus::ChangeHub;
pub use self::presence::{PresenceEvent, PresenceRegistry};

pub type SharedState = Arc<AppState>;

/// Capacity of each per-session change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Central application state storing the store handle, live connections and shared services.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    feed_provider: Arc<dyn FeedProvider>,
    config: Arc<AppConfig>,
    changes: ChangeHub,
    presence: PresenceRegistry,
    rng: Mutex<StdRng>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, feed_provider: Arc<dyn FeedProvider>) -> SharedState {
        Self::with_rng(config, feed_provider, StdRng::from_os_rng())
    }

    /// Same as [`AppState::new`] with an explicit random source for owner elections.
    pub fn with_rng(
        config: AppConfig,
        feed_provider: Arc<dyn FeedProvider>,
        rng: StdRng,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            feed_provider,
            config: Arc::new(config),
            changes: ChangeHub::new(CHANGE_CHANNEL_CAPACITY),
            presence: PresenceRegistry::new(),
            rng: Mutex::new(rng),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn feed_provider(&self) -> &Arc<dyn FeedProvider> {
        &self.feed_provider
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast hubs for the per-session change feed.
    pub fn changes(&self) -> &ChangeHub {
        &self.changes
    }

    /// Registry of live presence connections.
    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Run `f` with exclusive access to the shared random source.
    pub async fn use_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().await;
        f(&mut rng)
    }

    /// Update and broadcast the degraded flag. Returns whether the value changed.
    pub fn set_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }
}
