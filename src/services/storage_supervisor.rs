use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    services::change_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a session store installed, flipping degraded mode while the backend is unreachable.
///
/// `connect` builds a brand new store. An installed store that fails its health check is
/// first asked to reconnect in place; after [`MAX_RECONNECT_ATTEMPTS`] failures it is
/// dropped and `connect` runs again with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "session store connection failed");
                sleep(delay).await;
                delay = next_delay(delay);
                continue;
            }
        };

        let was_degraded = state.is_degraded().await;
        state.install_session_store(store.clone()).await;
        if was_degraded {
            change_events::system_status(&state, false);
        }
        info!("session store connected; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch_store(&state, store.as_ref()).await;

        warn!("session store lost; staying in degraded mode until it reconnects");
        state.clear_session_store().await;
        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn watch_store(state: &SharedState, store: &dyn SessionStore) {
    loop {
        if store.health_check().await.is_ok() {
            if set_degraded(state, false) {
                info!("session store healthy again; leaving degraded mode");
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            return;
        }
        set_degraded(state, false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "session store reconnected after failed health check");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "session store reconnect failed; entering degraded mode");
                    set_degraded(state, true);
                } else {
                    warn!(attempt, error = %err, "session store reconnect failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
    false
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Flip the degraded flag and tell open streams when it actually changed.
fn set_degraded(state: &SharedState, degraded: bool) -> bool {
    let changed = state.set_degraded(degraded);
    if changed {
        change_events::system_status(state, degraded);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{feed_provider::StaticFeedProvider, session_store::memory::MemorySessionStore},
        state::AppState,
    };

    #[tokio::test]
    async fn first_successful_connection_leaves_degraded_mode() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(StaticFeedProvider::new(Vec::new())),
        );
        let mut watcher = state.degraded_watcher();
        let mut attempts = 0;

        tokio::spawn(run(state.clone(), move || {
            attempts += 1;
            let outcome = if attempts < 3 {
                Err(StorageError::unavailable(
                    "unreachable".into(),
                    std::io::Error::other("refused"),
                ))
            } else {
                Ok(Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>)
            };
            async move { outcome }
        }));

        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow());
        assert!(state.session_store().await.is_some());
    }
}
