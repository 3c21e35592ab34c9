use std::sync::Arc;

use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{FeedEntity, FeedItemEntity},
        session_store::SessionStore,
    },
    error::ServiceError,
    services::change_events,
    state::SharedState,
};

/// Where the candidate list of a brand new feed comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSeed {
    /// The configured fallback list, used on create and join so they never wait on the provider.
    Fallback,
    /// A fresh provider search, falling back to the configured list on any failure.
    Provider,
}

/// Result of [`ensure_feed`].
#[derive(Debug, Clone)]
pub struct EnsuredFeed {
    pub feed: FeedEntity,
    /// Whether this call wrote the feed row.
    pub created: bool,
}

/// Return the feed of `user_id`, creating it from `seed` when it does not exist yet.
///
/// Concurrent callers race on the store's (session, user) uniqueness; the loser reloads
/// the winner's row so existing pointers are never reset.
pub async fn ensure_feed(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    user_id: Uuid,
    seed: FeedSeed,
) -> Result<EnsuredFeed, ServiceError> {
    if let Some(feed) = store.find_feed(session_id, user_id).await? {
        return Ok(EnsuredFeed {
            feed,
            created: false,
        });
    }

    let items = match seed {
        FeedSeed::Fallback => state.config().fallback_feed().to_vec(),
        FeedSeed::Provider => fetch_candidates(state).await,
    };
    let feed = FeedEntity::new(session_id, user_id, items);

    if store.insert_feed(feed.clone()).await? {
        info!(
            session_id = %session_id,
            user_id = %user_id,
            items = feed.items.len(),
            "feed created"
        );
        change_events::feed_inserted(state, &feed);
        return Ok(EnsuredFeed {
            feed,
            created: true,
        });
    }

    let feed = store
        .find_feed(session_id, user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("feed of participant `{user_id}`")))?;
    Ok(EnsuredFeed {
        feed,
        created: false,
    })
}

/// Query the provider with the configured search, returning the fallback list when the
/// provider fails, times out or returns nothing.
pub async fn fetch_candidates(state: &SharedState) -> Vec<FeedItemEntity> {
    let config = state.config();
    let provider = state.feed_provider();
    let request = provider.fetch_candidates(config.feed_query.clone(), config.feed_max_results);

    match timeout(config.provider_timeout, request).await {
        Ok(Ok(items)) if !items.is_empty() => items,
        Ok(Ok(_)) => {
            warn!(
                provider = provider.name(),
                "feed provider returned no candidates; using fallback feed"
            );
            config.fallback_feed().to_vec()
        }
        Ok(Err(err)) => {
            warn!(
                provider = provider.name(),
                error = %err,
                "feed provider failed; using fallback feed"
            );
            config.fallback_feed().to_vec()
        }
        Err(_) => {
            warn!(
                provider = provider.name(),
                timeout_ms = config.provider_timeout.as_millis() as u64,
                "feed provider timed out; using fallback feed"
            );
            config.fallback_feed().to_vec()
        }
    }
}
