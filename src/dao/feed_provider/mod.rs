//! Sources of candidate videos used to seed participant feeds.

pub mod youtube;

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::models::FeedItemEntity;

pub use youtube::YouTubeFeedProvider;

pub type FeedProviderResult<T> = Result<T, FeedProviderError>;

/// Failures raised while fetching candidates. Callers fall back to the built-in list.
#[derive(Debug, Error)]
pub enum FeedProviderError {
    #[error("failed to build feed provider HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to send feed provider request")]
    RequestSend {
        #[source]
        source: reqwest::Error,
    },
    #[error("feed provider answered with status {status}")]
    RequestStatus { status: StatusCode },
    #[error("failed to decode feed provider response")]
    DecodeResponse {
        #[source]
        source: reqwest::Error,
    },
}

/// Produces an ordered list of candidate videos for a search query.
pub trait FeedProvider: Send + Sync {
    fn fetch_candidates(
        &self,
        query: String,
        max_results: u32,
    ) -> BoxFuture<'static, FeedProviderResult<Vec<FeedItemEntity>>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Provider returning a fixed list, used when no API key is configured.
#[derive(Clone)]
pub struct StaticFeedProvider {
    items: Arc<Vec<FeedItemEntity>>,
}

impl StaticFeedProvider {
    pub fn new(items: Vec<FeedItemEntity>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl FeedProvider for StaticFeedProvider {
    fn fetch_candidates(
        &self,
        _query: String,
        max_results: u32,
    ) -> BoxFuture<'static, FeedProviderResult<Vec<FeedItemEntity>>> {
        let items = self.items.clone();
        Box::pin(async move {
            Ok(items
                .iter()
                .take(max_results as usize)
                .cloned()
                .collect())
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_honours_max_results() {
        let items = ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"]
            .into_iter()
            .map(|id| FeedItemEntity {
                video_id: id.into(),
                title: id.into(),
                thumbnail: None,
            })
            .collect();
        let provider = StaticFeedProvider::new(items);

        let fetched = provider.fetch_candidates("ignored".into(), 2).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].video_id, "aaaaaaaaaaa");
    }
}
