use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{FeedProvider, FeedProviderError, FeedProviderResult};
use crate::{dao::models::FeedItemEntity, state::video::VideoId};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

/// Short-form video search through the YouTube Data API v3.
#[derive(Clone)]
pub struct YouTubeFeedProvider {
    client: Client,
    api_key: Arc<str>,
    endpoint: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchResponse {
    /// Keep the items carrying a well-formed video id, in response order.
    fn into_feed_items(self) -> Vec<FeedItemEntity> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let video_id = VideoId::parse_raw(item.id.video_id.as_deref()?)?;
                let (title, thumbnail) = match item.snippet {
                    Some(snippet) => {
                        let Thumbnails { high, default } = snippet.thumbnails;
                        (snippet.title, high.or(default).map(|thumb| thumb.url))
                    }
                    None => (String::new(), None),
                };
                Some(FeedItemEntity {
                    video_id: video_id.into_string(),
                    title,
                    thumbnail,
                })
            })
            .collect()
    }
}

impl YouTubeFeedProvider {
    pub fn new(api_key: String, timeout: Duration) -> FeedProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FeedProviderError::ClientBuilder { source })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: SEARCH_ENDPOINT.into(),
        })
    }

    async fn search(&self, query: String, max_results: u32) -> FeedProviderResult<Vec<FeedItemEntity>> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(&*self.endpoint)
            .query(&[
                ("key", &*self.api_key),
                ("part", "snippet"),
                ("q", query.as_str()),
                ("type", "video"),
                ("videoDuration", "short"),
                ("maxResults", max_results.as_str()),
                ("order", "relevance"),
            ])
            .send()
            .await
            .map_err(|source| FeedProviderError::RequestSend { source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedProviderError::RequestStatus { status });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|source| FeedProviderError::DecodeResponse { source })?;
        let items = body.into_feed_items();
        debug!(query = %query, count = items.len(), "fetched feed candidates");
        Ok(items)
    }
}

impl FeedProvider for YouTubeFeedProvider {
    fn fetch_candidates(
        &self,
        query: String,
        max_results: u32,
    ) -> BoxFuture<'static, FeedProviderResult<Vec<FeedItemEntity>>> {
        let provider = self.clone();
        Box::pin(async move { provider.search(query, max_results).await })
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_payload_is_parsed_and_invalid_ids_dropped() {
        let payload = r#"{
            "kind": "youtube#searchListResponse",
            "items": [
                {
                    "id": { "kind": "youtube#video", "videoId": "FBmNHdZsfXQ" },
                    "snippet": {
                        "title": "Skibidi Toilet #1",
                        "thumbnails": {
                            "default": { "url": "https://i.ytimg.com/vi/FBmNHdZsfXQ/default.jpg" },
                            "high": { "url": "https://i.ytimg.com/vi/FBmNHdZsfXQ/hqdefault.jpg" }
                        }
                    }
                },
                {
                    "id": { "kind": "youtube#channel", "channelId": "UC123" },
                    "snippet": { "title": "A channel" }
                },
                {
                    "id": { "kind": "youtube#video", "videoId": "too-short" }
                },
                {
                    "id": { "kind": "youtube#video", "videoId": "7q8rDLzJZvY" },
                    "snippet": {
                        "title": "Sigma Male Grindset",
                        "thumbnails": {
                            "default": { "url": "https://i.ytimg.com/vi/7q8rDLzJZvY/default.jpg" }
                        }
                    }
                }
            ]
        }"#;

        let response: SearchResponse = serde_json::from_str(payload).unwrap();
        let items = response.into_feed_items();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].video_id, "FBmNHdZsfXQ");
        assert_eq!(
            items[0].thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/FBmNHdZsfXQ/hqdefault.jpg")
        );
        assert_eq!(items[1].title, "Sigma Male Grindset");
        assert_eq!(
            items[1].thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/7q8rDLzJZvY/default.jpg")
        );
    }

    #[test]
    fn empty_payload_yields_no_items() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.into_feed_items().is_empty());
    }
}
