//! Application-level configuration loading, including the built-in fallback feed.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{dao::models::FeedItemEntity, state::video::VideoId};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WATCH_PARTY_CONFIG_PATH";

const DEFAULT_VOTE_THRESHOLD: f64 = 0.5;
const DEFAULT_FEED_QUERY: &str = "funny shorts trending";
const DEFAULT_FEED_MAX_RESULTS: u32 = 50;
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_JOIN_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Threshold applied to sessions created without an explicit one.
    pub default_vote_threshold: f64,
    /// Search query sent to the feed provider.
    pub feed_query: String,
    pub feed_max_results: u32,
    /// Upper bound on a single provider call before falling back.
    pub provider_timeout: Duration,
    /// How many join codes to try before giving up on session creation.
    pub join_code_attempts: u32,
    fallback_feed: Vec<FeedItemEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        fallback_items = app_config.fallback_feed.len(),
                        vote_threshold = app_config.default_vote_threshold,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Placeholder candidates used when the provider fails or returns nothing.
    pub fn fallback_feed(&self) -> &[FeedItemEntity] {
        &self.fallback_feed
    }

    /// Replace the fallback list, mostly useful for tests.
    pub fn with_fallback_feed(mut self, items: Vec<FeedItemEntity>) -> Self {
        self.fallback_feed = items;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_vote_threshold: DEFAULT_VOTE_THRESHOLD,
            feed_query: DEFAULT_FEED_QUERY.to_owned(),
            feed_max_results: DEFAULT_FEED_MAX_RESULTS,
            provider_timeout: Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS),
            join_code_attempts: DEFAULT_JOIN_CODE_ATTEMPTS,
            fallback_feed: default_fallback_feed(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
/// Every field is optional; missing ones keep their built-in value.
struct RawConfig {
    vote_threshold: Option<f64>,
    feed: Option<RawFeedConfig>,
    join_code_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawFeedConfig {
    query: Option<String>,
    max_results: Option<u32>,
    timeout_ms: Option<u64>,
    fallback: Option<Vec<RawFeedItem>>,
}

#[derive(Debug, Deserialize)]
struct RawFeedItem {
    video_id: String,
    title: String,
    thumbnail: Option<String>,
}

impl RawFeedItem {
    /// Keep the item only when its id is a valid video id.
    fn into_entity(self) -> Option<FeedItemEntity> {
        match VideoId::parse_raw(&self.video_id) {
            Some(video_id) => Some(FeedItemEntity {
                video_id: video_id.into_string(),
                title: self.title,
                thumbnail: self.thumbnail,
            }),
            None => {
                warn!(video_id = %self.video_id, "dropping fallback feed item with invalid video id");
                None
            }
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut config = Self::default();
        if let Some(threshold) = value
            .vote_threshold
            .filter(|threshold| *threshold > 0.0 && *threshold <= 1.0)
        {
            config.default_vote_threshold = threshold;
        }
        if let Some(attempts) = value.join_code_attempts.filter(|attempts| *attempts > 0) {
            config.join_code_attempts = attempts;
        }
        if let Some(feed) = value.feed {
            if let Some(query) = feed.query.filter(|query| !query.trim().is_empty()) {
                config.feed_query = query;
            }
            if let Some(max_results) = feed.max_results.filter(|max| *max > 0) {
                config.feed_max_results = max_results;
            }
            if let Some(timeout_ms) = feed.timeout_ms {
                config.provider_timeout = Duration::from_millis(timeout_ms);
            }
            let fallback: Vec<FeedItemEntity> = feed
                .fallback
                .unwrap_or_default()
                .into_iter()
                .filter_map(RawFeedItem::into_entity)
                .collect();
            if !fallback.is_empty() {
                config.fallback_feed = fallback;
            }
        }
        config
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in placeholder feed shipped with the binary.
fn default_fallback_feed() -> Vec<FeedItemEntity> {
    [
        ("FBmNHdZsfXQ", "Skibidi Toilet #1"),
        ("7q8rDLzJZvY", "Sigma Male Grindset"),
        ("wJWksPWDKOc", "Ohio Final Boss"),
        ("YbJOTdZBX1g", "Subway Surfers Gameplay"),
        ("7LKw7UHZw4w", "Family Guy Funny Moments"),
        ("JVMsQJJn0Aw", "Gigachad Theme"),
        ("0RClFPv5r-0", "Brainrot Compilation"),
        ("g7_VlmEamUQ", "Discord Mod Memes"),
        ("OjNpRbNdR7E", "Skibidi Dop Dop Yes Yes"),
        ("kZ9tX0ghVcw", "Only in Ohio"),
        ("9Gc4QTqslN4", "Rizz Memes"),
        ("UoaOGuBb0TY", "TikTok Cringe Compilation"),
        ("W8sGTh7ZpoY", "Skeleton Appearing Meme"),
        ("zjedLeVGcfE", "POV You're in Ohio"),
        ("hyjbqr7gYHs", "Sigma Male Phonk"),
        ("1wnE4vF9CQ4", "Goofy Ahh Sounds"),
        ("LDU_Txk06tM", "Coconut Mall Meme"),
        ("NHO84rOp8FQ", "Walter White Falling"),
        ("ZcoqR9Bwx1Y", "Lean Meme"),
        ("kJa2kwoZ2a4", "Backrooms Found Footage"),
        ("bTAKSRa6dAQ", "Gen Z Humor"),
        ("w0AOGeqOnFY", "Andrew Tate Sigma"),
        ("hH9M-m3WD0g", "Morbius Meme"),
        ("V-_O7nl0Ii0", "Breaking Bad Memes"),
        ("PKtnafFtfEo", "Dream Face Reveal"),
    ]
    .into_iter()
    .map(|(video_id, title)| FeedItemEntity {
        video_id: video_id.to_owned(),
        title: title.to_owned(),
        thumbnail: Some(format!(
            "https://img.youtube.com/vi/{video_id}/maxresdefault.jpg"
        )),
    })
    .collect()
}
