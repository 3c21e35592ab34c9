//! Video identifier parsing for queue submissions and provider payloads.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use thiserror::Error;

static RAW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid raw video id pattern"));

// The id must be followed by the end of input or a character that cannot be part of an id.
static URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:[A-Za-z0-9-]+\.)?(?:youtube\.com/(?:shorts/|watch\?(?:[^#]*&)?v=)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-].*)?$",
    )
    .expect("valid video url pattern")
});

/// Rejected video reference.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{input}` is not a video id or a supported video URL")]
pub struct InvalidVideoId {
    pub input: String,
}

/// Validated 11 character video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    /// Accept a raw id or a `shorts/`, `watch?v=` or `youtu.be/` URL.
    pub fn parse(input: &str) -> Result<Self, InvalidVideoId> {
        let trimmed = input.trim();
        if RAW_ID.is_match(trimmed) {
            return Ok(Self(trimmed.to_owned()));
        }
        URL_ID
            .captures(trimmed)
            .and_then(|captures| captures.get(1))
            .map(|id| Self(id.as_str().to_owned()))
            .ok_or_else(|| InvalidVideoId {
                input: input.to_owned(),
            })
    }

    /// Accept only a bare id, as returned by the feed provider.
    pub fn parse_raw(input: &str) -> Option<Self> {
        RAW_ID.is_match(input).then(|| Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn thumbnail_url(&self) -> String {
        format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
