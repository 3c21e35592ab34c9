use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{
        ChatMessageEntity, FeedEntity, FeedItemEntity, ParticipantEntity, PlaybackSource,
        QueueItemEntity, SessionEntity, VoteEntity,
    },
    state::video::VideoId,
};

pub const SESSIONS: &str = "sessions";
pub const PARTICIPANTS: &str = "participants";
pub const FEEDS: &str = "feeds";
pub const QUEUE_ITEMS: &str = "queue_items";
pub const VOTES: &str = "votes";
pub const CHAT_MESSAGES: &str = "chat_messages";

fn parse_id(collection: &'static str, field: &'static str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|source| MongoDaoError::CorruptDocument {
        collection,
        field,
        value: value.to_owned(),
        source,
    })
}

fn parse_optional_id(
    collection: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> MongoResult<Option<Uuid>> {
    value
        .map(|value| parse_id(collection, field, value))
        .transpose()
}

pub fn playback_source_name(source: PlaybackSource) -> &'static str {
    match source {
        PlaybackSource::Queue => "queue",
        PlaybackSource::Feed => "feed",
        PlaybackSource::None => "none",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub join_code: String,
    pub host_id: Option<String>,
    pub current_feed_owner_id: Option<String>,
    pub current_video_id: Option<String>,
    pub current_queue_item_id: Option<String>,
    #[serde(default)]
    pub current_source: PlaybackSource,
    pub playback_started_at: Option<DateTime>,
    pub vote_threshold: f64,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            join_code: value.join_code,
            host_id: value.host_id.map(|id| id.to_string()),
            current_feed_owner_id: value.current_feed_owner_id.map(|id| id.to_string()),
            current_video_id: value.current_video_id,
            current_queue_item_id: value.current_queue_item_id.map(|id| id.to_string()),
            current_source: value.current_source,
            playback_started_at: value.playback_started_at.map(DateTime::from_system_time),
            vote_threshold: value.vote_threshold,
            is_active: value.is_active,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(SESSIONS, "_id", &value.id)?,
            join_code: value.join_code,
            host_id: parse_optional_id(SESSIONS, "host_id", value.host_id.as_deref())?,
            current_feed_owner_id: parse_optional_id(
                SESSIONS,
                "current_feed_owner_id",
                value.current_feed_owner_id.as_deref(),
            )?,
            current_video_id: value.current_video_id,
            current_queue_item_id: parse_optional_id(
                SESSIONS,
                "current_queue_item_id",
                value.current_queue_item_id.as_deref(),
            )?,
            current_source: value.current_source,
            playback_started_at: value.playback_started_at.map(DateTime::to_system_time),
            vote_threshold: value.vote_threshold,
            is_active: value.is_active,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub display_name: String,
    pub is_host: bool,
    pub is_connected: bool,
    pub last_seen_at: DateTime,
    pub created_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            display_name: value.display_name,
            is_host: value.is_host,
            is_connected: value.is_connected,
            last_seen_at: DateTime::from_system_time(value.last_seen_at),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(PARTICIPANTS, "_id", &value.id)?,
            session_id: parse_id(PARTICIPANTS, "session_id", &value.session_id)?,
            display_name: value.display_name,
            is_host: value.is_host,
            is_connected: value.is_connected,
            last_seen_at: value.last_seen_at.to_system_time(),
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Feed item as stored; older rows may lack a title or thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFeedItem {
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFeedDocument {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<MongoFeedItem>,
    pub pointer_index: i64,
    pub updated_at: DateTime,
}

impl From<FeedEntity> for MongoFeedDocument {
    fn from(value: FeedEntity) -> Self {
        Self {
            session_id: value.session_id.to_string(),
            user_id: value.user_id.to_string(),
            items: value
                .items
                .into_iter()
                .map(|item| MongoFeedItem {
                    video_id: item.video_id,
                    title: item.title,
                    thumbnail: item.thumbnail,
                })
                .collect(),
            pointer_index: i64::try_from(value.pointer_index).unwrap_or(i64::MAX),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoFeedDocument> for FeedEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoFeedDocument) -> MongoResult<Self> {
        let items: Vec<FeedItemEntity> = value
            .items
            .into_iter()
            .filter_map(|item| match VideoId::parse_raw(&item.video_id) {
                Some(video_id) => Some(FeedItemEntity {
                    video_id: video_id.into_string(),
                    title: item.title,
                    thumbnail: item.thumbnail,
                }),
                None => {
                    warn!(
                        session_id = %value.session_id,
                        video_id = %item.video_id,
                        "dropping stored feed item with invalid video id"
                    );
                    None
                }
            })
            .collect();
        let pointer_index = usize::try_from(value.pointer_index.max(0))
            .unwrap_or(usize::MAX)
            .min(items.len());
        Ok(Self {
            session_id: parse_id(FEEDS, "session_id", &value.session_id)?,
            user_id: parse_id(FEEDS, "user_id", &value.user_id)?,
            items,
            pointer_index,
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQueueItemDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub video_id: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub added_by: String,
    pub played: bool,
    pub created_at: DateTime,
}

impl From<QueueItemEntity> for MongoQueueItemDocument {
    fn from(value: QueueItemEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            video_id: value.video_id,
            title: value.title,
            thumbnail_url: value.thumbnail_url,
            added_by: value.added_by.to_string(),
            played: value.played,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoQueueItemDocument> for QueueItemEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQueueItemDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(QUEUE_ITEMS, "_id", &value.id)?,
            session_id: parse_id(QUEUE_ITEMS, "session_id", &value.session_id)?,
            video_id: value.video_id,
            title: value.title,
            thumbnail_url: value.thumbnail_url,
            added_by: parse_id(QUEUE_ITEMS, "added_by", &value.added_by)?,
            played: value.played,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    pub session_id: String,
    pub user_id: String,
    pub vote: bool,
    pub updated_at: DateTime,
}

impl TryFrom<MongoVoteDocument> for VoteEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoVoteDocument) -> MongoResult<Self> {
        Ok(Self {
            session_id: parse_id(VOTES, "session_id", &value.session_id)?,
            user_id: parse_id(VOTES, "user_id", &value.user_id)?,
            vote: value.vote,
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChatMessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub participant_id: String,
    pub message: String,
    pub created_at: DateTime,
}

impl From<ChatMessageEntity> for MongoChatMessageDocument {
    fn from(value: ChatMessageEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            participant_id: value.participant_id.to_string(),
            message: value.message,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoChatMessageDocument> for ChatMessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoChatMessageDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(CHAT_MESSAGES, "_id", &value.id)?,
            session_id: parse_id(CHAT_MESSAGES, "session_id", &value.session_id)?,
            participant_id: parse_id(CHAT_MESSAGES, "participant_id", &value.participant_id)?,
            message: value.message,
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Convert every fetched document, failing on the first corrupt one.
pub fn convert_all<D, E>(documents: Vec<D>) -> MongoResult<Vec<E>>
where
    E: TryFrom<D, Error = MongoDaoError>,
{
    documents.into_iter().map(E::try_from).collect()
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn pointer_is_clamped_to_the_item_count() {
        let document = MongoFeedDocument {
            session_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            items: vec![MongoFeedItem {
                video_id: "aaaaaaaaaaa".into(),
                title: String::new(),
                thumbnail: None,
            }],
            pointer_index: 7,
            updated_at: DateTime::from_system_time(SystemTime::now()),
        };

        let feed = FeedEntity::try_from(document).unwrap();
        assert_eq!(feed.pointer_index, 1);
        assert!(feed.is_exhausted());
    }

    #[test]
    fn invalid_video_ids_are_dropped_before_clamping() {
        let item = |video_id: &str| MongoFeedItem {
            video_id: video_id.into(),
            title: String::new(),
            thumbnail: None,
        };
        let document = MongoFeedDocument {
            session_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            items: vec![item("tooshort"), item("abcDEFghi12"), item("javascript:x")],
            pointer_index: 5,
            updated_at: DateTime::from_system_time(SystemTime::now()),
        };

        let feed = FeedEntity::try_from(document).unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].video_id, "abcDEFghi12");
        assert_eq!(feed.pointer_index, 1);
    }

    #[test]
    fn corrupt_ids_are_reported_with_their_field() {
        let now = DateTime::from_system_time(SystemTime::now());
        let document = MongoChatMessageDocument {
            id: Uuid::now_v7().to_string(),
            session_id: "not-a-uuid".into(),
            participant_id: Uuid::new_v4().to_string(),
            message: "hi".into(),
            created_at: now,
        };

        let err = ChatMessageEntity::try_from(document).unwrap_err();
        assert!(matches!(
            err,
            MongoDaoError::CorruptDocument {
                field: "session_id",
                ..
            }
        ));
    }
}
