use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Where the video currently shown to the session came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSource {
    /// An item explicitly queued by a participant.
    Queue,
    /// The current feed owner's candidate list.
    Feed,
    /// Nothing has been played yet.
    #[default]
    None,
}

/// Shared watch party session persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Short uppercase token participants type to join.
    pub join_code: String,
    /// Participant that created the session.
    pub host_id: Option<Uuid>,
    /// Participant whose feed is currently being played through.
    pub current_feed_owner_id: Option<Uuid>,
    /// Video currently shown to every participant.
    pub current_video_id: Option<String>,
    /// Queue item backing the current video, when it came from the queue.
    pub current_queue_item_id: Option<Uuid>,
    /// Origin of the current video.
    pub current_source: PlaybackSource,
    /// When the current video started playing.
    pub playback_started_at: Option<SystemTime>,
    /// Fraction of eligible voters required to hand the feed over.
    pub vote_threshold: f64,
    /// Inactive sessions can no longer be joined by code.
    pub is_active: bool,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the session row was updated.
    pub updated_at: SystemTime,
}

/// Member of a session. Participants are never deleted while the session lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Stable identifier for the participant.
    pub id: Uuid,
    /// Session the participant belongs to.
    pub session_id: Uuid,
    /// Name shown to other participants.
    pub display_name: String,
    /// Exactly one participant per session is the host.
    pub is_host: bool,
    /// Connectivity flag driven by presence reconciliation.
    pub is_connected: bool,
    /// Last time presence reported this participant joining or leaving.
    pub last_seen_at: SystemTime,
    /// When the participant joined the session.
    pub created_at: SystemTime,
}

/// Candidate video inside a participant's feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItemEntity {
    /// 11 character video identifier.
    pub video_id: String,
    /// Human readable title.
    pub title: String,
    /// Thumbnail URL, when the provider returned one.
    pub thumbnail: Option<String>,
}

/// Ordered candidate list for one participant of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEntity {
    /// Session the feed belongs to.
    pub session_id: Uuid,
    /// Participant owning the feed.
    pub user_id: Uuid,
    /// Candidate videos in play order.
    pub items: Vec<FeedItemEntity>,
    /// Next unconsumed position, always within `0..=items.len()`.
    pub pointer_index: usize,
    /// Last time the pointer moved.
    pub updated_at: SystemTime,
}

impl FeedEntity {
    /// Build a fresh feed whose pointer starts at the first item.
    pub fn new(session_id: Uuid, user_id: Uuid, items: Vec<FeedItemEntity>) -> Self {
        Self {
            session_id,
            user_id,
            items,
            pointer_index: 0,
            updated_at: SystemTime::now(),
        }
    }

    /// Item the pointer currently designates, if the feed is not exhausted.
    pub fn next_item(&self) -> Option<&FeedItemEntity> {
        self.items.get(self.pointer_index)
    }

    /// Whether every item has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pointer_index >= self.items.len()
    }
}

/// Video explicitly requested by a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItemEntity {
    /// Time-ordered identifier, used as FIFO tie-break.
    pub id: Uuid,
    /// Session the item was queued in.
    pub session_id: Uuid,
    /// 11 character video identifier.
    pub video_id: String,
    /// Optional title supplied by the provider.
    pub title: Option<String>,
    /// Thumbnail derived from the video identifier.
    pub thumbnail_url: Option<String>,
    /// Participant who queued the item.
    pub added_by: Uuid,
    /// Set once the item has been dequeued; never reverts.
    pub played: bool,
    /// Arrival time defining the FIFO order.
    pub created_at: SystemTime,
}

/// Current intent of one participant regarding a feed handover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Session the vote was cast in.
    pub session_id: Uuid,
    /// Participant who voted.
    pub user_id: Uuid,
    /// `true` asks for the feed to switch owner.
    pub vote: bool,
    /// Last time the participant changed their vote.
    pub updated_at: SystemTime,
}

/// Message posted in a session chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    /// Time-ordered identifier.
    pub id: Uuid,
    /// Session the message belongs to.
    pub session_id: Uuid,
    /// Author of the message.
    pub participant_id: Uuid,
    /// Trimmed message body.
    pub message: String,
    /// Posting time defining the display order.
    pub created_at: SystemTime,
}

/// Playback fields written together when a new video starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackUpdate {
    pub video_id: String,
    pub source: PlaybackSource,
    pub queue_item_id: Option<Uuid>,
    pub started_at: SystemTime,
}

/// Partial update of a session row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub host_id: Option<Uuid>,
    pub current_feed_owner_id: Option<Uuid>,
    pub playback: Option<PlaybackUpdate>,
}

impl SessionPatch {
    /// Patch assigning the feed to `owner`.
    pub fn owner(owner: Uuid) -> Self {
        Self {
            current_feed_owner_id: Some(owner),
            ..Self::default()
        }
    }

    /// Patch recording a new video as playing.
    pub fn playback(update: PlaybackUpdate) -> Self {
        Self {
            playback: Some(update),
            ..Self::default()
        }
    }

    /// Apply the patch in place and bump `updated_at`.
    pub fn apply_to(&self, session: &mut SessionEntity, now: SystemTime) {
        if let Some(host_id) = self.host_id {
            session.host_id = Some(host_id);
        }
        if let Some(owner) = self.current_feed_owner_id {
            session.current_feed_owner_id = Some(owner);
        }
        if let Some(playback) = &self.playback {
            session.current_video_id = Some(playback.video_id.clone());
            session.current_source = playback.source;
            session.current_queue_item_id = playback.queue_item_id;
            session.playback_started_at = Some(playback.started_at);
        }
        session.updated_at = now;
    }
}

/// Row filter a session update must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCondition {
    /// Last writer wins.
    Always,
    /// Only apply while the feed owner is still the given participant.
    OwnerIs(Option<Uuid>),
}

impl UpdateCondition {
    /// Whether `session` currently satisfies the condition.
    pub fn matches(&self, session: &SessionEntity) -> bool {
        match self {
            UpdateCondition::Always => true,
            UpdateCondition::OwnerIs(owner) => session.current_feed_owner_id == *owner,
        }
    }
}
