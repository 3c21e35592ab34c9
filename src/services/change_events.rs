use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{
        ChatMessageEntity, FeedEntity, ParticipantEntity, QueueItemEntity, SessionEntity,
        VoteEntity,
    },
    dto::{
        chat::ChatMessageSummary,
        queue::QueueItemSummary,
        session::{FeedSummary, ParticipantSummary, SessionSummary},
        sse::{
            ChangeEvent, ChangeOperation, PresenceChange, PresenceSync, QueueItemRemoved,
            ServerEvent, SystemStatus, VotesCleared,
        },
        vote::VoteSummary,
    },
    state::SharedState,
};

const TABLE_SESSIONS: &str = "sessions";
const TABLE_PARTICIPANTS: &str = "participants";
const TABLE_FEEDS: &str = "feeds";
const TABLE_QUEUE_ITEMS: &str = "queue_items";
const TABLE_VOTES: &str = "votes";
const TABLE_CHAT_MESSAGES: &str = "chat_messages";
const EVENT_PRESENCE_JOIN: &str = "presence.join";
const EVENT_PRESENCE_LEAVE: &str = "presence.leave";
const EVENT_PRESENCE_SYNC: &str = "presence.sync";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a new session row.
pub fn session_inserted(state: &SharedState, session: &SessionEntity) {
    let row = SessionSummary::from(session.clone());
    send_change(state, session.id, TABLE_SESSIONS, ChangeOperation::Insert, &row);
}

/// Broadcast an updated session row (owner or playback change).
pub fn session_updated(state: &SharedState, session: &SessionEntity) {
    let row = SessionSummary::from(session.clone());
    send_change(state, session.id, TABLE_SESSIONS, ChangeOperation::Update, &row);
}

pub fn participant_inserted(state: &SharedState, participant: &ParticipantEntity) {
    let row = ParticipantSummary::from(participant.clone());
    send_change(
        state,
        participant.session_id,
        TABLE_PARTICIPANTS,
        ChangeOperation::Insert,
        &row,
    );
}

pub fn participant_updated(state: &SharedState, participant: &ParticipantEntity) {
    let row = ParticipantSummary::from(participant.clone());
    send_change(
        state,
        participant.session_id,
        TABLE_PARTICIPANTS,
        ChangeOperation::Update,
        &row,
    );
}

/// Feed events carry the position only, never the candidate list.
pub fn feed_inserted(state: &SharedState, feed: &FeedEntity) {
    send_change(
        state,
        feed.session_id,
        TABLE_FEEDS,
        ChangeOperation::Insert,
        &FeedSummary::from(feed),
    );
}

pub fn feed_updated(state: &SharedState, feed: &FeedEntity) {
    send_change(
        state,
        feed.session_id,
        TABLE_FEEDS,
        ChangeOperation::Update,
        &FeedSummary::from(feed),
    );
}

pub fn queue_item_inserted(state: &SharedState, item: &QueueItemEntity) {
    let row = QueueItemSummary::from(item.clone());
    send_change(
        state,
        item.session_id,
        TABLE_QUEUE_ITEMS,
        ChangeOperation::Insert,
        &row,
    );
}

pub fn queue_item_updated(state: &SharedState, item: &QueueItemEntity) {
    let row = QueueItemSummary::from(item.clone());
    send_change(
        state,
        item.session_id,
        TABLE_QUEUE_ITEMS,
        ChangeOperation::Update,
        &row,
    );
}

pub fn queue_item_deleted(state: &SharedState, session_id: Uuid, item_id: Uuid) {
    let row = QueueItemRemoved {
        id: item_id,
        session_id,
    };
    send_change(
        state,
        session_id,
        TABLE_QUEUE_ITEMS,
        ChangeOperation::Delete,
        &row,
    );
}

pub fn vote_upserted(state: &SharedState, vote: &VoteEntity) {
    let row = VoteSummary::from(vote.clone());
    send_change(state, vote.session_id, TABLE_VOTES, ChangeOperation::Upsert, &row);
}

/// Broadcast that every vote of the session was cleared.
pub fn votes_deleted(state: &SharedState, session_id: Uuid, deleted: u64) {
    let row = VotesCleared {
        session_id,
        deleted,
    };
    send_change(state, session_id, TABLE_VOTES, ChangeOperation::Delete, &row);
}

pub fn chat_message_inserted(state: &SharedState, message: &ChatMessageEntity) {
    let row = ChatMessageSummary::from(message.clone());
    send_change(
        state,
        message.session_id,
        TABLE_CHAT_MESSAGES,
        ChangeOperation::Insert,
        &row,
    );
}

pub fn presence_joined(state: &SharedState, session_id: Uuid, participant_id: Uuid) {
    send_event(
        state,
        session_id,
        EVENT_PRESENCE_JOIN,
        &PresenceChange { participant_id },
    );
}

pub fn presence_left(state: &SharedState, session_id: Uuid, participant_id: Uuid) {
    send_event(
        state,
        session_id,
        EVENT_PRESENCE_LEAVE,
        &PresenceChange { participant_id },
    );
}

pub fn presence_synced(state: &SharedState, session_id: Uuid, present: &[Uuid]) {
    send_event(
        state,
        session_id,
        EVENT_PRESENCE_SYNC,
        &PresenceSync {
            present: present.to_vec(),
        },
    );
}

/// Tell every open stream that the backend entered or left degraded mode.
pub fn system_status(state: &SharedState, degraded: bool) {
    match ServerEvent::json(
        Some(EVENT_SYSTEM_STATUS.to_string()),
        &SystemStatus { degraded },
    ) {
        Ok(event) => state.changes().publish_all(event),
        Err(err) => warn!(error = %err, "failed to serialize system status event"),
    }
}

fn send_change<T: Serialize>(
    state: &SharedState,
    session_id: Uuid,
    table: &'static str,
    operation: ChangeOperation,
    row: &T,
) {
    let name = format!("{table}.{}", operation.as_str());
    let payload = ChangeEvent {
        table,
        operation,
        row,
    };
    send_event(state, session_id, &name, &payload);
}

fn send_event<T: Serialize>(state: &SharedState, session_id: Uuid, name: &str, payload: &T) {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => state.changes().publish(session_id, event),
        Err(err) => warn!(event = name, error = %err, "failed to serialize change event"),
    }
}
