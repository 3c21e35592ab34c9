//! Feed ownership coordination: vote driven handovers and owner failover.
//!
//! Decisions come from [`crate::state::ownership::decide`]; this module gathers the
//! snapshot it needs and applies the outcome with an owner compare-and-set, so two
//! concurrent transitions can never both rewrite the owner.

use std::{sync::Arc, time::SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{SessionEntity, SessionPatch, UpdateCondition, VoteEntity},
        session_store::SessionStore,
    },
    error::ServiceError,
    services::{
        change_events,
        feed_service::{self, FeedSeed},
        session_service::{load_session, require_participant},
    },
    state::{
        SharedState,
        ownership::{
            self, Handover, HandoverReason, KeepReason, OwnershipDecision, OwnershipEvent,
            OwnershipSnapshot, VoteTally,
        },
    },
};

/// What happened to the vote rows after a handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteReset {
    /// Failover keeps votes untouched.
    NotRequested,
    Cleared(u64),
    /// The owner changed but the votes survived; the next vote recomputes the tally.
    Failed,
}

/// Owner change written by this coordinator.
#[derive(Debug, Clone)]
pub struct HandoverOutcome {
    pub session: SessionEntity,
    pub previous_owner: Option<Uuid>,
    pub new_owner: Uuid,
    pub reason: HandoverReason,
    pub votes: VoteReset,
    /// Whether the new owner's feed had to be created.
    pub feed_created: bool,
}

#[derive(Debug, Clone)]
pub enum VoteOutcome {
    Recorded(VoteTally),
    Reassigned(HandoverOutcome),
    /// The owner changed between the snapshot and the write.
    Superseded,
}

#[derive(Debug, Clone)]
pub enum FailoverOutcome {
    Kept(KeepReason),
    Reassigned(HandoverOutcome),
    Superseded,
}

/// Upsert the caller's vote and reassign the feed when the threshold is reached.
pub async fn cast_vote(
    state: &SharedState,
    session_id: Uuid,
    voter: Uuid,
    vote: bool,
) -> Result<VoteOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    require_participant(&store, session_id, voter).await?;
    if session.current_feed_owner_id == Some(voter) {
        return Err(ServiceError::InvalidInput(
            "the feed owner cannot vote on their own feed".into(),
        ));
    }

    let row = VoteEntity {
        session_id,
        user_id: voter,
        vote,
        updated_at: SystemTime::now(),
    };
    store.upsert_vote(row.clone()).await?;
    change_events::vote_upserted(state, &row);

    let snapshot = snapshot(&store, &session).await?;
    let event = OwnershipEvent::VoteCast { voter, vote };
    let decision = state
        .use_rng(|rng| ownership::decide(&snapshot, &event, rng))
        .await;

    match decision {
        OwnershipDecision::Keep(_) => Ok(VoteOutcome::Recorded(ownership::tally(&snapshot))),
        OwnershipDecision::Handover(handover) => {
            match apply_handover(state, &store, session_id, handover).await? {
                Some(outcome) => Ok(VoteOutcome::Reassigned(outcome)),
                None => Ok(VoteOutcome::Superseded),
            }
        }
    }
}

/// Hand the feed to another connected participant when `departed` owned it.
pub async fn fail_over(
    state: &SharedState,
    session_id: Uuid,
    departed: Uuid,
) -> Result<FailoverOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(&store, session_id).await?;
    let snapshot = snapshot(&store, &session).await?;
    let event = OwnershipEvent::ParticipantLeft {
        participant: departed,
    };
    let decision = state
        .use_rng(|rng| ownership::decide(&snapshot, &event, rng))
        .await;

    match decision {
        OwnershipDecision::Keep(reason) => {
            if reason == KeepReason::NoCandidates {
                info!(
                    session_id = %session_id,
                    owner_id = %departed,
                    "feed owner left and nobody else is connected; keeping owner"
                );
            }
            Ok(FailoverOutcome::Kept(reason))
        }
        OwnershipDecision::Handover(handover) => {
            match apply_handover(state, &store, session_id, handover).await? {
                Some(outcome) => Ok(FailoverOutcome::Reassigned(outcome)),
                None => Ok(FailoverOutcome::Superseded),
            }
        }
    }
}

async fn snapshot(
    store: &Arc<dyn SessionStore>,
    session: &SessionEntity,
) -> Result<OwnershipSnapshot, ServiceError> {
    let participants = store.list_participants(session.id).await?;
    let votes = store.list_votes(session.id).await?;
    let owner = session.current_feed_owner_id;

    let connected: Vec<Uuid> = participants
        .iter()
        .filter(|participant| participant.is_connected)
        .map(|participant| participant.id)
        .collect();
    // The owner's row, left over from before they took the feed, never counts.
    let yes_votes = votes
        .iter()
        .filter(|row| row.vote && Some(row.user_id) != owner)
        .count();

    Ok(OwnershipSnapshot {
        owner,
        connected,
        yes_votes,
        vote_threshold: session.vote_threshold,
    })
}

/// Write the owner change, reset votes when asked to and make sure the new owner has a feed.
///
/// Returns `None` when the owner no longer matches `handover.from`.
async fn apply_handover(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    handover: Handover,
) -> Result<Option<HandoverOutcome>, ServiceError> {
    let Some(session) = store
        .update_session(
            session_id,
            SessionPatch::owner(handover.to),
            UpdateCondition::OwnerIs(handover.from),
        )
        .await?
    else {
        info!(
            session_id = %session_id,
            expected_owner = ?handover.from,
            "feed owner changed concurrently; dropping handover"
        );
        return Ok(None);
    };
    change_events::session_updated(state, &session);

    let votes = if handover.reset_votes {
        match store.delete_votes(session_id).await {
            Ok(deleted) => {
                change_events::votes_deleted(state, session_id, deleted);
                VoteReset::Cleared(deleted)
            }
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    new_owner = %handover.to,
                    error = %err,
                    "feed owner changed but votes could not be cleared"
                );
                VoteReset::Failed
            }
        }
    } else {
        VoteReset::NotRequested
    };

    let feed_created =
        match feed_service::ensure_feed(state, store, session_id, handover.to, FeedSeed::Provider)
            .await
        {
            Ok(ensured) => ensured.created,
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    new_owner = %handover.to,
                    error = %err,
                    "failed to prepare feed for new owner"
                );
                false
            }
        };

    info!(
        session_id = %session_id,
        from = ?handover.from,
        to = %handover.to,
        reason = ?handover.reason,
        "feed ownership transferred"
    );

    Ok(Some(HandoverOutcome {
        session,
        previous_owner: handover.from,
        new_owner: handover.to,
        reason: handover.reason,
        votes,
        feed_created,
    }))
}
