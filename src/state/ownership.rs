//! Pure feed ownership decisions.
//!
//! The coordinator gathers a [`OwnershipSnapshot`] from storage, asks [`decide`] what to do
//! for an incoming [`OwnershipEvent`] and then applies the resulting [`Handover`] itself.
//! Keeping the decision free of I/O lets it be driven by a seeded random source in tests.

use rand::{Rng, seq::IndexedRandom};
use uuid::Uuid;

/// Roster view the decision is taken on.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipSnapshot {
    /// Current feed owner, if any.
    pub owner: Option<Uuid>,
    /// Connected participants in roster order.
    pub connected: Vec<Uuid>,
    /// Number of participants other than the owner currently voting yes.
    pub yes_votes: usize,
    /// Fraction of eligible voters required to hand the feed over.
    pub vote_threshold: f64,
}

/// Trigger submitted to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipEvent {
    /// A participant upserted their vote.
    VoteCast { voter: Uuid, vote: bool },
    /// Presence reported a participant as gone.
    ParticipantLeft { participant: Uuid },
}

/// Yes votes against the number of participants allowed to vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub yes: usize,
    pub eligible: usize,
}

impl VoteTally {
    /// Whether the tally reaches `threshold`. An empty electorate never does.
    pub fn reaches(&self, threshold: f64) -> bool {
        self.eligible > 0 && self.yes as f64 / self.eligible as f64 >= threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverReason {
    VoteThreshold,
    Failover,
}

/// Ownership change the coordinator should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handover {
    pub from: Option<Uuid>,
    pub to: Uuid,
    pub reason: HandoverReason,
    /// Vote rows must be cleared once the new owner is written.
    pub reset_votes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// "No" votes never trigger a handover.
    NoVote,
    /// Nobody besides the owner is connected.
    NoEligibleVoters,
    BelowThreshold(VoteTally),
    /// The participant who left was not the owner.
    NotOwner,
    /// The owner left and nobody else is connected.
    NoCandidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipDecision {
    Keep(KeepReason),
    Handover(Handover),
}

/// Tally the snapshot: every connected participant except the owner is eligible.
pub fn tally(snapshot: &OwnershipSnapshot) -> VoteTally {
    VoteTally {
        yes: snapshot.yes_votes,
        eligible: candidates(snapshot, snapshot.owner).len(),
    }
}

fn candidates(snapshot: &OwnershipSnapshot, excluded: Option<Uuid>) -> Vec<Uuid> {
    snapshot
        .connected
        .iter()
        .copied()
        .filter(|id| Some(*id) != excluded)
        .collect()
}

/// Decide whether `event` moves the feed to somebody else.
pub fn decide<R>(
    snapshot: &OwnershipSnapshot,
    event: &OwnershipEvent,
    rng: &mut R,
) -> OwnershipDecision
where
    R: Rng + ?Sized,
{
    match *event {
        OwnershipEvent::VoteCast { vote: false, .. } => OwnershipDecision::Keep(KeepReason::NoVote),
        OwnershipEvent::VoteCast { vote: true, .. } => {
            let eligible = candidates(snapshot, snapshot.owner);
            let tally = VoteTally {
                yes: snapshot.yes_votes,
                eligible: eligible.len(),
            };
            if tally.eligible == 0 {
                return OwnershipDecision::Keep(KeepReason::NoEligibleVoters);
            }
            if !tally.reaches(snapshot.vote_threshold) {
                return OwnershipDecision::Keep(KeepReason::BelowThreshold(tally));
            }
            match eligible.choose(rng) {
                Some(next) => OwnershipDecision::Handover(Handover {
                    from: snapshot.owner,
                    to: *next,
                    reason: HandoverReason::VoteThreshold,
                    reset_votes: true,
                }),
                None => OwnershipDecision::Keep(KeepReason::NoEligibleVoters),
            }
        }
        OwnershipEvent::ParticipantLeft { participant } => {
            if snapshot.owner != Some(participant) {
                return OwnershipDecision::Keep(KeepReason::NotOwner);
            }
            match candidates(snapshot, Some(participant)).choose(rng) {
                Some(next) => OwnershipDecision::Handover(Handover {
                    from: Some(participant),
                    to: *next,
                    reason: HandoverReason::Failover,
                    reset_votes: false,
                }),
                None => OwnershipDecision::Keep(KeepReason::NoCandidates),
            }
        }
    }
}
