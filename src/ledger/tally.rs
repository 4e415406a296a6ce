//! Read-only projections of the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    audit::{AuditAction, AuditEntry},
    ballot::{Ballot, Receipt},
    id::{ActorId, PartyId},
    phase::VotingPhase,
    voter::VoterStatus,
};

use super::command::Command;
use super::state::LedgerState;

/// Ballots shown on the dashboard.
pub const RECENT_VOTES: usize = 5;
/// Audit entries shown on the dashboard.
pub const RECENT_ACTIVITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyTally {
    pub party_id: PartyId,
    pub name: String,
    pub vote_count: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub registered_count: u64,
    pub total_votes: u64,
    /// Percentage of registered voters who have voted; 0 when nobody is registered.
    pub rate: f64,
}

impl Participation {
    pub fn new(registered_count: u64, total_votes: u64) -> Self {
        let rate = if registered_count == 0 {
            0.0
        } else {
            total_votes as f64 / registered_count as f64 * 100.0
        };
        Self {
            registered_count,
            total_votes,
            rate,
        }
    }
}

/// A party whose maintained count disagrees with the ballot box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub party_id: PartyId,
    pub recorded: u64,
    pub counted: u64,
}

/// Result of recounting every ballot and comparing with the maintained totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub ballots: u64,
    pub recorded_total: u64,
    pub voters_marked: u64,
    pub mismatches: Vec<CountMismatch>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
            && self.ballots == self.recorded_total
            && self.ballots == self.voters_marked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentVote {
    pub voter_id: ActorId,
    pub voter_name: String,
    pub party_id: PartyId,
    pub party_name: String,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub sequence: u64,
    pub action: AuditAction,
    pub actor: ActorId,
    pub timestamp: DateTime<Utc>,
}

impl From<&AuditEntry> for ActivityItem {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            sequence: entry.sequence,
            action: entry.action,
            actor: entry.actor.clone(),
            timestamp: entry.timestamp,
        }
    }
}

/// Administrator overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub phase: VotingPhase,
    pub participation: Participation,
    pub party_count: u64,
    pub recent_votes: Vec<RecentVote>,
    pub recent_activity: Vec<ActivityItem>,
}

/// A voter's standing, with their receipt once they have voted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterReport {
    #[serde(flatten)]
    pub status: VoterStatus,
    pub vote: Option<Receipt>,
}

impl LedgerState {
    /// Every party ever added, removed ones included, ordered by ID.
    pub fn results(&self) -> Vec<PartyTally> {
        self.parties()
            .list(true)
            .map(|party| PartyTally {
                party_id: party.party_id,
                name: party.name.clone(),
                vote_count: party.vote_count,
                active: party.active,
            })
            .collect()
    }

    pub fn participation(&self) -> Participation {
        Participation::new(
            self.voters().registered_count() as u64,
            self.voters().ballots().len() as u64,
        )
    }

    pub fn reconcile(&self) -> Reconciliation {
        let counted = self.voters().ballots().count_by_party();
        let mut mismatches: Vec<CountMismatch> = self
            .parties()
            .list(true)
            .filter_map(|party| {
                let actual = counted.get(&party.party_id).copied().unwrap_or(0);
                (actual != party.vote_count).then_some(CountMismatch {
                    party_id: party.party_id,
                    recorded: party.vote_count,
                    counted: actual,
                })
            })
            .collect();
        // Ballots for parties the registry has never heard of.
        mismatches.extend(
            counted
                .iter()
                .filter(|(party_id, _)| self.parties().get(**party_id).is_err())
                .map(|(&party_id, &count)| CountMismatch {
                    party_id,
                    recorded: 0,
                    counted: count,
                }),
        );

        Reconciliation {
            ballots: self.voters().ballots().len() as u64,
            recorded_total: self.parties().total_votes(),
            voters_marked: self.voters().iter().filter(|v| v.has_voted).count() as u64,
            mismatches,
        }
    }

    pub fn dashboard(&self) -> Dashboard {
        let recent_votes = self
            .voters()
            .ballots()
            .iter()
            .rev()
            .take(RECENT_VOTES)
            .map(|ballot| self.recent_vote(ballot))
            .collect();
        let recent_activity = self
            .audit()
            .recent(RECENT_ACTIVITY)
            .map(ActivityItem::from)
            .collect();

        Dashboard {
            phase: self.phase(),
            participation: self.participation(),
            party_count: self.parties().list(false).count() as u64,
            recent_votes,
            recent_activity,
        }
    }

    fn recent_vote(&self, ballot: &Ballot) -> RecentVote {
        RecentVote {
            voter_id: ballot.voter_id.clone(),
            voter_name: self
                .voters()
                .get(&ballot.voter_id)
                .map(|voter| voter.display_name.clone())
                .unwrap_or_default(),
            party_id: ballot.party_id,
            party_name: self.party_name(ballot.party_id),
            cast_at: ballot.cast_at,
        }
    }

    fn party_name(&self, party_id: PartyId) -> String {
        self.parties()
            .get(party_id)
            .map(|party| party.name.clone())
            .unwrap_or_default()
    }

    /// Rebuild the receipt for a recorded ballot from its audit entry.
    pub fn receipt(&self, ballot: &Ballot) -> Option<Receipt> {
        let entry = self.audit().since(0).iter().rev().find(|entry| match &entry.payload {
            Command::CastVote { reference, .. } => *reference == ballot.reference,
            _ => false,
        })?;
        Some(Receipt {
            ballot: ballot.clone(),
            party_name: self.party_name(ballot.party_id),
            sequence: entry.sequence,
            entry_hash: entry.hash,
        })
    }

    pub fn voter_report(&self, voter_id: &ActorId) -> VoterReport {
        VoterReport {
            status: self.voters().status(voter_id),
            vote: self
                .voters()
                .ballots()
                .by_voter(voter_id)
                .and_then(|ballot| self.receipt(ballot)),
        }
    }
}
