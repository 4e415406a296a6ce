use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    audit::EntryHash,
    id::{ActorId, PartyId},
};

/// An accepted vote: one voter, one party, one instant. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: ActorId,
    pub party_id: PartyId,
    pub cast_at: DateTime<Utc>,
    /// Caller-supplied request reference, unique across all ballots.
    pub reference: String,
}

/// What a voter gets back for an accepted ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub ballot: Ballot,
    pub party_name: String,
    /// Position of the `VOTE_CAST` entry in the audit trail.
    pub sequence: u64,
    /// Hash of that entry; the commit proof.
    pub entry_hash: EntryHash,
}

/// The set of accepted ballots, indexed by voter and by reference.
///
/// This is the ground truth for the tally: per-party counts and
/// participation must always agree with a scan of it.
#[derive(Debug, Clone, Default)]
pub struct BallotBox {
    ballots: Vec<Ballot>,
    by_voter: HashMap<ActorId, usize>,
    by_reference: HashMap<String, usize>,
}

impl BallotBox {
    /// Record a ballot. Callers must have checked that neither the voter
    /// nor the reference is already present.
    pub(crate) fn record(&mut self, ballot: Ballot) -> &Ballot {
        let index = self.ballots.len();
        self.by_voter.insert(ballot.voter_id.clone(), index);
        self.by_reference.insert(ballot.reference.clone(), index);
        self.ballots.push(ballot);
        &self.ballots[index]
    }

    pub fn by_voter(&self, voter_id: &ActorId) -> Option<&Ballot> {
        self.by_voter.get(voter_id).map(|&i| &self.ballots[i])
    }

    pub fn by_reference(&self, reference: &str) -> Option<&Ballot> {
        self.by_reference.get(reference).map(|&i| &self.ballots[i])
    }

    pub fn contains_reference(&self, reference: &str) -> bool {
        self.by_reference.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }

    /// Ballots in the order they were cast.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Ballot> {
        self.ballots.iter()
    }

    /// Count ballots per party by scanning the whole box.
    pub fn count_by_party(&self) -> BTreeMap<PartyId, u64> {
        let mut counts = BTreeMap::new();
        for ballot in &self.ballots {
            *counts.entry(ballot.party_id).or_insert(0) += 1;
        }
        counts
    }
}
