use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::LedgerError;
use crate::model::{
    ballot::{Ballot, BallotBox},
    id::{ActorId, PartyId},
};

pub type HmacSha256 = Hmac<Sha256>;

/// Minimum voting age unless configured otherwise.
pub const DEFAULT_MINIMUM_AGE: u32 = 18;

/// Hash a national ID number so the ledger never stores it in clear.
pub fn hash_national_id(national_id: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take a key of any size");
    mac.update(national_id.trim().as_bytes());
    HEXLOWER.encode(&mac.finalize().into_bytes())
}

/// Registration details for a new voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVoter {
    pub voter_id: ActorId,
    pub display_name: String,
    pub age: u32,
    pub national_id_hash: String,
}

/// A registered voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub voter_id: ActorId,
    pub display_name: String,
    pub age: u32,
    pub national_id_hash: String,
    pub registered: bool,
    pub has_voted: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub registered: bool,
    pub has_voted: bool,
}

/// All registered voters and the ballots they have cast.
#[derive(Debug, Clone)]
pub struct VoterRegistry {
    minimum_age: u32,
    voters: BTreeMap<ActorId, VoterRecord>,
    national_ids: HashSet<String>,
    ballots: BallotBox,
}

impl VoterRegistry {
    pub fn new(minimum_age: u32) -> Self {
        Self {
            minimum_age,
            voters: BTreeMap::new(),
            national_ids: HashSet::new(),
            ballots: BallotBox::default(),
        }
    }

    pub fn check_register(&self, voter: &NewVoter) -> Result<(), LedgerError> {
        if voter.voter_id.is_blank() {
            return Err(LedgerError::InvalidVoterData(
                "voter ID must not be empty".to_string(),
            ));
        }
        if voter.display_name.trim().is_empty() {
            return Err(LedgerError::InvalidVoterData(
                "display name must not be empty".to_string(),
            ));
        }
        if voter.national_id_hash.is_empty() {
            return Err(LedgerError::InvalidVoterData(
                "national ID must not be empty".to_string(),
            ));
        }
        if self.voters.contains_key(&voter.voter_id)
            || self.national_ids.contains(&voter.national_id_hash)
        {
            return Err(LedgerError::DuplicateVoter(voter.voter_id.clone()));
        }
        if voter.age < self.minimum_age {
            return Err(LedgerError::IneligibleAge {
                age: voter.age,
                minimum: self.minimum_age,
            });
        }
        Ok(())
    }

    pub fn register(&mut self, voter: NewVoter) -> Result<VoterRecord, LedgerError> {
        self.check_register(&voter)?;
        let record = VoterRecord {
            voter_id: voter.voter_id,
            display_name: voter.display_name,
            age: voter.age,
            national_id_hash: voter.national_id_hash,
            registered: true,
            has_voted: false,
        };
        self.national_ids.insert(record.national_id_hash.clone());
        self.voters.insert(record.voter_id.clone(), record.clone());
        Ok(record)
    }

    /// Check the voter exists and has not voted yet.
    pub fn check_can_vote(&self, voter_id: &ActorId) -> Result<(), LedgerError> {
        match self.voters.get(voter_id) {
            Some(voter) if voter.has_voted => Err(LedgerError::AlreadyVoted(voter_id.clone())),
            Some(_) => Ok(()),
            None => Err(LedgerError::UnknownVoter(voter_id.clone())),
        }
    }

    pub fn check_reference(&self, reference: &str) -> Result<(), LedgerError> {
        if reference.trim().is_empty() {
            return Err(LedgerError::InvalidReference(
                "reference must not be empty".to_string(),
            ));
        }
        if self.ballots.contains_reference(reference) {
            return Err(LedgerError::InvalidReference(
                "choose a different reference".to_string(),
            ));
        }
        Ok(())
    }

    /// Flip `has_voted` and record the ballot. The matching party count
    /// increment is the caller's responsibility and must happen in the same
    /// critical section.
    pub fn mark_voted(
        &mut self,
        voter_id: &ActorId,
        party_id: PartyId,
        reference: &str,
        cast_at: DateTime<Utc>,
    ) -> Result<Ballot, LedgerError> {
        self.check_can_vote(voter_id)?;
        self.check_reference(reference)?;
        if let Some(voter) = self.voters.get_mut(voter_id) {
            voter.has_voted = true;
        }
        let ballot = self.ballots.record(Ballot {
            voter_id: voter_id.clone(),
            party_id,
            cast_at,
            reference: reference.to_string(),
        });
        Ok(ballot.clone())
    }

    pub fn status(&self, voter_id: &ActorId) -> VoterStatus {
        self.voters
            .get(voter_id)
            .map(|voter| VoterStatus {
                registered: voter.registered,
                has_voted: voter.has_voted,
            })
            .unwrap_or_default()
    }

    pub fn get(&self, voter_id: &ActorId) -> Option<&VoterRecord> {
        self.voters.get(voter_id)
    }

    /// Voters ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = &VoterRecord> {
        self.voters.values()
    }

    pub fn registered_count(&self) -> usize {
        self.voters.values().filter(|voter| voter.registered).count()
    }

    pub fn ballots(&self) -> &BallotBox {
        &self.ballots
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_voter() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        let record = registry.register(NewVoter::example("v1", "1234567890")).unwrap();
        assert!(record.registered);
        assert!(!record.has_voted);
        assert_eq!(
            registry.status(&"v1".into()),
            VoterStatus {
                registered: true,
                has_voted: false
            }
        );
        assert_eq!(registry.status(&"nobody".into()), VoterStatus::default());
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn duplicate_voter_id_or_national_id() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        registry.register(NewVoter::example("v1", "111")).unwrap();

        let same_id = NewVoter::example("v1", "222");
        assert_eq!(
            registry.register(same_id),
            Err(LedgerError::DuplicateVoter("v1".into()))
        );

        let same_national_id = NewVoter::example("v2", " 111 ");
        assert_eq!(
            registry.register(same_national_id),
            Err(LedgerError::DuplicateVoter("v2".into()))
        );
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn minimum_age() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        let mut young = NewVoter::example("v1", "111");
        young.age = 17;
        assert_eq!(
            registry.register(young.clone()),
            Err(LedgerError::IneligibleAge {
                age: 17,
                minimum: 18
            })
        );
        young.age = 18;
        assert!(registry.register(young).is_ok());
    }

    #[test]
    fn blank_fields_rejected() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        let mut voter = NewVoter::example(" ", "111");
        assert!(matches!(
            registry.register(voter.clone()),
            Err(LedgerError::InvalidVoterData(_))
        ));
        voter.voter_id = "v1".into();
        voter.display_name = String::new();
        assert!(matches!(
            registry.register(voter),
            Err(LedgerError::InvalidVoterData(_))
        ));
    }

    #[test]
    fn vote_once() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        registry.register(NewVoter::example("v1", "111")).unwrap();
        let voter: ActorId = "v1".into();

        let ballot = registry
            .mark_voted(&voter, PartyId(1), "ref-1", Utc::now())
            .unwrap();
        assert_eq!(ballot.party_id, PartyId(1));
        assert!(registry.status(&voter).has_voted);
        assert_eq!(registry.ballots().by_reference("ref-1"), Some(&ballot));

        assert_eq!(
            registry.mark_voted(&voter, PartyId(2), "ref-2", Utc::now()),
            Err(LedgerError::AlreadyVoted(voter.clone()))
        );
        assert_eq!(
            registry.mark_voted(&"v9".into(), PartyId(1), "ref-3", Utc::now()),
            Err(LedgerError::UnknownVoter("v9".into()))
        );
        assert_eq!(registry.ballots().len(), 1);
    }

    #[test]
    fn references_are_unique() {
        let mut registry = VoterRegistry::new(DEFAULT_MINIMUM_AGE);
        registry.register(NewVoter::example("v1", "111")).unwrap();
        registry.register(NewVoter::example("v2", "222")).unwrap();
        registry
            .mark_voted(&"v1".into(), PartyId(1), "shared", Utc::now())
            .unwrap();
        let err = registry
            .mark_voted(&"v2".into(), PartyId(1), "shared", Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidReference("choose a different reference".to_string())
        );
        // Nothing in the rejection singles out the reference as taken.
        assert!(!err.to_string().contains("shared"));
        assert!(!registry.status(&"v2".into()).has_voted);
    }

    #[test]
    fn national_id_hash_is_keyed() {
        let a = hash_national_id("1234567890", b"one");
        let b = hash_national_id("1234567890", b"two");
        assert_ne!(a, b);
        assert_eq!(a, hash_national_id(" 1234567890\n", b"one"));
        assert_eq!(a.len(), 64);
    }
}
