use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::id::PartyId;

/// Details of a party to be added to the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub logo_ref: String,
}

/// Changes to a party's display metadata. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_ref: Option<String>,
}

impl PartyUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.logo_ref.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRecord {
    pub party_id: PartyId,
    pub name: String,
    pub description: String,
    pub logo_ref: String,
    pub vote_count: u64,
    /// False once removed; removed parties keep their record and count.
    pub active: bool,
}

/// All parties ever added, keyed by their sequential ID.
#[derive(Debug, Clone, Default)]
pub struct PartyRegistry {
    parties: BTreeMap<PartyId, PartyRecord>,
    last_id: PartyId,
}

impl PartyRegistry {
    pub fn check_add(&self, party: &NewParty) -> Result<(), LedgerError> {
        if party.name.trim().is_empty() {
            return Err(LedgerError::InvalidPartyData(
                "party name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn add(&mut self, party: NewParty) -> Result<PartyRecord, LedgerError> {
        self.check_add(&party)?;
        let party_id = self.last_id.next();
        let record = PartyRecord {
            party_id,
            name: party.name,
            description: party.description,
            logo_ref: party.logo_ref,
            vote_count: 0,
            active: true,
        };
        self.parties.insert(party_id, record.clone());
        self.last_id = party_id;
        Ok(record)
    }

    pub fn check_remove(&self, party_id: PartyId) -> Result<(), LedgerError> {
        match self.parties.get(&party_id) {
            Some(party) if !party.active => Err(LedgerError::AlreadyRemoved(party_id)),
            Some(_) => Ok(()),
            None => Err(LedgerError::UnknownParty(party_id)),
        }
    }

    /// Deactivate a party. Its vote count is frozen, not reset.
    pub fn remove(&mut self, party_id: PartyId) -> Result<PartyRecord, LedgerError> {
        self.check_remove(party_id)?;
        let party = self.get_mut(party_id)?;
        party.active = false;
        Ok(party.clone())
    }

    pub fn check_update(&self, party_id: PartyId, update: &PartyUpdate) -> Result<(), LedgerError> {
        self.get(party_id)?;
        if update.is_empty() {
            return Err(LedgerError::InvalidPartyData(
                "update does not change any field".to_string(),
            ));
        }
        if matches!(&update.name, Some(name) if name.trim().is_empty()) {
            return Err(LedgerError::InvalidPartyData(
                "party name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Change display metadata. Never touches the vote count.
    pub fn update(
        &mut self,
        party_id: PartyId,
        update: PartyUpdate,
    ) -> Result<PartyRecord, LedgerError> {
        self.check_update(party_id, &update)?;
        let party = self.get_mut(party_id)?;
        if let Some(name) = update.name {
            party.name = name;
        }
        if let Some(description) = update.description {
            party.description = description;
        }
        if let Some(logo_ref) = update.logo_ref {
            party.logo_ref = logo_ref;
        }
        Ok(party.clone())
    }

    pub fn check_votable(&self, party_id: PartyId) -> Result<(), LedgerError> {
        match self.parties.get(&party_id) {
            Some(party) if !party.active => Err(LedgerError::InactiveParty(party_id)),
            Some(_) => Ok(()),
            None => Err(LedgerError::UnknownParty(party_id)),
        }
    }

    pub fn increment_vote(&mut self, party_id: PartyId) -> Result<PartyRecord, LedgerError> {
        self.check_votable(party_id)?;
        let party = self.get_mut(party_id)?;
        party.vote_count += 1;
        Ok(party.clone())
    }

    pub fn get(&self, party_id: PartyId) -> Result<&PartyRecord, LedgerError> {
        self.parties
            .get(&party_id)
            .ok_or(LedgerError::UnknownParty(party_id))
    }

    fn get_mut(&mut self, party_id: PartyId) -> Result<&mut PartyRecord, LedgerError> {
        self.parties
            .get_mut(&party_id)
            .ok_or(LedgerError::UnknownParty(party_id))
    }

    /// Parties ordered by ID.
    pub fn list(&self, include_inactive: bool) -> impl Iterator<Item = &PartyRecord> {
        self.parties
            .values()
            .filter(move |party| include_inactive || party.active)
    }

    pub fn total_votes(&self) -> u64 {
        self.parties.values().map(|party| party.vote_count).sum()
    }
}
