use serde::{Deserialize, Serialize};

use crate::model::{
    audit::AuditAction,
    ballot::Receipt,
    id::{ActorId, PartyId},
    party::{NewParty, PartyRecord, PartyUpdate},
    phase::VotingPhase,
    voter::{NewVoter, VoterRecord},
};

/// A state-changing request against the ledger.
///
/// Accepted commands are stored verbatim as audit entry payloads, so the
/// serialised form is part of the durable format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    RegisterVoter(NewVoter),
    AddParty(NewParty),
    RemoveParty {
        party_id: PartyId,
    },
    UpdateParty {
        party_id: PartyId,
        changes: PartyUpdate,
    },
    OpenVoting,
    CloseVoting,
    CastVote {
        voter_id: ActorId,
        party_id: PartyId,
        reference: String,
    },
}

impl Command {
    pub fn action(&self) -> AuditAction {
        match self {
            Self::RegisterVoter(_) => AuditAction::VoterRegistered,
            Self::AddParty(_) => AuditAction::PartyAdded,
            Self::RemoveParty { .. } => AuditAction::PartyRemoved,
            Self::UpdateParty { .. } => AuditAction::PartyUpdated,
            Self::OpenVoting => AuditAction::VotingStarted,
            Self::CloseVoting => AuditAction::VotingStopped,
            Self::CastVote { .. } => AuditAction::VoteCast,
        }
    }

    /// Everything except casting a ballot is reserved for the administrator.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, Self::CastVote { .. })
    }
}

/// The result of an accepted command.
///
/// Serialises as the bare inner value, which is what the HTTP layer returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Voter(VoterRecord),
    Party(PartyRecord),
    Phase(VotingPhase),
    Vote(Receipt),
}
