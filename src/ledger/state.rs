use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    audit::{AuditEntry, AuditLog},
    ballot::{Ballot, Receipt},
    party::{PartyRecord, PartyRegistry},
    phase::{PhaseController, VotingPhase},
    voter::{VoterRecord, VoterRegistry, DEFAULT_MINIMUM_AGE},
};

use super::command::{Command, CommandOutput};

/// Election rules that are fixed for the lifetime of a ledger.
///
/// The first audit entry records them, and replay uses the recorded ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub minimum_age: u32,
    pub allow_reopen: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            minimum_age: DEFAULT_MINIMUM_AGE,
            allow_reopen: false,
        }
    }
}

/// The registries, the voting phase and the audit trail they were derived from.
///
/// `LedgerState` is a pure state machine: [`LedgerState::validate`] decides
/// whether a command would be accepted, and [`LedgerState::apply`] applies an
/// audit entry holding an accepted command. It performs no locking or I/O;
/// see [`crate::ledger::Ledger`] for that.
#[derive(Debug, Clone)]
pub struct LedgerState {
    voters: VoterRegistry,
    parties: PartyRegistry,
    phase: PhaseController,
    audit: AuditLog,
}

/// Every record in the ledger, in a canonical order. Two ledgers holding the
/// same history produce identical snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub phase: VotingPhase,
    pub voters: Vec<VoterRecord>,
    pub parties: Vec<PartyRecord>,
    pub ballots: Vec<Ballot>,
}

impl LedgerState {
    pub fn new(policy: Policy) -> Self {
        Self {
            voters: VoterRegistry::new(policy.minimum_age),
            parties: PartyRegistry::default(),
            phase: PhaseController::new(policy.allow_reopen),
            audit: AuditLog::new(policy),
        }
    }

    /// Rebuild a ledger by applying a stored audit trail from empty state.
    ///
    /// The trail is replayed under the rules recorded by its first entry.
    /// `policy` only applies to a trail that records none, which includes an
    /// empty one.
    pub fn replay(
        policy: Policy,
        entries: impl IntoIterator<Item = AuditEntry>,
    ) -> Result<Self, LedgerError> {
        let entries: Vec<AuditEntry> = entries.into_iter().collect();
        let policy = AuditLog::recorded_policy(&entries).unwrap_or(policy);
        let mut state = Self::new(policy);
        state.apply_all(entries)?;
        Ok(state)
    }

    /// Apply stored entries following the current head, in order.
    pub fn apply_all(
        &mut self,
        entries: impl IntoIterator<Item = AuditEntry>,
    ) -> Result<(), LedgerError> {
        for entry in entries {
            let sequence = entry.sequence;
            self.apply(entry).map_err(|err| match err {
                LedgerError::CorruptAuditTrail { .. } => err,
                rejection => LedgerError::CorruptAuditTrail {
                    sequence,
                    reason: format!("stored command is not valid: {rejection}"),
                },
            })?;
        }
        Ok(())
    }

    /// Decide whether `command` would be accepted, without changing anything.
    pub fn validate(&self, command: &Command) -> Result<(), LedgerError> {
        match command {
            Command::RegisterVoter(voter) => self.voters.check_register(voter),
            Command::AddParty(party) => self.parties.check_add(party),
            Command::RemoveParty { party_id } => self.parties.check_remove(*party_id),
            Command::UpdateParty { party_id, changes } => {
                self.parties.check_update(*party_id, changes)
            }
            Command::OpenVoting => self.phase.check_open(),
            Command::CloseVoting => self.phase.check_close(),
            Command::CastVote {
                voter_id,
                party_id,
                reference,
            } => {
                if !self.phase.is_open() {
                    return Err(LedgerError::VotingNotOpen(self.phase.current()));
                }
                self.voters.check_can_vote(voter_id)?;
                self.parties.check_votable(*party_id)?;
                self.voters.check_reference(reference)
            }
        }
    }

    /// Apply an audit entry: validate its command, perform every effect and
    /// append the entry. Either all of that happens or none of it does.
    pub fn apply(&mut self, entry: AuditEntry) -> Result<CommandOutput, LedgerError> {
        self.audit.check_next(&entry)?;
        self.validate(&entry.payload)?;

        // Validated above, so none of the registry calls below can fail.
        let output = match &entry.payload {
            Command::RegisterVoter(voter) => {
                CommandOutput::Voter(self.voters.register(voter.clone())?)
            }
            Command::AddParty(party) => CommandOutput::Party(self.parties.add(party.clone())?),
            Command::RemoveParty { party_id } => {
                CommandOutput::Party(self.parties.remove(*party_id)?)
            }
            Command::UpdateParty { party_id, changes } => {
                CommandOutput::Party(self.parties.update(*party_id, changes.clone())?)
            }
            Command::OpenVoting => CommandOutput::Phase(self.phase.open()?),
            Command::CloseVoting => CommandOutput::Phase(self.phase.close()?),
            Command::CastVote {
                voter_id,
                party_id,
                reference,
            } => {
                let ballot =
                    self.voters
                        .mark_voted(voter_id, *party_id, reference, entry.timestamp)?;
                let party = self.parties.increment_vote(*party_id)?;
                CommandOutput::Vote(Receipt {
                    ballot,
                    party_name: party.name,
                    sequence: entry.sequence,
                    entry_hash: entry.hash,
                })
            }
        };

        self.audit.append(entry)?;
        Ok(output)
    }

    /// The rules this ledger runs under, as recorded in its audit trail.
    pub fn policy(&self) -> Policy {
        self.audit.policy()
    }

    pub fn voters(&self) -> &VoterRegistry {
        &self.voters
    }

    pub fn parties(&self) -> &PartyRegistry {
        &self.parties
    }

    pub fn phase(&self) -> VotingPhase {
        self.phase.current()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.current(),
            voters: self.voters.iter().cloned().collect(),
            parties: self.parties.list(true).cloned().collect(),
            ballots: self.voters.ballots().iter().cloned().collect(),
        }
    }
}
