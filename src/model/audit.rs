//! The append-only audit trail.
//!
//! Every accepted command becomes exactly one [`AuditEntry`]. Entries are
//! chained: each one carries the SHA-256 hash of its predecessor, and its own
//! hash covers its contents plus that link. Altering, dropping or reordering
//! any entry breaks the chain from that point onwards.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use rocket::serde::json::serde_json;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::ledger::{command::Command, state::Policy};
use crate::model::id::ActorId;

/// Tag recorded with every entry, naming the kind of state change.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    VoterRegistered,
    PartyAdded,
    PartyUpdated,
    PartyRemoved,
    VotingStarted,
    VotingStopped,
    VoteCast,
}

impl AuditAction {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::VoterRegistered => "VOTER_REGISTERED",
            Self::PartyAdded => "PARTY_ADDED",
            Self::PartyUpdated => "PARTY_UPDATED",
            Self::PartyRemoved => "PARTY_REMOVED",
            Self::VotingStarted => "VOTING_STARTED",
            Self::VotingStopped => "VOTING_STOPPED",
            Self::VoteCast => "VOTE_CAST",
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A SHA-256 digest, serialised as lowercase hex.
#[derive(Debug, Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct EntryHash([u8; 32]);

impl EntryHash {
    /// The link carried by the first entry of every trail.
    pub const GENESIS: EntryHash = EntryHash([0; 32]);
}

impl Display for EntryHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

impl Serialize for EntryHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntryHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        let bytes = HEXLOWER
            .decode(hex.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid hash {hex}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| de::Error::custom(format!("hash {hex} is not 32 bytes")))?;
        Ok(Self(bytes))
    }
}

/// One accepted state-changing command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub action: AuditAction,
    pub actor: ActorId,
    /// The command exactly as accepted. Replaying these reproduces the ledger.
    pub payload: Command,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: EntryHash,
    pub hash: EntryHash,
    /// The election rules, carried by the first entry only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

impl AuditEntry {
    /// Build an entry and compute its hash.
    pub fn seal(
        sequence: u64,
        actor: ActorId,
        payload: Command,
        timestamp: DateTime<Utc>,
        prev_hash: EntryHash,
    ) -> Self {
        Self::seal_with_policy(sequence, actor, payload, timestamp, prev_hash, None)
    }

    /// Build an entry recording the election rules, and compute its hash.
    pub fn seal_with_policy(
        sequence: u64,
        actor: ActorId,
        payload: Command,
        timestamp: DateTime<Utc>,
        prev_hash: EntryHash,
        policy: Option<Policy>,
    ) -> Self {
        let mut entry = Self {
            sequence,
            action: payload.action(),
            actor,
            payload,
            timestamp,
            prev_hash,
            hash: EntryHash::GENESIS,
            policy,
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Recompute the hash from the entry's contents.
    pub fn compute_hash(&self) -> EntryHash {
        let payload =
            serde_json::to_vec(&self.payload).expect("Command serialisation is infallible");
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.action.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.actor.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(&payload);
        hasher.update(self.timestamp.timestamp_millis().to_be_bytes());
        hasher.update(self.prev_hash.0);
        if let Some(policy) = &self.policy {
            hasher.update(policy_bytes(policy));
        }
        let mut digest = [0; 32];
        digest.copy_from_slice(&hasher.finalize());
        EntryHash(digest)
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::CorruptAuditTrail {
            sequence: self.sequence,
            reason: reason.into(),
        }
    }
}

fn policy_bytes(policy: &Policy) -> Vec<u8> {
    let mut bytes = vec![0u8];
    bytes.extend(policy.minimum_age.to_be_bytes());
    bytes.push(policy.allow_reopen.into());
    bytes
}

/// The in-memory copy of the audit trail. Entries are only ever appended.
///
/// The first entry records the [`Policy`] the trail is written under, so a
/// trail can always be replayed under its own rules.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    policy: Policy,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
        }
    }

    /// The rules recorded by a trail's first entry, if it has one.
    pub fn recorded_policy(entries: &[AuditEntry]) -> Option<Policy> {
        entries.first().and_then(|entry| entry.policy)
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Hash of the newest entry, or [`EntryHash::GENESIS`] if empty.
    pub fn head(&self) -> EntryHash {
        self.entries
            .last()
            .map(|entry| entry.hash)
            .unwrap_or(EntryHash::GENESIS)
    }

    pub fn next_sequence(&self) -> u64 {
        self.entries.len() as u64 + 1
    }

    /// Build the entry that would come next for the given command.
    pub fn seal_next(
        &self,
        actor: ActorId,
        payload: Command,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        let sequence = self.next_sequence();
        let policy = (sequence == 1).then_some(self.policy);
        AuditEntry::seal_with_policy(sequence, actor, payload, timestamp, self.head(), policy)
    }

    /// Check that `entry` is a valid successor of the current head.
    pub fn check_next(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        if entry.sequence != self.next_sequence() {
            return Err(entry.corrupt(format!(
                "expected sequence {}",
                self.next_sequence()
            )));
        }
        if entry.prev_hash != self.head() {
            return Err(entry.corrupt("does not link to the previous entry"));
        }
        if entry.action != entry.payload.action() {
            return Err(entry.corrupt(format!(
                "action {} does not match its payload",
                entry.action
            )));
        }
        if entry.hash != entry.compute_hash() {
            return Err(entry.corrupt("hash does not match contents"));
        }
        match entry.policy {
            Some(_) if entry.sequence != 1 => {
                Err(entry.corrupt("only the first entry may record the election rules"))
            }
            Some(policy) if policy != self.policy => Err(entry.corrupt(format!(
                "recorded rules {policy:?} differ from the rules being applied {:?}",
                self.policy
            ))),
            _ => Ok(()),
        }
    }

    pub fn append(&mut self, entry: AuditEntry) -> Result<&AuditEntry, LedgerError> {
        self.check_next(&entry)?;
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Verify a complete exported trail, without applying it.
    pub fn verify(entries: &[AuditEntry]) -> Result<Self, LedgerError> {
        let mut log = Self::new(Self::recorded_policy(entries).unwrap_or_default());
        for entry in entries {
            log.append(entry.clone())?;
        }
        Ok(log)
    }

    /// Entries with a sequence number strictly greater than `since`.
    pub fn since(&self, since: u64) -> &[AuditEntry] {
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }

    /// The newest `count` entries, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
