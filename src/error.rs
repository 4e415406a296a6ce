use std::fmt::Display;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::{id::ActorId, id::PartyId, phase::VotingPhase};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way a ledger command can be refused.
///
/// All kinds except [`LedgerError::StorageFailure`] and
/// [`LedgerError::CorruptAuditTrail`] are pure: the command was rejected
/// before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Voter {0} is already registered")]
    DuplicateVoter(ActorId),
    #[error("Voter is {age} years old, the minimum voting age is {minimum}")]
    IneligibleAge { age: u32, minimum: u32 },
    #[error("Invalid voter data: {0}")]
    InvalidVoterData(String),
    #[error("Voter {0} is not registered")]
    UnknownVoter(ActorId),
    #[error("Voter {0} has already voted")]
    AlreadyVoted(ActorId),
    #[error("Party {0} does not exist")]
    UnknownParty(PartyId),
    #[error("Party {0} has been removed and cannot receive votes")]
    InactiveParty(PartyId),
    #[error("Party {0} has already been removed")]
    AlreadyRemoved(PartyId),
    #[error("Invalid party data: {0}")]
    InvalidPartyData(String),
    #[error("Invalid ballot reference: {0}")]
    InvalidReference(String),
    #[error("Voting is not open (phase is {0})")]
    VotingNotOpen(VotingPhase),
    #[error("Voting cannot be opened (phase is {0})")]
    AlreadyOpenOrClosed(VotingPhase),
    #[error("{0} is not permitted to perform this action")]
    Unauthorized(ActorId),
    #[error("Audit store failure: {0}")]
    StorageFailure(String),
    #[error("Audit trail is corrupt at entry {sequence}: {reason}")]
    CorruptAuditTrail { sequence: u64, reason: String },
}

impl LedgerError {
    /// Was this a rejection on the grounds of the command and current state,
    /// as opposed to a failure of the machinery?
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::StorageFailure(_) | Self::CorruptAuditTrail { .. }
        )
    }

    fn status(&self) -> Status {
        match self {
            Self::UnknownVoter(_) | Self::UnknownParty(_) => Status::NotFound,
            Self::DuplicateVoter(_)
            | Self::AlreadyVoted(_)
            | Self::AlreadyRemoved(_)
            | Self::InactiveParty(_)
            | Self::VotingNotOpen(_)
            | Self::AlreadyOpenOrClosed(_) => Status::Conflict,
            Self::IneligibleAge { .. }
            | Self::InvalidVoterData(_)
            | Self::InvalidPartyData(_)
            | Self::InvalidReference(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Forbidden,
            Self::StorageFailure(_) | Self::CorruptAuditTrail { .. } => {
                Status::InternalServerError
            }
        }
    }
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Ledger(err) => err.status(),
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        Err(status)
    }
}
