use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// States of the voting window.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingPhase {
    /// Voting has not been opened yet.
    #[default]
    NotStarted,
    /// Ballots are being accepted.
    Open,
    /// Voting has ended; results are final.
    Closed,
}

impl Display for VotingPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Gatekeeper for the voting window.
///
/// The lifecycle is `NotStarted -> Open -> Closed`. Whether a closed window
/// may be opened again is a policy decision; by default it may not.
#[derive(Debug, Clone)]
pub struct PhaseController {
    phase: VotingPhase,
    allow_reopen: bool,
}

impl PhaseController {
    pub fn new(allow_reopen: bool) -> Self {
        Self {
            phase: VotingPhase::NotStarted,
            allow_reopen,
        }
    }

    pub fn current(&self) -> VotingPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == VotingPhase::Open
    }

    pub fn check_open(&self) -> Result<(), LedgerError> {
        match self.phase {
            VotingPhase::NotStarted => Ok(()),
            VotingPhase::Closed if self.allow_reopen => Ok(()),
            phase => Err(LedgerError::AlreadyOpenOrClosed(phase)),
        }
    }

    pub fn open(&mut self) -> Result<VotingPhase, LedgerError> {
        self.check_open()?;
        self.phase = VotingPhase::Open;
        Ok(self.phase)
    }

    pub fn check_close(&self) -> Result<(), LedgerError> {
        match self.phase {
            VotingPhase::Open => Ok(()),
            phase => Err(LedgerError::VotingNotOpen(phase)),
        }
    }

    pub fn close(&mut self) -> Result<VotingPhase, LedgerError> {
        self.check_close()?;
        self.phase = VotingPhase::Closed;
        Ok(self.phase)
    }
}
