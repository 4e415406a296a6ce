use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SubsecRound, Utc};
use rocket::tokio::sync::RwLock;

use crate::error::LedgerError;
use crate::model::{
    audit::{AuditEntry, EntryHash},
    ballot::Receipt,
    id::{ActorId, PartyId},
    party::PartyRecord,
    phase::VotingPhase,
    voter::{VoterRecord, VoterStatus},
};

use super::{
    authority::Authorizer,
    command::{Command, CommandOutput},
    state::{LedgerState, Policy, Snapshot},
    store::AuditStore,
    tally::{Dashboard, Participation, PartyTally, Reconciliation, VoterReport},
};

/// The ballot ledger: the single authority over voters, parties, the voting
/// window and the ballots cast in it.
///
/// Commands are applied one at a time under a writer lock held across
/// validation, the durable append and the in-memory apply, so every query
/// sees the state either entirely before or entirely after any command.
///
/// A failed append may still have reached the store. After one, the stored
/// trail is read back and any entries beyond the in-memory head are applied
/// before another command is accepted.
pub struct Ledger {
    state: RwLock<LedgerState>,
    store: Box<dyn AuditStore>,
    authorizer: Box<dyn Authorizer>,
    /// Set while the store may hold entries that memory does not.
    unconfirmed: AtomicBool,
}

impl Ledger {
    /// Open a ledger by replaying everything in `store`.
    pub async fn open(
        policy: Policy,
        store: Box<dyn AuditStore>,
        authorizer: Box<dyn Authorizer>,
    ) -> Result<Self, LedgerError> {
        let entries = store.load().await?;
        let recovered = entries.len();
        let state = LedgerState::replay(policy, entries)?;
        if recovered > 0 {
            info!(
                "Recovered {recovered} audit entries, head {}",
                state.audit().head()
            );
        }
        if state.policy() != policy {
            warn!(
                "Audit trail keeps its recorded rules {:?}, ignoring configured {policy:?}",
                state.policy()
            );
        }
        Ok(Self {
            state: RwLock::new(state),
            store,
            authorizer,
            unconfirmed: AtomicBool::new(false),
        })
    }

    /// Apply a command on behalf of `caller`.
    ///
    /// On success exactly one audit entry has been durably appended. On any
    /// error nothing has changed.
    pub async fn execute(
        &self,
        caller: &ActorId,
        command: Command,
    ) -> Result<CommandOutput, LedgerError> {
        let action = command.action();
        let result = self.try_execute(caller, command).await;
        match &result {
            Ok(_) => info!("{action} accepted from {caller}"),
            Err(err) if err.is_rejection() => warn!("{action} rejected for {caller}: {err}"),
            Err(err) => error!("{action} failed for {caller}: {err}"),
        }
        result
    }

    async fn try_execute(
        &self,
        caller: &ActorId,
        command: Command,
    ) -> Result<CommandOutput, LedgerError> {
        self.authorize(caller, &command)?;

        let mut state = self.state.write().await;
        if self.unconfirmed.load(Ordering::SeqCst) {
            self.catch_up(&mut state).await?;
        }
        state.validate(&command)?;
        let entry = state
            .audit()
            .seal_next(caller.clone(), command, Utc::now().trunc_subsecs(3));
        if let Err(err) = self.store.append(&entry).await {
            self.unconfirmed.store(true, Ordering::SeqCst);
            if let Err(read_err) = self.catch_up(&mut state).await {
                error!("Could not read back the audit trail: {read_err}");
            }
            return Err(err);
        }
        state.apply(entry)
    }

    /// Apply whatever the store holds beyond the in-memory head.
    async fn catch_up(&self, state: &mut LedgerState) -> Result<(), LedgerError> {
        let head = state.audit().len() as u64;
        let missing = self.store.load_after(head).await?;
        if !missing.is_empty() {
            warn!(
                "Audit store holds {} entries beyond entry {head}, applying them",
                missing.len()
            );
            state.apply_all(missing)?;
        }
        self.unconfirmed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn authorize(&self, caller: &ActorId, command: &Command) -> Result<(), LedgerError> {
        let permitted = if command.requires_admin() {
            self.authorizer.is_administrator(caller)
        } else {
            matches!(command, Command::CastVote { voter_id, .. } if voter_id == caller)
        };
        if permitted {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(caller.clone()))
        }
    }

    pub fn is_administrator(&self, caller: &ActorId) -> bool {
        self.authorizer.is_administrator(caller)
    }

    pub async fn phase(&self) -> VotingPhase {
        self.state.read().await.phase()
    }

    pub async fn voter_status(&self, voter_id: &ActorId) -> VoterStatus {
        self.state.read().await.voters().status(voter_id)
    }

    pub async fn voter_report(&self, voter_id: &ActorId) -> VoterReport {
        self.state.read().await.voter_report(voter_id)
    }

    pub async fn voter(&self, voter_id: &ActorId) -> Option<VoterRecord> {
        self.state.read().await.voters().get(voter_id).cloned()
    }

    /// Every registered voter, ordered by ID.
    pub async fn voters(&self) -> Vec<VoterRecord> {
        self.state.read().await.voters().iter().cloned().collect()
    }

    /// Look up a ballot by the reference it was submitted with, so a caller
    /// who never saw the response can tell whether it landed.
    pub async fn ballot_by_reference(&self, reference: &str) -> Option<Receipt> {
        let state = self.state.read().await;
        let ballot = state.voters().ballots().by_reference(reference)?;
        state.receipt(ballot)
    }

    pub async fn parties(&self, include_inactive: bool) -> Vec<PartyRecord> {
        self.state
            .read()
            .await
            .parties()
            .list(include_inactive)
            .cloned()
            .collect()
    }

    pub async fn party(&self, party_id: PartyId) -> Result<PartyRecord, LedgerError> {
        self.state.read().await.parties().get(party_id).cloned()
    }

    pub async fn results(&self) -> Vec<PartyTally> {
        self.state.read().await.results()
    }

    pub async fn participation(&self) -> Participation {
        self.state.read().await.participation()
    }

    pub async fn reconcile(&self) -> Reconciliation {
        self.state.read().await.reconcile()
    }

    pub async fn dashboard(&self) -> Dashboard {
        self.state.read().await.dashboard()
    }

    /// Audit entries with a sequence number greater than `since`, in order.
    pub async fn audit_trail(&self, since: u64) -> Vec<AuditEntry> {
        self.state.read().await.audit().since(since).to_vec()
    }

    pub async fn audit_head(&self) -> (u64, EntryHash) {
        let state = self.state.read().await;
        (state.audit().len() as u64, state.audit().head())
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot()
    }
}
