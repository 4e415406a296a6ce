use std::sync::Arc;

use rocket::tokio::sync::Mutex;

use crate::error::LedgerError;
use crate::model::audit::AuditEntry;

/// Durable home of the audit trail.
///
/// The trail is the only durable state of a ledger: everything else is
/// rebuilt from it by replay. An `append` that returns `Ok` must have made
/// the entry durable. One that returns `Err` may or may not have, so the
/// caller must read the trail back before appending again.
#[rocket::async_trait]
pub trait AuditStore: Send + Sync {
    /// Stored entries with a sequence number greater than `sequence`, in order.
    async fn load_after(&self, sequence: u64) -> Result<Vec<AuditEntry>, LedgerError>;

    /// Persist one entry after the current last one.
    async fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError>;

    /// Every stored entry, ordered by sequence.
    async fn load(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        self.load_after(0).await
    }
}

#[rocket::async_trait]
impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    async fn load_after(&self, sequence: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        (**self).load_after(sequence).await
    }

    async fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        (**self).append(entry).await
    }
}

/// An audit store that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with a previously exported trail.
    pub fn with_entries(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[rocket::async_trait]
impl AuditStore for MemoryStore {
    async fn load_after(&self, sequence: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.sequence > sequence)
            .cloned()
            .collect())
    }

    async fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        if let Some(last) = entries.last() {
            if last.sequence >= entry.sequence {
                return Err(LedgerError::StorageFailure(format!(
                    "entry {} already stored",
                    entry.sequence
                )));
            }
        }
        entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ledger::command::Command;
    use crate::model::audit::EntryHash;

    #[rocket::async_test]
    async fn memory_store_keeps_order() {
        let store = MemoryStore::new();
        let first = AuditEntry::seal(
            1,
            "admin".into(),
            Command::OpenVoting,
            Utc::now(),
            EntryHash::GENESIS,
        );
        let second = AuditEntry::seal(
            2,
            "admin".into(),
            Command::CloseVoting,
            Utc::now(),
            first.hash,
        );

        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();
        assert!(matches!(
            store.append(&first).await,
            Err(LedgerError::StorageFailure(_))
        ));
        assert_eq!(store.load_after(1).await.unwrap(), vec![second.clone()]);
        assert_eq!(store.load().await.unwrap(), vec![first, second]);
        assert!(store.load_after(2).await.unwrap().is_empty());
    }
}
