use mongodb::{bson::doc, error::Error as DbError, options::FindOptions, Database};
use rocket::futures::TryStreamExt;

use crate::error::LedgerError;
use crate::ledger::AuditStore;
use crate::model::audit::AuditEntry;

use super::{is_duplicate_key_error, Coll};

/// Audit trail persisted in MongoDB, one document per entry.
///
/// Appending is a single-document insert, so each accepted command is
/// durable in full or not at all.
#[derive(Clone)]
pub struct MongoAuditStore {
    entries: Coll<AuditEntry>,
}

impl MongoAuditStore {
    /// Callers should have run [`super::ensure_indexes_exist`] on `db`.
    pub fn new(db: &Database) -> Self {
        Self {
            entries: Coll::from_db(db),
        }
    }
}

fn storage_failure(err: DbError) -> LedgerError {
    LedgerError::StorageFailure(err.to_string())
}

#[rocket::async_trait]
impl AuditStore for MongoAuditStore {
    async fn load_after(&self, sequence: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        let sequence = i64::try_from(sequence).map_err(|_| {
            LedgerError::StorageFailure(format!("sequence {sequence} is out of range"))
        })?;
        let filter = doc! {"sequence": {"$gt": sequence}};
        let by_sequence = FindOptions::builder().sort(doc! {"sequence": 1}).build();
        self.entries
            .find(filter, by_sequence)
            .await
            .map_err(storage_failure)?
            .try_collect()
            .await
            .map_err(storage_failure)
    }

    async fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        match self.entries.insert_one(entry, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(LedgerError::StorageFailure(format!(
                "conflicting entry already stored for sequence {}",
                entry.sequence
            ))),
            Err(err) => Err(storage_failure(err)),
        }
    }
}
