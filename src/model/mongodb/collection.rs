use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::audit::AuditEntry;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for AuditEntry {
    const NAME: &'static str = "audit_trail";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let entries = Coll::<AuditEntry>::from_db(db);
    let unique = IndexOptions::builder().unique(true).build();

    // One entry per position in the chain.
    let sequence_index = IndexModel::builder()
        .keys(doc! {"sequence": 1})
        .options(unique)
        .build();
    entries.create_index(sequence_index, None).await?;

    // One ballot per voter and per reference, even across processes.
    for field in ["payload.voter_id", "payload.reference"] {
        let options = IndexOptions::builder()
            .unique(true)
            .partial_filter_expression(doc! {"payload.type": "CastVote"})
            .build();
        let index = IndexModel::builder()
            .keys(doc! {field: 1})
            .options(options)
            .build();
        entries.create_index(index, None).await?;
    }

    Ok(())
}
