//! Record store — the persistent source of truth for counters and facts.
//!
//! No transactional multi-record guarantee is assumed. The one compound
//! operation the domain needs, read-modify-write of a single record, is
//! exposed as [`RecordStore::update`] so that implementations can make it
//! atomic at their own consistency boundary.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::error::StoreError;

/// A value that can be persisted in a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Record kind, used as the table/label name by stores.
    const KIND: &'static str;

    /// The record's identity, if it has been assigned one.
    fn id(&self) -> Option<&str>;

    /// Return a copy carrying a store-generated identity.
    fn with_id(self, id: String) -> Self;
}

/// Persistent storage for records of one kind.
#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    /// The backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Every stored record of this kind.
    async fn find_all(&self) -> Result<Vec<T>, StoreError>;

    /// A single record by identity.
    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Insert or replace. Records without an identity are assigned one.
    async fn save(&self, record: T) -> Result<T, StoreError>;

    /// Apply `f` to the stored record with identity `id` and persist the result.
    ///
    /// Returns `None` when no such record exists. The default is a plain
    /// read-then-write and can lose updates under concurrent callers;
    /// stores that can do better override it.
    async fn update(
        &self,
        id: &str,
        f: &(dyn Fn(T) -> T + Send + Sync),
    ) -> Result<Option<T>, StoreError> {
        match self.find_by_id(id).await? {
            Some(current) => Ok(Some(self.save(f(current)).await?)),
            None => Ok(None),
        }
    }

    /// Save several records, in order.
    async fn save_all(&self, records: Vec<T>) -> Result<Vec<T>, StoreError> {
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            saved.push(self.save(record).await?);
        }
        Ok(saved)
    }
}
