//! In-memory record store.
//!
//! Records are kept by identity in insertion order. Every mutation holds the
//! write lock, so [`RecordStore::update`] is atomic per store.

use async_trait::async_trait;
use maestro_core::error::StoreError;
use maestro_core::record::{Record, RecordStore};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct Table<T> {
    order: Vec<String>,
    rows: HashMap<String, T>,
}

impl<T: Record> Table<T> {
    fn upsert(&mut self, id: String, record: T) {
        if self.rows.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }
}

/// A record store that lives for the lifetime of the process.
pub struct InMemoryRecordStore<T> {
    table: RwLock<Table<T>>,
}

impl<T: Record> InMemoryRecordStore<T> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table {
                order: Vec::new(),
                rows: HashMap::new(),
            }),
        }
    }
}

impl<T: Record> Default for InMemoryRecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for InMemoryRecordStore<T> {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.table.read().await.rows.get(id).cloned())
    }

    async fn save(&self, record: T) -> Result<T, StoreError> {
        let record = match record.id() {
            Some(id) if !id.is_empty() => record,
            _ => record.with_id(Uuid::new_v4().to_string()),
        };
        let id = record.id().unwrap_or_default().to_string();
        self.table.write().await.upsert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: &str,
        f: &(dyn Fn(T) -> T + Send + Sync),
    ) -> Result<Option<T>, StoreError> {
        let mut table = self.table.write().await;
        let Some(current) = table.rows.get(id).cloned() else {
            return Ok(None);
        };
        let updated = f(current);
        table.upsert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }
}
