//! SQLite record store.
//!
//! All record kinds share one table keyed by `(kind, id)`; the record body
//! is stored as JSON. Read-modify-write updates run inside a transaction
//! behind the store's writer lock, so increments are not lost.

use async_trait::async_trait;
use chrono::Utc;
use maestro_core::error::StoreError;
use maestro_core::record::{Record, RecordStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A persistent record store for one record kind.
///
/// Stores for different kinds can share a pool via [`SqliteRecordStore::from_pool`].
pub struct SqliteRecordStore<T> {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Record> SqliteRecordStore<T> {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = open_pool(path).await?;
        let store = Self::from_pool(pool).await?;
        info!(kind = T::KIND, "SQLite record store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        run_migrations(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            _kind: PhantomData,
        })
    }

    /// The underlying pool, for opening stores of other kinds on the same file.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(body: &str) -> Result<T, StoreError> {
        serde_json::from_str(body).map_err(|e| StoreError::Serialization(format!("{}: {e}", T::KIND)))
    }

    fn encode(record: &T) -> Result<String, StoreError> {
        serde_json::to_string(record).map_err(|e| StoreError::Serialization(format!("{}: {e}", T::KIND)))
    }
}

/// Open a pool for `path` with the pragmas the stores expect.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    // Each connection to an in-memory database sees its own empty database.
    let max_connections = if path.contains(":memory:") { 1 } else { 4 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL,
            id          TEXT NOT NULL,
            body        TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE (kind, id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::MigrationFailed(format!("records table: {e}")))?;

    debug!("SQLite record migrations complete");
    Ok(())
}

const UPSERT: &str = r#"
    INSERT INTO records (kind, id, body, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(kind, id) DO UPDATE SET
        body = excluded.body,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl<T: Record> RecordStore<T> for SqliteRecordStore<T> {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query("SELECT body FROM records WHERE kind = ?1 ORDER BY seq")
            .bind(T::KIND)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let body: String = row
                    .try_get("body")
                    .map_err(|e| StoreError::Storage(format!("body column: {e}")))?;
                Self::decode(&body)
            })
            .collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        let row = sqlx::query("SELECT body FROM records WHERE kind = ?1 AND id = ?2")
            .bind(T::KIND)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let body: String = row
                    .try_get("body")
                    .map_err(|e| StoreError::Storage(format!("body column: {e}")))?;
                Ok(Some(Self::decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, record: T) -> Result<T, StoreError> {
        let record = match record.id() {
            Some(id) if !id.is_empty() => record,
            _ => record.with_id(Uuid::new_v4().to_string()),
        };
        let id = record.id().unwrap_or_default().to_string();
        let body = Self::encode(&record)?;

        let _guard = self.write_lock.lock().await;
        sqlx::query(UPSERT)
            .bind(T::KIND)
            .bind(&id)
            .bind(&body)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(record)
    }

    async fn update(
        &self,
        id: &str,
        f: &(dyn Fn(T) -> T + Send + Sync),
    ) -> Result<Option<T>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let row = sqlx::query("SELECT body FROM records WHERE kind = ?1 AND id = ?2")
            .bind(T::KIND)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row
            .try_get("body")
            .map_err(|e| StoreError::Storage(format!("body column: {e}")))?;

        let updated = f(Self::decode(&body)?);
        sqlx::query(UPSERT)
            .bind(T::KIND)
            .bind(id)
            .bind(Self::encode(&updated)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Some(updated))
    }
}
