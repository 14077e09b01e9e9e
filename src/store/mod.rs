//! Storage seams for the outbox queue and the integration settings.
//!
//! Both traits are object safe and are held as `Arc<dyn ...>` in the shared
//! state. [`PgStore`] backs them with Postgres; [`memory::MemoryStore`] keeps
//! everything in process for tests and local runs.

pub mod memory;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db;
use crate::error::StoreError;
use crate::models::{NewQueueRecord, QueueCounts, QueueRecord, RecordUpdate, Settings};

pub use memory::MemoryStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a record. Fails with `DuplicateKey` when the attempt is already queued.
    async fn insert(&self, record: NewQueueRecord) -> Result<i64, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<QueueRecord>, StoreError>;
    async fn find_by_attempt(&self, attempt_id: i64) -> Result<Option<QueueRecord>, StoreError>;
    /// Every record with `time_sent == 0`.
    async fn find_pending(&self) -> Result<Vec<QueueRecord>, StoreError>;
    /// Overwrite `time_sent`, `status` and `attempts`. `attempts` never moves backwards.
    async fn update(&self, id: i64, update: RecordUpdate) -> Result<(), StoreError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<QueueRecord>, StoreError>;
    async fn counts(&self) -> Result<QueueCounts, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings, StoreError>;
    async fn save(&self, settings: &Settings) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PgStore {
    async fn insert(&self, record: NewQueueRecord) -> Result<i64, StoreError> {
        db::queue::insert(&self.pool, &record)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::DuplicateKey(record.attempt_id)
                }
                _ => StoreError::Database(e),
            })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<QueueRecord>, StoreError> {
        Ok(db::queue::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_attempt(&self, attempt_id: i64) -> Result<Option<QueueRecord>, StoreError> {
        Ok(db::queue::find_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn find_pending(&self) -> Result<Vec<QueueRecord>, StoreError> {
        Ok(db::queue::find_pending(&self.pool).await?)
    }

    async fn update(&self, id: i64, update: RecordUpdate) -> Result<(), StoreError> {
        match db::queue::update(&self.pool, id, &update).await? {
            0 => Err(StoreError::NotFound(id)),
            _ => Ok(()),
        }
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<QueueRecord>, StoreError> {
        Ok(db::queue::list(&self.pool, limit, offset).await?)
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        Ok(db::queue::counts(&self.pool).await?)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        let pairs = db::settings::load_all(&self.pool).await?;
        Ok(Settings::from_pairs(&pairs))
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        db::settings::save_all(&self.pool, &settings.to_pairs()).await?;
        Ok(())
    }
}
