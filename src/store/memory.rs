use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{QueueStore, SettingsStore};
use crate::error::StoreError;
use crate::models::{NewQueueRecord, QueueCounts, QueueRecord, RecordUpdate, Settings};

/// Process-local store. Nothing survives a restart.
pub struct MemoryStore {
    records: DashMap<i64, QueueRecord>,
    /// attempt_id -> record id
    by_attempt: DashMap<i64, i64>,
    next_id: AtomicI64,
    settings: RwLock<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            records: DashMap::new(),
            by_attempt: DashMap::new(),
            next_id: AtomicI64::new(1),
            settings: RwLock::new(settings),
        }
    }

    fn sorted(&self, filter: impl Fn(&QueueRecord) -> bool) -> Vec<QueueRecord> {
        let mut records: Vec<QueueRecord> = self
            .records
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, record: NewQueueRecord) -> Result<i64, StoreError> {
        let id = match self.by_attempt.entry(record.attempt_id) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateKey(record.attempt_id)),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(id);
                id
            }
        };

        self.records.insert(
            id,
            QueueRecord {
                id,
                user_id: record.user_id,
                quiz_id: record.quiz_id,
                attempt_id: record.attempt_id,
                state: record.state,
                time_created: record.time_created,
                time_sent: 0,
                status: String::new(),
                attempts: 0,
            },
        );
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<QueueRecord>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_attempt(&self, attempt_id: i64) -> Result<Option<QueueRecord>, StoreError> {
        let id = self.by_attempt.get(&attempt_id).map(|r| *r.value());
        match id {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn find_pending(&self) -> Result<Vec<QueueRecord>, StoreError> {
        Ok(self.sorted(|r| !r.is_sent()))
    }

    async fn update(&self, id: i64, update: RecordUpdate) -> Result<(), StoreError> {
        let mut record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.time_sent = update.time_sent;
        record.status = update.status;
        record.attempts = record.attempts.max(update.attempts);
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<QueueRecord>, StoreError> {
        let mut records = self.sorted(|_| true);
        records.reverse();
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let mut counts = QueueCounts::default();
        for record in self.records.iter() {
            if record.is_sent() {
                counts.sent += 1;
            } else {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings.clone();
        Ok(())
    }
}
