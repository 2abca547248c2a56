use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    core::{DeviceId, PersistedRecord, RecordId, Sample},
    error::StorageError,
    storage::Storage,
};

/// Process-local storage for dry runs and tests.
#[must_use]
#[derive(Default)]
pub struct InMemoryStorage(Mutex<Vec<PersistedRecord>>);

impl InMemoryStorage {
    /// All records of the device in insertion order.
    #[must_use]
    pub fn records(&self, device_id: &DeviceId) -> Vec<PersistedRecord> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| &record.sample.device_id == device_id)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save(&self, sample: &Sample) -> Result<PersistedRecord, StorageError> {
        let mut records = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let record = PersistedRecord {
            id: RecordId(records.len() as u64 + 1),
            created_at: Utc::now(),
            sample: sample.clone(),
        };
        records.push(record.clone());
        drop(records);
        Ok(record)
    }

    async fn get_last_saved(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<PersistedRecord>, StorageError> {
        Ok(self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|record| &record.sample.device_id == device_id)
            .cloned())
    }
}
