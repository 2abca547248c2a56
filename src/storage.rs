mod jsonl;
mod memory;

use async_trait::async_trait;

pub use self::{jsonl::JsonLinesStorage, memory::InMemoryStorage};
use crate::{
    core::{DeviceId, PersistedRecord, Sample},
    error::StorageError,
};

/// Durable measurement storage.
///
/// `save` either commits the record or fails: a failed save must never be observable through
/// `get_last_saved`. Implementations serialize concurrent writes themselves.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, sample: &Sample) -> Result<PersistedRecord, StorageError>;

    async fn get_last_saved(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<PersistedRecord>, StorageError>;
}
