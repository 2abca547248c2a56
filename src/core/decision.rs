use crate::{
    core::{PendingBuffer, PersistedRecord, Sample, StalenessPolicy, consumption_changed},
    error::StorageError,
    prelude::*,
    storage::Storage,
};

/// What to do with a freshly read sample.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Consumption changed: flush the pending sample, persist the candidate, and notify.
    Changed,

    /// Nothing changed but the last record is too old: persist the candidate silently.
    Expired,

    /// Nothing changed and the last record is fresh: keep the candidate in memory.
    Buffered,
}

impl Outcome {
    pub fn decide(
        previous: Option<&PersistedRecord>,
        candidate: &Sample,
        staleness: &StalenessPolicy,
    ) -> Self {
        if consumption_changed(previous, candidate) {
            Self::Changed
        } else if previous.is_some_and(|previous| staleness.expired(previous, candidate)) {
            Self::Expired
        } else {
            Self::Buffered
        }
    }

    #[must_use]
    pub const fn notify(self) -> bool {
        matches!(self, Self::Changed)
    }

    /// Apply the outcome to the storage and the pending buffer.
    ///
    /// Returns the candidate's record when it got persisted. The pending sample, if any, is always
    /// written before the candidate, and it is only dropped from the buffer once it is durable:
    /// a failed write leaves the buffer as it was.
    #[instrument(skip_all, fields(device_id = %candidate.device_id, outcome = ?self))]
    pub async fn apply<S: Storage + ?Sized>(
        self,
        storage: &S,
        pending: &mut PendingBuffer,
        candidate: Sample,
    ) -> Result<Option<PersistedRecord>, StorageError> {
        match self {
            Self::Changed => {
                if let Some(buffered) = pending.get() {
                    let record = storage.save(buffered).await?;
                    info!(id = %record.id, "flushed the pending sample");
                    pending.clear();
                }
                let record = storage.save(&candidate).await?;
                info!(id = %record.id, "consumption changed, persisted");
                Ok(Some(record))
            }
            Self::Expired => {
                let record = storage.save(&candidate).await?;
                pending.clear();
                info!(id = %record.id, "last record expired, persisted");
                Ok(Some(record))
            }
            Self::Buffered => {
                debug!("nothing changed, buffering");
                pending.replace(candidate);
                Ok(None)
            }
        }
    }
}
