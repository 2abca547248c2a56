use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::core::Sample;

/// Storage-assigned record identifier.
#[derive(
    Copy, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize, From,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

/// Durably stored sample.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: RecordId,

    /// When the storage committed the record, as opposed to when the sample was captured.
    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub sample: Sample,
}
