pub mod decision;
pub mod pending;
pub mod policy;
pub mod record;
pub mod sample;

pub use self::{
    decision::Outcome,
    pending::PendingBuffer,
    policy::{StalenessPolicy, consumption_changed},
    record::{PersistedRecord, RecordId},
    sample::{DeviceId, Phases, Sample},
};
