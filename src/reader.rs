pub mod modbus;
mod simulator;

use async_trait::async_trait;

pub use self::simulator::Simulator;
use crate::{
    core::{DeviceId, Sample},
    error::ReadError,
};

/// Produces samples of a single device.
#[async_trait]
pub trait Reader: Send {
    async fn read(&mut self) -> Result<Sample, ReadError>;
}

/// Constructs the hardware reader of a device.
///
/// Construction may fail when the hardware is absent, in which case
/// [`ReadError::Unavailable`] is expected.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, device_id: &DeviceId) -> Result<Box<dyn Reader>, ReadError>;
}

/// Which reader a device needs at the moment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReaderKind {
    Hardware,
    Simulated,
}

/// Stand-in for devices that do not have any hardware configured.
pub struct Disconnected;

#[async_trait]
impl Connect for Disconnected {
    async fn connect(&self, device_id: &DeviceId) -> Result<Box<dyn Reader>, ReadError> {
        Err(ReadError::Unavailable(anyhow::anyhow!("no hardware is configured for `{device_id}`")))
    }
}
