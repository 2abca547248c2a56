//! Modbus TCP driver for SDM630-style three-phase energy meters.
//!
//! Values are IEEE-754 single-precision floats stored in pairs of input registers,
//! high word first.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde_with::DeserializeFromStr;
use tokio::{net::lookup_host, time::timeout};
use tokio_modbus::{
    Address,
    Quantity,
    Slave,
    SlaveId,
    client::{Context as ModbusContext, Reader as _, tcp::connect_slave},
};

use crate::{
    core::{DeviceId, Phases, Sample},
    error::ReadError,
    prelude::*,
    quantity::{
        electric::{Amperes, Hertz, Volts},
        energy::KilowattHours,
        power::{Kilowatts, Watts},
    },
    reader::{Connect, Reader},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Meter address in the form of `modbus+tcp://host[:port]/slave-id`.
#[derive(Clone, Debug, Eq, PartialEq, DeserializeFromStr)]
pub struct ModbusUrl {
    host: String,
    port: u16,
    slave_id: SlaveId,
}

impl ModbusUrl {
    const DEFAULT_PORT: u16 = 502;
}

impl FromStr for ModbusUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(url).with_context(|| format!("`{url}` is an invalid URL"))?;
        ensure!(url.scheme() == "modbus+tcp", "only `modbus+tcp` scheme is currently supported");
        let host = url.host_str().context("the URL must contain host")?.to_owned();
        let port = url.port().unwrap_or(Self::DEFAULT_PORT);
        let slave_id = url
            .path_segments()
            .into_iter()
            .flatten()
            .find(|segment| !segment.is_empty())
            .context("slave ID must be specified in the path")?
            .parse()
            .context("incorrect slave ID")?;
        Ok(Self { host, port, slave_id })
    }
}

impl Display for ModbusUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "modbus+tcp://{}:{}/{}", self.host, self.port, self.slave_id)
    }
}

#[async_trait]
impl Connect for ModbusUrl {
    #[instrument(skip_all, fields(device_id = %device_id, url = %self))]
    async fn connect(&self, device_id: &DeviceId) -> Result<Box<dyn Reader>, ReadError> {
        info!("connecting…");
        let context = self.connect_context().await.map_err(ReadError::Unavailable)?;
        info!("connected");
        Ok(Box::new(ModbusReader { device_id: device_id.clone(), context }))
    }
}

impl ModbusUrl {
    async fn connect_context(&self) -> Result<ModbusContext> {
        let address = lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("failed to resolve `{}`", self.host))?
            .next()
            .with_context(|| format!("no addresses resolved for `{}`", self.host))?;
        timeout(CONNECT_TIMEOUT, connect_slave(address, Slave(self.slave_id)))
            .await
            .context("timed out while connecting to the meter")?
            .context("failed to connect to the meter")
    }
}

/// Input register map.
mod registers {
    use tokio_modbus::Address;

    /// Voltage, current, and active power of L1–L3, in this order.
    pub const PHASE_BLOCK: Address = 0x0000;
    pub const TOTAL_POWER: Address = 0x0034;
    pub const FREQUENCY: Address = 0x0046;

    /// Imported active energy of L1–L3.
    pub const ENERGY_BLOCK: Address = 0x015A;
}

pub struct ModbusReader {
    device_id: DeviceId,
    context: ModbusContext,
}

impl ModbusReader {
    async fn read_floats(&mut self, address: Address, n_values: Quantity) -> Result<Vec<f64>> {
        let n_words = n_values * 2;
        let words = timeout(READ_TIMEOUT, self.context.read_input_registers(address, n_words))
            .await
            .context("timeout reading the registers")???;
        ensure!(
            words.len() == usize::from(n_words),
            "read {} words while expected {n_words}",
            words.len(),
        );
        Ok(decode_floats(&words))
    }

    async fn read_fallible(&mut self) -> Result<Sample> {
        let phase_block = self.read_floats(registers::PHASE_BLOCK, 9).await?;
        let total_power = self.read_floats(registers::TOTAL_POWER, 1).await?;
        let frequency = self.read_floats(registers::FREQUENCY, 1).await?;
        let energy = self.read_floats(registers::ENERGY_BLOCK, 3).await?;
        let sample = Sample::builder()
            .device_id(self.device_id.clone())
            .timestamp(Utc::now())
            .voltage(Phases::new(
                Volts(phase_block[0]),
                Volts(phase_block[1]),
                Volts(phase_block[2]),
            ))
            .current(Phases::new(
                Amperes(phase_block[3]),
                Amperes(phase_block[4]),
                Amperes(phase_block[5]),
            ))
            .power(Phases::new(
                Watts(phase_block[6]),
                Watts(phase_block[7]),
                Watts(phase_block[8]),
            ))
            .total_power(Kilowatts::from(Watts(total_power[0])))
            .frequency(Hertz(frequency[0]))
            .energy(Phases::new(
                KilowattHours(energy[0]),
                KilowattHours(energy[1]),
                KilowattHours(energy[2]),
            ))
            .build();
        Ok(sample)
    }
}

#[async_trait]
impl Reader for ModbusReader {
    #[instrument(skip_all, fields(device_id = %self.device_id))]
    async fn read(&mut self) -> Result<Sample, ReadError> {
        let sample = self.read_fallible().await.map_err(ReadError::Failure)?;
        debug!(total_power = ?sample.total_power, energy = ?sample.energy, "read");
        Ok(sample)
    }
}

/// Decode big-endian word pairs into floats.
fn decode_floats(words: &[u16]) -> Vec<f64> {
    words
        .chunks_exact(2)
        .map(|pair| f64::from(f32::from_bits(u32::from(pair[0]) << 16 | u32::from(pair[1]))))
        .collect()
}
