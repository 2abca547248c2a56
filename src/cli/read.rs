use clap::Parser;

use crate::{
    cli::DevicesArgs,
    config::DeviceConfig,
    core::{DeviceId, Sample},
    prelude::*,
    reader::{Reader, ReaderKind, Simulator},
    tables::build_sample_table,
};

#[derive(Parser)]
pub struct ReadArgs {
    #[clap(flatten)]
    devices: DevicesArgs,

    /// Device identifier from the device file.
    #[clap(long = "device", env = "DEVICE_ID")]
    device_id: DeviceId,
}

impl ReadArgs {
    pub async fn run(self) -> Result {
        let config = self.devices.read()?;
        let sample = read_once(config.device(&self.device_id)?).await?;
        println!("{}", build_sample_table(&sample));
        Ok(())
    }
}

/// Read the device with the reader its configuration selects.
///
/// A disabled device without the simulator is still read from the hardware.
#[instrument(skip_all, fields(device_id = %device.id))]
async fn read_once(device: &DeviceConfig) -> Result<Sample> {
    let mut reader: Box<dyn Reader> = match device.settings().reader_kind() {
        Some(ReaderKind::Simulated) => Box::new(Simulator::new(device.id.clone())),
        Some(ReaderKind::Hardware) | None => {
            let hardware =
                device.hardware().context("the device has no `modbus-url` configured")?;
            hardware.connect(&device.id).await?
        }
    };
    let sample = reader.read().await?;
    info!(?sample.timestamp, "read");
    Ok(sample)
}
