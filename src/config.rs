use std::{fmt::Debug, fs, path::Path, time::Duration};

use itertools::Itertools;
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};

use crate::{
    core::DeviceId,
    prelude::*,
    reader::{Connect, modbus::ModbusUrl},
    scheduler::DeviceSettings,
};

/// Device file, for example:
///
/// ```toml
/// [[devices]]
/// id = "laadpaal_noord"
/// enabled = true
/// poll-interval = 10
/// modbus-url = "modbus+tcp://192.168.1.10/1"
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevicesConfig {
    pub devices: Vec<DeviceConfig>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: DeviceId,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub simulate: bool,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Absent for devices that only ever run on the simulator.
    pub modbus_url: Option<ModbusUrl>,
}

const fn default_poll_interval() -> Duration {
    DeviceSettings::DEFAULT_POLL_INTERVAL
}

impl DevicesConfig {
    #[instrument(name = "reading the devices…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        text.parse()
    }

    pub fn device(&self, device_id: &DeviceId) -> Result<&DeviceConfig> {
        self.devices
            .iter()
            .find(|device| &device.id == device_id)
            .with_context(|| format!("device `{device_id}` is not configured"))
    }
}

impl std::str::FromStr for DevicesConfig {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let this: Self = toml::from_str(text).context("failed to parse the devices")?;
        if let Some(device_id) = this.devices.iter().map(|device| &device.id).duplicates().next() {
            bail!("device `{device_id}` is configured more than once");
        }
        for device in &this.devices {
            ensure!(
                !device.poll_interval.is_zero(),
                "poll interval of `{}` must be positive",
                device.id,
            );
        }
        Ok(this)
    }
}

impl DeviceConfig {
    pub fn settings(&self) -> DeviceSettings {
        DeviceSettings::builder()
            .enabled(self.enabled)
            .simulate(self.simulate)
            .poll_interval(self.poll_interval)
            .build()
    }

    pub fn hardware(&self) -> Option<Box<dyn Connect>> {
        self.modbus_url.clone().map(|url| Box::new(url) as Box<dyn Connect>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok() -> Result {
        let config: DevicesConfig = r#"
            [[devices]]
            id = "laadpaal_noord"
            enabled = true
            poll-interval = 30
            modbus-url = "modbus+tcp://192.168.1.10/1"

            [[devices]]
            id = "laadpaal_zuid"
            simulate = true
        "#
        .parse()?;

        let noord = config.device(&DeviceId::from("laadpaal_noord"))?;
        assert!(noord.enabled);
        assert!(!noord.simulate);
        assert_eq!(noord.poll_interval, Duration::from_secs(30));
        let url: ModbusUrl = "modbus+tcp://192.168.1.10:502/1".parse()?;
        assert_eq!(noord.modbus_url, Some(url));

        let zuid = config.device(&DeviceId::from("laadpaal_zuid"))?;
        assert!(!zuid.enabled);
        assert!(zuid.simulate);
        assert_eq!(zuid.poll_interval, DeviceSettings::DEFAULT_POLL_INTERVAL);
        assert!(zuid.hardware().is_none());

        assert!(config.device(&DeviceId::from("laadpaal_west")).is_err());
        Ok(())
    }

    #[test]
    fn duplicate_device_is_rejected() {
        let result = r#"
            [[devices]]
            id = "laadpaal_noord"

            [[devices]]
            id = "laadpaal_noord"
        "#
        .parse::<DevicesConfig>();
        assert!(result.is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let result = r#"
            [[devices]]
            id = "laadpaal_noord"
            poll-interval = 0
        "#
        .parse::<DevicesConfig>();
        assert!(result.is_err());
    }

    #[test]
    fn read_from_file_ok() -> Result {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), "[[devices]]\nid = \"laadpaal_noord\"\n")?;
        let config = DevicesConfig::read_from(file.path())?;
        assert_eq!(config.devices.len(), 1);
        Ok(())
    }
}
