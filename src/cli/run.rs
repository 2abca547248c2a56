use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use reqwest::Url;
use tokio::sync::watch;

use crate::{
    cli::DevicesArgs,
    config::DevicesConfig,
    controller::Controller,
    core::{PersistedRecord, StalenessPolicy},
    fanout::{LogTransport, Transport, WebhookTransport},
    prelude::*,
    scheduler::DeviceScheduler,
    storage::{InMemoryStorage, JsonLinesStorage, Storage},
};

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    devices: DevicesArgs,

    /// JSON Lines file to append the records to. Without it, the records are kept in memory.
    #[clap(long, env = "STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Post the consumption change events to this URL. Without it, the events are logged.
    #[clap(long, env = "EVENT_WEBHOOK_URL")]
    event_webhook_url: Option<Url>,

    /// Persist an unchanged sample anyway when the last record is older than this.
    #[clap(long, env = "STALENESS_THRESHOLD", default_value = "1h")]
    staleness_threshold: humantime::Duration,

    /// How often the devices are checked for being due.
    #[clap(long, env = "TICK_RESOLUTION", default_value = "1s")]
    tick_resolution: humantime::Duration,
}

impl RunArgs {
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result {
        let config = self.devices.read()?;
        let staleness = StalenessPolicy::try_new(self.staleness_threshold.into())?;
        info!(threshold = %staleness.threshold(), "staleness");
        let storage: Arc<dyn Storage> = match &self.storage_path {
            Some(path) => {
                let storage = JsonLinesStorage::open(path).await?;
                info!(path = %storage.path().display(), "appending the records");
                Arc::new(storage)
            }
            None => {
                warn!("no storage path is set, the records will be lost on exit");
                Arc::new(InMemoryStorage::default())
            }
        };
        let transport: Arc<dyn Transport> = match self.event_webhook_url {
            Some(url) => Arc::new(WebhookTransport::new(url)?),
            None => Arc::new(LogTransport),
        };

        let schedulers = config.devices.iter().map(|device| {
            DeviceScheduler::builder()
                .device_id(device.id.clone())
                .settings(device.settings())
                .maybe_hardware(device.hardware())
                .storage(storage.clone())
                .transport(transport.clone())
                .staleness(staleness)
                .build()
        });
        let controller = Arc::new(Controller::new(schedulers)?);
        for device in &config.devices {
            controller.register_listener(&device.id, Box::new(log_change)).await?;
        }

        #[cfg(unix)]
        let reloader = tokio::spawn(reload_on_hangup(controller.clone(), self.devices.clone()));

        let result = controller.run(self.tick_resolution.into(), shutdown).await;

        #[cfg(unix)]
        reloader.abort();

        result
    }
}

#[allow(clippy::unnecessary_wraps)]
fn log_change(record: &PersistedRecord) -> Result {
    info!(
        device_id = %record.sample.device_id,
        id = %record.id,
        total_power = %record.sample.total_power,
        "consumption changed",
    );
    Ok(())
}

/// Apply the device file to the running devices on `SIGHUP`.
///
/// Only the settings of the already running devices can change this way.
#[cfg(unix)]
async fn reload_on_hangup(controller: Arc<Controller>, devices: DevicesArgs) -> Result {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = signal(SignalKind::hangup()).context("failed to listen for `SIGHUP`")?;
    while hangups.recv().await.is_some() {
        info!(path = %devices.path.display(), "reloading the devices…");
        match devices.read() {
            Ok(config) => apply_settings(&controller, &config),
            Err(error) => warn!("failed to reload the devices: {error:#}"),
        }
    }
    Ok(())
}

fn apply_settings(controller: &Controller, config: &DevicesConfig) {
    for device in &config.devices {
        let result = controller
            .enable(&device.id, device.enabled)
            .and_then(|()| controller.set_simulate(&device.id, device.simulate))
            .and_then(|()| {
                controller.set_poll_interval(&device.id, device.poll_interval.as_secs())
            });
        if let Err(error) = result {
            warn!(device_id = %device.id, "failed to apply the settings: {error:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{core::DeviceId, scheduler::DeviceSettings, testing::RecordingTransport};

    #[test]
    fn apply_settings_ok() -> Result {
        let scheduler = DeviceScheduler::builder()
            .device_id("laadpaal_noord")
            .settings(DeviceSettings::builder().build())
            .storage(Arc::new(InMemoryStorage::default()))
            .transport(Arc::new(RecordingTransport::default()))
            .build();
        let controller = Controller::new([scheduler])?;
        let config: DevicesConfig = r#"
            [[devices]]
            id = "laadpaal_noord"
            enabled = true
            poll-interval = 60

            [[devices]]
            id = "laadpaal_zuid"
        "#
        .parse()?;

        apply_settings(&controller, &config);

        let settings = controller.settings(&DeviceId::from("laadpaal_noord"))?;
        assert!(settings.enabled);
        assert!(!settings.simulate);
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        Ok(())
    }
}
