use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::future::join_all;
use itertools::Itertools;
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{MissedTickBehavior, interval},
};

use crate::{
    core::{DeviceId, PersistedRecord},
    fanout::Listener,
    prelude::*,
    scheduler::{DeviceScheduler, DeviceSettings},
};

/// Owns the device schedulers and exposes the runtime control surface.
pub struct Controller {
    schedulers: BTreeMap<DeviceId, Arc<DeviceScheduler>>,
}

impl Controller {
    pub fn new(schedulers: impl IntoIterator<Item = DeviceScheduler>) -> Result<Self> {
        let schedulers = schedulers.into_iter().collect_vec();
        {
            let mut duplicates = schedulers.iter().map(DeviceScheduler::device_id).duplicates();
            if let Some(device_id) = duplicates.next() {
                bail!("device `{device_id}` is configured more than once");
            }
        }
        let schedulers = schedulers
            .into_iter()
            .map(|scheduler| (scheduler.device_id().clone(), Arc::new(scheduler)))
            .collect();
        Ok(Self { schedulers })
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.schedulers.keys()
    }

    fn scheduler(&self, device_id: &DeviceId) -> Result<&Arc<DeviceScheduler>> {
        self.schedulers.get(device_id).with_context(|| format!("unknown device `{device_id}`"))
    }

    pub fn settings(&self, device_id: &DeviceId) -> Result<DeviceSettings> {
        Ok(self.scheduler(device_id)?.settings())
    }

    pub fn enable(&self, device_id: &DeviceId, enabled: bool) -> Result {
        self.scheduler(device_id)?.enable(enabled);
        Ok(())
    }

    pub fn set_simulate(&self, device_id: &DeviceId, simulate: bool) -> Result {
        self.scheduler(device_id)?.set_simulate(simulate);
        Ok(())
    }

    pub fn set_poll_interval(&self, device_id: &DeviceId, seconds: u64) -> Result {
        ensure!(seconds != 0, "poll interval must be positive");
        self.scheduler(device_id)?.set_poll_interval(Duration::from_secs(seconds));
        Ok(())
    }

    pub async fn register_listener(&self, device_id: &DeviceId, listener: Listener) -> Result {
        self.scheduler(device_id)?.register_listener(listener).await;
        Ok(())
    }

    /// Persist the pending samples of all the devices.
    ///
    /// Every device is attempted even if some of them fail.
    pub async fn flush_all(&self) -> Result<Vec<PersistedRecord>> {
        let results = join_all(self.schedulers.values().map(|scheduler| scheduler.flush())).await;
        let mut records = Vec::new();
        let mut n_failures = 0_usize;
        for (device_id, result) in self.schedulers.keys().zip(results) {
            match result {
                Ok(record) => records.extend(record),
                Err(error) => {
                    error!(%device_id, "failed to flush: {error}");
                    n_failures += 1;
                }
            }
        }
        ensure!(n_failures == 0, "failed to flush {n_failures} device(s)");
        Ok(records)
    }

    /// Tick every device at the given resolution until the shutdown signal, then flush.
    ///
    /// Each tick runs in its own task, so a slow device does not hold back the others.
    /// A device whose previous tick is still running skips the new one.
    pub async fn run(&self, resolution: Duration, mut shutdown: watch::Receiver<bool>) -> Result {
        info!(devices = %self.device_ids().join(", "), ?resolution, "running…");
        let mut ticks = JoinSet::new();
        let mut timer = interval(resolution);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = timer.tick() => {
                    let now = Utc::now();
                    for scheduler in self.schedulers.values() {
                        let scheduler = Arc::clone(scheduler);
                        ticks.spawn(async move { scheduler.tick_if_due(now).await });
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() {
                        warn!("the shutdown sender is gone");
                        break;
                    }
                }
            }
            while let Some(result) = ticks.try_join_next() {
                if let Err(error) = result {
                    error!("tick task failed: {error}");
                }
            }
        }

        info!("shutting down, waiting for the in-flight ticks…");
        while let Some(result) = ticks.join_next().await {
            if let Err(error) = result {
                error!("tick task failed: {error}");
            }
        }
        let records = self.flush_all().await?;
        info!(n_flushed = records.len(), "stopped");
        Ok(())
    }
}
