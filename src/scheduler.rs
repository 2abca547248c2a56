use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bon::{Builder, bon};
use chrono::{DateTime, Utc};

use crate::{
    core::{DeviceId, Outcome, PendingBuffer, PersistedRecord, Sample, StalenessPolicy},
    error::{ReadError, StorageError, TickError},
    fanout::{EventFanout, Listener, Transport},
    prelude::*,
    reader::{Connect, Disconnected, Reader, ReaderKind, Simulator},
    storage::Storage,
};

/// Device configuration that may change at runtime.
#[must_use]
#[derive(Copy, Clone, Debug, Builder)]
pub struct DeviceSettings {
    #[builder(default)]
    pub enabled: bool,

    /// Read from the simulator while the device is disabled.
    #[builder(default)]
    pub simulate: bool,

    #[builder(default = DeviceSettings::DEFAULT_POLL_INTERVAL)]
    pub poll_interval: Duration,
}

impl DeviceSettings {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

    /// Reader the device should be using, if any.
    #[must_use]
    pub const fn reader_kind(self) -> Option<ReaderKind> {
        if self.enabled {
            Some(ReaderKind::Hardware)
        } else if self.simulate {
            Some(ReaderKind::Simulated)
        } else {
            None
        }
    }
}

/// Result of a [`DeviceScheduler::tick_if_due`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tick {
    /// Poll interval has not elapsed yet.
    NotDue,

    /// Previous tick is still running.
    InFlight,

    /// Neither enabled nor simulated: the reader was not touched.
    Disabled,

    /// Reader or storage failed, nothing changed but the last tick time.
    Skipped,

    Completed(Outcome),
}

/// Everything a tick mutates.
struct State {
    last_tick_at: Option<DateTime<Utc>>,
    pending: PendingBuffer,
    reader: Option<(ReaderKind, Box<dyn Reader>)>,
    fanout: EventFanout,
}

impl State {
    fn is_due(&self, now: DateTime<Utc>, poll_interval: Duration) -> bool {
        self.last_tick_at.is_none_or(|last_tick_at| {
            (now - last_tick_at).to_std().is_ok_and(|elapsed| elapsed >= poll_interval)
        })
    }
}

/// Polls a single energy device and runs its samples through the persistence pipeline.
///
/// Ticks of the same device are serialized, ticks of different devices are independent.
pub struct DeviceScheduler {
    device_id: DeviceId,
    settings: Mutex<DeviceSettings>,
    state: tokio::sync::Mutex<State>,
    hardware: Box<dyn Connect>,
    storage: Arc<dyn Storage>,
    staleness: StalenessPolicy,
}

#[bon]
impl DeviceScheduler {
    #[builder]
    pub fn new(
        #[builder(into)] device_id: DeviceId,
        settings: DeviceSettings,
        hardware: Option<Box<dyn Connect>>,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        #[builder(default)] staleness: StalenessPolicy,
    ) -> Self {
        let state = State {
            last_tick_at: None,
            pending: PendingBuffer::default(),
            reader: None,
            fanout: EventFanout::new(transport),
        };
        Self {
            device_id,
            settings: Mutex::new(settings),
            state: tokio::sync::Mutex::new(state),
            hardware: hardware.unwrap_or_else(|| Box::new(Disconnected)),
            storage,
            staleness,
        }
    }
}

impl DeviceScheduler {
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn settings(&self) -> DeviceSettings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_settings(&self, update: impl FnOnce(&mut DeviceSettings)) {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut settings);
        info!(device_id = %self.device_id, ?settings, "updated the settings");
    }

    pub fn enable(&self, enabled: bool) {
        self.update_settings(|settings| settings.enabled = enabled);
    }

    pub fn set_simulate(&self, simulate: bool) {
        self.update_settings(|settings| settings.simulate = simulate);
    }

    pub fn set_poll_interval(&self, poll_interval: Duration) {
        self.update_settings(|settings| settings.poll_interval = poll_interval);
    }

    /// Subscribe to the consumption changes. Waits for an in-flight tick to finish.
    pub async fn register_listener(&self, listener: Listener) {
        let mut state = self.state.lock().await;
        state.fanout.register(listener);
        debug!(device_id = %self.device_id, n_listeners = state.fanout.n_listeners(), "registered");
    }

    /// Copy of the buffered sample, if any.
    pub async fn pending(&self) -> Option<Sample> {
        self.state.lock().await.pending.get().cloned()
    }

    /// Run the pipeline if the poll interval has elapsed since the last tick.
    ///
    /// The last tick time advances whenever the tick fires, even when it fails,
    /// so that a failing reader is retried no sooner than one full interval later.
    #[instrument(skip_all, fields(device_id = %self.device_id))]
    pub async fn tick_if_due(&self, now: DateTime<Utc>) -> Tick {
        let Ok(mut state) = self.state.try_lock() else {
            debug!("the previous tick is still in flight");
            return Tick::InFlight;
        };
        let settings = self.settings();
        if !state.is_due(now, settings.poll_interval) {
            return Tick::NotDue;
        }
        state.last_tick_at = Some(now);

        let Some(reader_kind) = settings.reader_kind() else {
            debug!(?settings, "disabled, skipping");
            state.reader = None;
            return Tick::Disabled;
        };
        match self.run_pipeline(&mut state, reader_kind).await {
            Ok(outcome) => Tick::Completed(outcome),
            Err(TickError::Read(error @ ReadError::Unavailable(_))) => {
                warn!(?reader_kind, "no working reader, skipping: {error}");
                Tick::Skipped
            }
            Err(TickError::Read(error @ ReadError::Failure(_))) => {
                warn!(?reader_kind, "skipping: {error}");
                Tick::Skipped
            }
            Err(TickError::Storage(error)) => {
                error!("abandoning the tick: {error}");
                Tick::Skipped
            }
        }
    }

    async fn run_pipeline(
        &self,
        state: &mut State,
        reader_kind: ReaderKind,
    ) -> Result<Outcome, TickError> {
        let reader = self.reader(state, reader_kind).await?;
        let candidate = match reader.read().await {
            Ok(sample) => sample,
            Err(error) => {
                // Reconnect on the next tick.
                state.reader = None;
                return Err(error.into());
            }
        };

        // Always ask the storage: the in-memory state does not survive restarts.
        let previous = self.storage.get_last_saved(&self.device_id).await?;
        let outcome = Outcome::decide(previous.as_ref(), &candidate, &self.staleness);
        let record = outcome.apply(&*self.storage, &mut state.pending, candidate).await?;
        if outcome.notify()
            && let Some(record) = &record
        {
            state.fanout.notify(record).await;
        }
        Ok(outcome)
    }

    /// Get the reader of the required kind, instantiating it when needed.
    async fn reader<'s>(
        &self,
        state: &'s mut State,
        reader_kind: ReaderKind,
    ) -> Result<&'s mut Box<dyn Reader>, ReadError> {
        let is_current =
            matches!(&state.reader, Some((current_kind, _)) if *current_kind == reader_kind);
        if !is_current {
            state.reader = None;
            let reader: Box<dyn Reader> = match reader_kind {
                ReaderKind::Hardware => self.hardware.connect(&self.device_id).await?,
                ReaderKind::Simulated => {
                    warn!("using the simulator");
                    Box::new(Simulator::new(self.device_id.clone()))
                }
            };
            state.reader = Some((reader_kind, reader));
        }
        state
            .reader
            .as_mut()
            .map(|(_, reader)| reader)
            .ok_or_else(|| ReadError::Unavailable(anyhow::anyhow!("the reader is missing")))
    }

    /// Persist the pending sample regardless of the decision rules.
    ///
    /// Used on shutdown, waits for an in-flight tick to finish.
    #[instrument(skip_all, fields(device_id = %self.device_id))]
    pub async fn flush(&self) -> Result<Option<PersistedRecord>, StorageError> {
        let mut state = self.state.lock().await;
        let Some(sample) = state.pending.get() else {
            debug!("nothing to flush");
            return Ok(None);
        };
        let record = self.storage.save(sample).await?;
        state.pending.clear();
        drop(state);
        info!(id = %record.id, "flushed the pending sample");
        Ok(Some(record))
    }
}
