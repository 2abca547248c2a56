//! Test doubles for the external collaborators.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    core::{DeviceId, PersistedRecord, Sample},
    error::{ReadError, StorageError},
    fanout::{Payload, Transport},
    prelude::*,
    reader::{Connect, Reader},
    storage::{InMemoryStorage, Storage},
};

/// Hardware that replays scripted readings and counts the calls.
#[derive(Clone, Default)]
pub struct ScriptedHardware(Arc<Mutex<Script>>);

#[derive(Default)]
struct Script {
    readings: VecDeque<Option<Sample>>,
    gate: Option<Arc<Notify>>,
    is_absent: bool,
    n_connects: usize,
    n_reads: usize,
}

impl ScriptedHardware {
    pub fn push(&self, sample: Sample) {
        self.0.lock().unwrap().readings.push_back(Some(sample));
    }

    pub fn push_failure(&self) {
        self.0.lock().unwrap().readings.push_back(None);
    }

    /// Make every read wait for a [`Notify::notify_one`] on the returned gate.
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.0.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn set_absent(&self, is_absent: bool) {
        self.0.lock().unwrap().is_absent = is_absent;
    }

    pub fn n_connects(&self) -> usize {
        self.0.lock().unwrap().n_connects
    }

    pub fn n_reads(&self) -> usize {
        self.0.lock().unwrap().n_reads
    }
}

#[async_trait]
impl Connect for ScriptedHardware {
    async fn connect(&self, _device_id: &DeviceId) -> Result<Box<dyn Reader>, ReadError> {
        let mut script = self.0.lock().unwrap();
        if script.is_absent {
            return Err(ReadError::Unavailable(anyhow::anyhow!("the meter is absent")));
        }
        script.n_connects += 1;
        drop(script);
        Ok(Box::new(ScriptedReader(self.clone())))
    }
}

struct ScriptedReader(ScriptedHardware);

#[async_trait]
impl Reader for ScriptedReader {
    async fn read(&mut self) -> Result<Sample, ReadError> {
        let gate = { self.0.0.lock().unwrap().gate.clone() };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut script = self.0.0.lock().unwrap();
        script.n_reads += 1;
        match script.readings.pop_front() {
            Some(Some(sample)) => Ok(sample),
            Some(None) => Err(ReadError::Failure(anyhow::anyhow!("scripted failure"))),
            None => Err(ReadError::Failure(anyhow::anyhow!("the script is exhausted"))),
        }
    }
}

/// In-memory storage that starts failing on demand.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: InMemoryStorage,
    saves_left: Mutex<Option<usize>>,
    is_fetch_failing: AtomicBool,
}

impl FlakyStorage {
    /// Let the specified number of saves through, and fail the rest.
    pub fn fail_saves_after(&self, n_saves: usize) {
        *self.saves_left.lock().unwrap() = Some(n_saves);
    }

    pub fn heal(&self) {
        *self.saves_left.lock().unwrap() = None;
        self.is_fetch_failing.store(false, Ordering::Relaxed);
    }

    pub fn fail_fetches(&self) {
        self.is_fetch_failing.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn save(&self, sample: &Sample) -> Result<PersistedRecord, StorageError> {
        {
            let mut saves_left = self.saves_left.lock().unwrap();
            match saves_left.as_mut() {
                Some(0) => return Err(StorageError(anyhow::anyhow!("disk is full"))),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.save(sample).await
    }

    async fn get_last_saved(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<PersistedRecord>, StorageError> {
        if self.is_fetch_failing.load(Ordering::Relaxed) {
            return Err(StorageError(anyhow::anyhow!("connection reset")));
        }
        self.inner.get_last_saved(device_id).await
    }
}

#[derive(Clone, Debug)]
pub struct PublishedEvent {
    pub event: String,
    pub channel: String,
    pub is_public: bool,
    pub payload: Payload,
}

/// Transport that remembers everything it published.
#[derive(Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<PublishedEvent>>,
    is_failing: AtomicBool,
}

impl RecordingTransport {
    pub fn fail(&self) {
        self.is_failing.store(true, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(
        &self,
        event: &str,
        payload: &Payload,
        channel: &str,
        is_public: bool,
    ) -> Result {
        ensure!(!self.is_failing.load(Ordering::Relaxed), "the broker is down");
        self.events.lock().unwrap().push(PublishedEvent {
            event: event.to_owned(),
            channel: channel.to_owned(),
            is_public,
            payload: payload.clone(),
        });
        Ok(())
    }
}
