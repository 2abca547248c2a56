mod webhook;

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use async_trait::async_trait;

pub use self::webhook::WebhookTransport;
use crate::{core::PersistedRecord, prelude::*};

/// Flat key-value event payload.
pub type Payload = BTreeMap<&'static str, String>;

/// Outbound publish-subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, event: &str, payload: &Payload, channel: &str, is_public: bool)
    -> Result;
}

/// Emits the events to the log, for setups without any subscribers.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn publish(
        &self,
        event: &str,
        payload: &Payload,
        channel: &str,
        is_public: bool,
    ) -> Result {
        info!(event, channel, is_public, ?payload, "published");
        Ok(())
    }
}

/// In-process subscriber to the persisted consumption changes of a device.
pub type Listener = Box<dyn Fn(&PersistedRecord) -> Result + Send + Sync>;

/// Delivers consumption changes of a single device.
#[must_use]
pub struct EventFanout {
    transport: Arc<dyn Transport>,
    listeners: Vec<Listener>,
}

impl EventFanout {
    pub const EVENT: &'static str = "status_update";
    pub const CHANNEL: &'static str = "/usage";

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, listeners: Vec::new() }
    }

    pub fn register(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn n_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Publish the record and call the listeners in the registration order.
    ///
    /// Failures and panics are logged and otherwise ignored: the record is already persisted.
    #[instrument(skip_all, fields(device_id = %record.sample.device_id, id = %record.id))]
    pub async fn notify(&self, record: &PersistedRecord) {
        // Meter values only, hence public.
        let payload = record.sample.to_payload();
        let published = self.transport.publish(Self::EVENT, &payload, Self::CHANNEL, true).await;
        if let Err(error) = published {
            warn!("failed to publish the event: {error:#}");
        }
        for (index, listener) in self.listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(record))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(index, "listener failed: {error:#}"),
                Err(_) => warn!(index, "listener panicked"),
            }
        }
    }
}
