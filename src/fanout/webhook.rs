use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::{
    fanout::{Payload, Transport},
    prelude::*,
};

/// Posts every event as JSON to the configured URL.
pub struct WebhookTransport {
    client: Client,
    url: Url,
}

impl WebhookTransport {
    #[instrument(skip_all, fields(url = %url))]
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url })
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    channel: &'a str,
    public: bool,
    payload: &'a Payload,
}

#[async_trait]
impl Transport for WebhookTransport {
    #[instrument(skip_all, fields(url = %self.url, event = event))]
    async fn publish(
        &self,
        event: &str,
        payload: &Payload,
        channel: &str,
        is_public: bool,
    ) -> Result {
        debug!("posting…");
        self.client
            .post(self.url.clone())
            .json(&Envelope { event, channel, public: is_public, payload })
            .send()
            .await
            .with_context(|| format!("failed to post the event to `{}`", self.url))?
            .error_for_status()
            .context("the webhook rejected the event")?;
        Ok(())
    }
}
