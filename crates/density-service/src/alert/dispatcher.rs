use anyhow::{Context, Result};
use async_trait::async_trait;
use common::density::AlertPayload;
use reqwest::Url;
use std::time::Duration;
use tracing::info;

/// Destination for crowd alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, payload: &AlertPayload) -> Result<()>;

    /// Human-readable destination, reported by the API
    fn target(&self) -> String;
}

/// Posts alert payloads as JSON to a webhook
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: Url,
}

impl WebhookDispatcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookDispatcher {
    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook request failed with status: {}", response.status());
        }

        info!(
            url = %self.url,
            status = %response.status(),
            alert_type = %payload.alert_type,
            "Crowd alert delivered"
        );

        Ok(())
    }

    fn target(&self) -> String {
        self.url.to_string()
    }
}
