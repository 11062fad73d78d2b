use http::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::observability::metrics::get_metrics;

pub const DEFAULT_WEBHOOK_URL: &str = "https://webhook.logentries.com";

/// Stateless delivery: one POST per message to `<base>/noformat/logs/<token>`.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: Client,
    base_url: String,
}

impl WebhookSender {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn endpoint(&self, token: &str) -> String {
        format!("{}/noformat/logs/{}", self.base_url, token)
    }

    /// Best effort: an unexpected status is logged and otherwise ignored.
    /// Only a transport failure is reported back.
    pub async fn send(&self, token: &str, message: &str) -> Result<(), DeliveryError> {
        let metrics = get_metrics().await;
        let response = self
            .client
            .post(self.endpoint(token))
            .header(CONTENT_TYPE, "application/json")
            .body(message.to_owned())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("webhook accepted message ({})", status);
            metrics.lines_delivered.with_label_values(&["webhook"]).inc();
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("unexpected webhook response status {}: {}", status, body);
        metrics
            .delivery_failures
            .with_label_values(&["webhook", "status"])
            .inc();
        Ok(())
    }
}
