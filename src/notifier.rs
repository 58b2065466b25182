// System
use std::fmt;

// Third Party
use serde::Serialize;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

// Local
use crate::error::Error;

/// Upper bound on a single webhook call, from connecting until the response body is read.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// The body posted to the webhook: `{"text":"namespace <name> <status>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub text: String,
}

impl NotificationMessage {
    pub fn new(namespace: &str, status: impl fmt::Display) -> Self {
        Self {
            text: format!("namespace {} {}", namespace, status),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Somewhere namespace notifications can be delivered to.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), Error>;
}

/// Posts notifications as JSON to an incoming-webhook URL (Slack or anything speaking the same
/// `{"text": ...}` shape).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn try_new(url: Url) -> Result<Self, Error> {
        Self::with_timeout(url, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    /// A single POST, no retries. The response status is not inspected; whatever comes back is
    /// logged and the body drained so the connection goes back to the pool.
    async fn notify(&self, message: &NotificationMessage) -> Result<(), Error> {
        debug!(text = %message.text, "Sending webhook notification...");
        let response = self
            .client
            .post(self.url.clone())
            .json(message)
            .send()
            .await?;

        let status = response.status();
        match response.text().await {
            Ok(body) => info!(%status, %body, "Response from webhook"),
            Err(e) => warn!(%status, error = %e, "Failed to read webhook response body"),
        }
        Ok(())
    }
}
