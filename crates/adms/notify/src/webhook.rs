//! HTTP webhook delivery.

use color_eyre::eyre::WrapErr as _;

use adms_core::{SessionEvent, SessionEventKind};

use crate::Notifier;

/// JSON body posted to the webhook.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Person id within its kind.
    pub person_id: i64,
    /// `student` or `staff`.
    pub person_kind: &'static str,
    /// Owning tenant.
    pub tenant_id: i64,
    /// `checkin` or `checkout`.
    pub kind: SessionEventKind,
    /// Check-in instant.
    pub checkin_time: chrono::DateTime<chrono::Utc>,
    /// Check-out instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Session length in minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

impl From<&SessionEvent> for WebhookPayload {
    fn from(event: &SessionEvent) -> Self {
        Self {
            person_id: event.person.id(),
            person_kind: event.person.kind().as_str(),
            tenant_id: event.tenant_id,
            kind: event.kind,
            checkin_time: event.checkin_time,
            checkout_time: event.checkout_time,
            duration_minutes: event.duration_minutes,
        }
    }
}

/// Posts each event as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier with a request timeout.
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> color_eyre::eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build webhook client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()> {
        let payload = WebhookPayload::from(event);

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .wrap_err("webhook request failed")?
            .error_for_status()
            .wrap_err("webhook rejected event")?;

        tracing::debug!(url = %self.url, person = %event.person, "webhook delivered");
        Ok(())
    }
}
