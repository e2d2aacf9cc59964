//! Webhook notifier: posts each notification as JSON to a configured URL.
//!
//! Delivery is best-effort by contract — the send runs on a spawned task
//! and a failure is logged, never surfaced to the mutation that caused it.

use odk_engine::Notifier;
use uuid::Uuid;

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, recipients: &[Uuid], subject: &str, body: &str) {
        let payload = serde_json::json!({
            "recipients": recipients,
            "subject": subject,
            "body": body,
        });
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    tracing::warn!(status = %resp.status(), "notification webhook refused")
                }
                Err(err) => tracing::warn!(%err, "notification webhook failed"),
            }
        });
    }
}
