use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::config::WebhookConfig;
use crate::types::{Notification, NotificationKind};
use super::NotificationChannel;

/// Posts every accepted notification as JSON to a custom endpoint
pub struct WebhookChannel {
    url: String,
    headers: std::collections::HashMap<String, String>,
    events: Vec<NotificationKind>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            events: config.events.clone(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str { "webhook" }

    fn accepts(&self, kind: NotificationKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }

    async fn send(&self, n: &Notification) -> Result<()> {
        let payload = json!({
            "session_id": &n.session_id,
            "event": n.kind,
            "warning": n.warning,
            "message": &n.message,
            "summary": n.summary,
            "timestamp": n.timestamp.to_rfc3339(),
        });

        let mut req = self.client.post(&self.url).json(&payload);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        req.send().await?.error_for_status()?;
        Ok(())
    }
}
