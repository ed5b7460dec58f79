use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::config::SlackConfig;
use crate::types::{Notification, NotificationKind};
use super::NotificationChannel;

/// Slack webhook notification channel
pub struct SlackChannel {
    webhook_url: String,
    channel: Option<String>,
    events: Vec<NotificationKind>,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            channel: config.channel.clone(),
            events: config.events.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn kind_color(kind: NotificationKind) -> &'static str {
        match kind {
            NotificationKind::TransferStarted | NotificationKind::SampleReceived => "#3498db",
            NotificationKind::TransferCompleted => "#2ecc71",
            NotificationKind::WarningRaised => "#f39c12",
            NotificationKind::SinkFailure => "#e74c3c",
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str { "slack" }

    fn accepts(&self, kind: NotificationKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }

    async fn send(&self, n: &Notification) -> Result<()> {
        let mut fields = vec![
            json!({ "title": "Session", "value": n.session_id.as_str(), "short": true }),
            json!({ "title": "Event", "value": n.kind.to_string(), "short": true }),
        ];
        if let Some(warning) = n.warning {
            fields.push(json!({ "title": "Warning", "value": warning.to_string(), "short": true }));
        }
        if let Some(summary) = n.summary {
            fields.push(json!({
                "title": "Samples",
                "value": format!("{}/{} accepted, {} rejected", summary.accepted, summary.expected, summary.rejected),
                "short": true,
            }));
        }

        let mut payload = json!({
            "attachments": [{
                "color": Self::kind_color(n.kind),
                "title": &n.message,
                "fields": fields,
                "ts": n.timestamp.timestamp(),
            }]
        });

        if let Some(ref ch) = self.channel {
            payload["channel"] = json!(ch);
        }

        self.client.post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
