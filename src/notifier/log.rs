use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Notification, NotificationKind};
use super::NotificationChannel;

/// Writes notifications to the service log
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str { "log" }

    fn accepts(&self, _kind: NotificationKind) -> bool { true }

    async fn send(&self, n: &Notification) -> Result<()> {
        match n.kind {
            NotificationKind::SampleReceived => {
                tracing::debug!(session_id = %n.session_id, "{}", n.message);
            }
            NotificationKind::WarningRaised => {
                let warning = n.warning.map(|w| w.to_string()).unwrap_or_default();
                tracing::warn!(session_id = %n.session_id, warning = %warning, "{}", n.message);
            }
            NotificationKind::SinkFailure => {
                tracing::error!(session_id = %n.session_id, "{}", n.message);
            }
            NotificationKind::TransferStarted | NotificationKind::TransferCompleted => {
                tracing::info!(session_id = %n.session_id, "{}", n.message);
            }
        }
        Ok(())
    }
}
