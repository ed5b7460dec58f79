pub mod log;
pub mod slack;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::NotificationConfig;
use crate::types::{Notification, NotificationKind, SessionId, WarningKind};

/// Capability the ingestion service uses to report lifecycle events and
/// warnings. Delivery is best effort and must never fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Pushes notifications onto a bounded queue drained by a `NotificationManager`.
/// A full queue drops the notification instead of blocking the session.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                tracing::warn!(session_id = %n.session_id, kind = %n.kind, "Notification queue full, dropping");
            }
            Err(TrySendError::Closed(n)) => {
                tracing::debug!(session_id = %n.session_id, kind = %n.kind, "Notification queue closed");
            }
        }
    }
}

/// Discards every notification
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Trait for notification delivery channels
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Deliver a single notification
    async fn send(&self, notification: &Notification) -> Result<()>;

    /// Check if this channel wants the given kind
    fn accepts(&self, kind: NotificationKind) -> bool;
}

/// Drains the notification queue and fans out to delivery channels.
///
/// Warnings are de-duplicated per session and warning kind and rate limited.
/// Lifecycle events and sink failures always go through.
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
    dedup_map: HashMap<DeduplicationKey, DedupEntry>,
    dedup_window: Duration,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeduplicationKey {
    session_id: SessionId,
    warning: WarningKind,
}

struct DedupEntry {
    last_sent: Instant,
    count: u32,
}

struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(per_minute: u32) -> Self {
        Self {
            tokens: per_minute as f64,
            max_tokens: per_minute as f64,
            refill_rate: per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl NotificationManager {
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.log {
            channels.push(Box::new(log::LogChannel));
        }

        if let Some(ref wc) = config.webhook {
            if wc.enabled {
                channels.push(Box::new(webhook::WebhookChannel::new(wc)?));
            }
        }

        if let Some(ref sc) = config.slack {
            if sc.enabled {
                channels.push(Box::new(slack::SlackChannel::new(sc)?));
            }
        }

        tracing::info!(channels = channels.len(), "Initialized notification channels");

        Ok(Self::with_channels(
            channels,
            config.dedup_window_secs,
            config.rate_limit_per_minute,
        ))
    }

    pub fn with_channels(
        channels: Vec<Box<dyn NotificationChannel>>,
        dedup_window_secs: u64,
        rate_limit_per_minute: u32,
    ) -> Self {
        Self {
            channels,
            dedup_map: HashMap::new(),
            dedup_window: Duration::from_secs(dedup_window_secs),
            rate_limiter: RateLimiter::new(rate_limit_per_minute),
        }
    }

    pub async fn dispatch(&mut self, notification: Notification) -> Result<()> {
        if let Some(warning) = notification.warning {
            let key = DeduplicationKey {
                session_id: notification.session_id.clone(),
                warning,
            };

            if let Some(entry) = self.dedup_map.get_mut(&key) {
                if entry.last_sent.elapsed() < self.dedup_window {
                    entry.count += 1;
                    tracing::debug!(session_id = %key.session_id, warning = %warning, count = entry.count, "Warning deduplicated");
                    return Ok(());
                }
            }

            if !self.rate_limiter.try_acquire() {
                tracing::warn!(session_id = %key.session_id, warning = %warning, "Warning rate limited");
                return Ok(());
            }

            self.dedup_map.insert(key, DedupEntry {
                last_sent: Instant::now(),
                count: 1,
            });
        }

        if notification.kind == NotificationKind::TransferCompleted {
            let id = &notification.session_id;
            self.dedup_map.retain(|k, _| &k.session_id != id);
        }

        for channel in &self.channels {
            if channel.accepts(notification.kind) {
                if let Err(e) = channel.send(&notification).await {
                    tracing::error!(
                        channel = channel.name(),
                        error = %e,
                        "Failed to deliver notification"
                    );
                }
            }
        }

        Ok(())
    }

    /// Deliver queued notifications until every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<Notification>) {
        while let Some(notification) = rx.recv().await {
            if let Err(e) = self.dispatch(notification).await {
                tracing::error!(error = %e, "Notification dispatch failed");
            }
        }
        tracing::debug!("Notification queue drained");
    }
}
