//! Log Bus (§4.3, §9): process-wide publish/subscribe of structured log
//! events keyed by scan id.
//!
//! Modeled as a registry `scanId -> [Subscription]`; writers publish under
//! a short-held lock on the registry, reads happen only on per-subscription
//! queues. Overflow closes the subscription with a terminal `error` event
//! rather than blocking the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Per-subscriber bounded queue capacity (§4.3 Contract).
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogPhase {
    Static,
    Dynamic,
    Crawl,
    Auth,
    Score,
}

/// A single structured progress event (§4.3 Event shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub scan_id: Uuid,
    pub timestamp_iso: String,
    pub level: LogLevel,
    pub message: String,
    pub phase: Option<LogPhase>,
    pub metadata: Option<serde_json::Value>,
}

impl LogEvent {
    pub fn new(scan_id: Uuid, level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            scan_id,
            timestamp_iso: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            phase: None,
            metadata: None,
        }
    }

    pub fn with_phase(mut self, phase: LogPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn terminal_overflow(scan_id: Uuid) -> Self {
        LogEvent::new(scan_id, LogLevel::Error, "log overflow")
    }
}

/// A live subscription to a single scan's events. Completes (yields `None`
/// from `recv`) when the scan terminates or the subscriber closes.
pub struct Subscription {
    scan_id: Uuid,
    rx: broadcast::Receiver<LogEvent>,
}

impl Subscription {
    /// Awaits the next event. Returns `None` once the channel is closed
    /// (scan terminated and the sender side was dropped) or lagged past
    /// the overflow bound, in which case a terminal overflow event is
    /// synthesised and further calls return `None`.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(scan_id = %self.scan_id, skipped, "log bus subscriber lagged, closing with overflow event");
                Some(LogEvent::terminal_overflow(self.scan_id))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

struct Channel {
    sender: broadcast::Sender<LogEvent>,
}

/// Process-wide pub/sub registry. Cloneable; internally `Arc`-backed, so
/// every clone shares the same channel table — typed [`LogEvent`]s over
/// arbitrarily many independent per-scan subscribers.
#[derive(Clone)]
pub struct LogBus {
    channels: Arc<RwLock<HashMap<Uuid, Channel>>>,
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBus {
    pub fn new() -> Self {
        LogBus {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates (or reuses) the channel for `scan_id`. Called by the
    /// orchestrator before a scan transitions to RUNNING.
    pub async fn create_channel(&self, scan_id: Uuid) {
        let mut channels = self.channels.write().await;
        channels.entry(scan_id).or_insert_with(|| Channel {
            sender: broadcast::channel(SUBSCRIBER_QUEUE_CAPACITY).0,
        });
    }

    /// Subscribes to `scan_id`'s events. Late subscribers only see
    /// subsequent events (§4.3 Contract).
    pub async fn subscribe(&self, scan_id: Uuid) -> Option<Subscription> {
        let channels = self.channels.read().await;
        channels.get(&scan_id).map(|c| Subscription {
            scan_id,
            rx: c.sender.subscribe(),
        })
    }

    /// Publishes an event to all current subscribers of `event.scan_id`.
    /// Non-blocking: `broadcast::Sender::send` never awaits; a subscriber
    /// that falls more than [`SUBSCRIBER_QUEUE_CAPACITY`] events behind
    /// observes a `Lagged` error on its next `recv`, which [`Subscription`]
    /// turns into a terminal overflow event.
    pub async fn publish(&self, event: LogEvent) {
        let channels = self.channels.read().await;
        if let Some(channel) = channels.get(&event.scan_id) {
            // No subscribers is not an error: broadcast::Sender::send fails
            // with SendError when the receiver count is zero, which is the
            // common case between scan creation and the first WS client.
            let _ = channel.sender.send(event);
        }
    }

    /// Removes the channel for a terminated scan. Existing `Subscription`s
    /// keep their receiver and complete naturally once the sender drops.
    pub async fn remove_channel(&self, scan_id: Uuid) {
        let mut channels = self.channels.write().await;
        channels.remove(&scan_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_does_not_see_earlier_events() {
        let bus = LogBus::new();
        let scan_id = Uuid::new_v4();
        bus.create_channel(scan_id).await;
        bus.publish(LogEvent::new(scan_id, LogLevel::Info, "before")).await;

        let mut sub = bus.subscribe(scan_id).await.unwrap();
        bus.publish(LogEvent::new(scan_id, LogLevel::Info, "after")).await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.message, "after");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event_in_order() {
        let bus = LogBus::new();
        let scan_id = Uuid::new_v4();
        bus.create_channel(scan_id).await;
        let mut sub_a = bus.subscribe(scan_id).await.unwrap();
        let mut sub_b = bus.subscribe(scan_id).await.unwrap();

        bus.publish(LogEvent::new(scan_id, LogLevel::Info, "one")).await;
        bus.publish(LogEvent::new(scan_id, LogLevel::Info, "two")).await;

        assert_eq!(sub_a.recv().await.unwrap().message, "one");
        assert_eq!(sub_a.recv().await.unwrap().message, "two");
        assert_eq!(sub_b.recv().await.unwrap().message, "one");
        assert_eq!(sub_b.recv().await.unwrap().message, "two");
    }

    #[tokio::test]
    async fn removing_the_channel_completes_existing_subscriptions() {
        let bus = LogBus::new();
        let scan_id = Uuid::new_v4();
        bus.create_channel(scan_id).await;
        let mut sub = bus.subscribe(scan_id).await.unwrap();
        bus.remove_channel(scan_id).await;

        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_unknown_scan_returns_none() {
        let bus = LogBus::new();
        assert!(bus.subscribe(Uuid::new_v4()).await.is_none());
    }
}
