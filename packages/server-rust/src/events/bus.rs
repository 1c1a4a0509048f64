//! In-process broadcast event bus.
//!
//! Uses `tokio::sync::broadcast` for multi-producer, multi-consumer fan-out.
//! Publishing never waits for consumers: an event nobody listens to is
//! dropped, which is still a successful best-effort publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gridline_core::EntityKind;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{AuditEvent, EmitError, DEFAULT_BUS_CAPACITY};
use crate::traits::EventEmitter;

/// Process-scoped audit bus shared by every domain service and consumer.
pub struct EventBus {
    /// `None` once the bus has been closed; dropping the sender wakes every
    /// subscriber with `Closed`.
    sender: RwLock<Option<broadcast::Sender<AuditEvent>>>,
    published: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            published: AtomicU64::new(0),
        }
    }

    /// Subscribes to the given channels. An empty list means every channel.
    #[must_use]
    pub fn subscribe(&self, channels: &[&str]) -> Subscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // Closed bus: hand out a receiver whose sender is already gone.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        };
        debug!(?channels, "New audit subscription");
        Subscription {
            receiver,
            channels: channels.iter().map(ToString::to_string).collect(),
        }
    }

    /// Total events accepted by the bus since startup.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Hands an already-built event to every subscriber, keeping its
    /// original timestamp. Used to replay events received from another
    /// process.
    ///
    /// # Errors
    ///
    /// [`EmitError::Closed`] once the bus has been closed.
    pub fn forward(&self, event: AuditEvent) -> Result<(), EmitError> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(EmitError::Closed)?;
        self.published.fetch_add(1, Ordering::Relaxed);

        let channel = event.channel.clone();
        match sender.send(event) {
            Ok(receivers) => debug!(%channel, receivers, "Audit event published"),
            Err(_) => debug!(%channel, "Audit event dropped (no subscribers)"),
        }
        Ok(())
    }

    /// Stops accepting events. Subscribers drain what is buffered, then end.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            debug!("Audit bus closed");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[async_trait]
impl EventEmitter for EventBus {
    async fn publish(&self, channel: &str, text: String) -> Result<(), EmitError> {
        self.forward(AuditEvent {
            channel: channel.to_string(),
            text,
            kind: EntityKind::from_channel(channel),
            published_at_ms: now_millis(),
        })
    }
}

/// A subscription handle filtering the bus down to a set of channels.
pub struct Subscription {
    receiver: broadcast::Receiver<AuditEvent>,
    channels: Vec<String>,
}

impl Subscription {
    fn accepts(&self, event: &AuditEvent) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| *c == event.channel)
    }

    /// Receives the next event on a subscribed channel.
    ///
    /// Returns `None` once the bus is closed and the buffer is drained.
    /// Lagging consumers skip the overwritten events and keep going.
    pub async fn recv(&mut self) -> Option<AuditEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Audit subscriber lagged, events dropped");
                }
            }
        }
    }

    /// Non-blocking receive, used by tests and drains.
    pub fn try_recv(&mut self) -> Option<AuditEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_still_succeeds() {
        let bus = EventBus::new();
        bus.publish("formula1-topic", "hello".into()).await.unwrap();
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn subscriber_only_sees_its_channels() {
        let bus = EventBus::new();
        let mut riders = bus.subscribe(&["motogp-topic"]);

        bus.publish("formula1-topic", "driver".into()).await.unwrap();
        bus.publish("motogp-topic", "rider".into()).await.unwrap();

        let event = riders.recv().await.unwrap();
        assert_eq!(event.text, "rider");
        assert_eq!(event.kind, Some(EntityKind::Rider));
        assert!(riders.try_recv().is_none());
    }

    #[tokio::test]
    async fn empty_filter_sees_everything() {
        let bus = EventBus::new();
        let mut all = bus.subscribe(&[]);
        bus.publish("formula1-topic", "a".into()).await.unwrap();
        bus.publish("elsewhere", "b".into()).await.unwrap();

        assert_eq!(all.recv().await.unwrap().text, "a");
        let other = all.recv().await.unwrap();
        assert_eq!(other.text, "b");
        assert_eq!(other.kind, None);
    }

    #[tokio::test]
    async fn close_rejects_publishes_and_ends_subscriptions() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[]);
        bus.publish("formula1-topic", "last".into()).await.unwrap();
        bus.close();

        assert!(bus.is_closed());
        assert_eq!(
            bus.publish("formula1-topic", "late".into()).await,
            Err(EmitError::Closed)
        );
        assert_eq!(sub.recv().await.unwrap().text, "last");
        assert!(sub.recv().await.is_none());
        assert!(bus.subscribe(&[]).recv().await.is_none());
    }

    #[tokio::test]
    async fn forwarded_event_keeps_its_timestamp() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&["motogp-topic"]);
        let event = AuditEvent {
            channel: "motogp-topic".into(),
            text: "Searched for Riders".into(),
            kind: Some(EntityKind::Rider),
            published_at_ms: 42,
        };

        bus.forward(event.clone()).unwrap();
        assert_eq!(sub.recv().await.unwrap(), event);
        assert_eq!(bus.published_count(), 1);

        bus.close();
        assert_eq!(bus.forward(event), Err(EmitError::Closed));
    }

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe(&[]);
        for i in 0..5 {
            bus.publish("formula1-topic", format!("e{i}")).await.unwrap();
        }
        assert_eq!(sub.recv().await.unwrap().text, "e3");
        assert_eq!(sub.recv().await.unwrap().text, "e4");
    }
}
