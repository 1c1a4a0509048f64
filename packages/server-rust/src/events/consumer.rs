//! Passive audit consumer hosted by the gateway.
//!
//! Subscribes to every kind's channel and logs each message. It has no
//! effect on request outcomes and is not on the request/response path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gridline_core::EntityKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::EventBus;

/// Log-only consumer of audit events.
pub struct EventConsumer {
    bus: Arc<EventBus>,
    channels: Vec<&'static str>,
}

impl EventConsumer {
    /// A consumer for both kinds' channels.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::for_kinds(bus, &EntityKind::ALL)
    }

    #[must_use]
    pub fn for_kinds(bus: Arc<EventBus>, kinds: &[EntityKind]) -> Self {
        Self {
            bus,
            channels: kinds.iter().map(|k| k.channel()).collect(),
        }
    }

    /// Starts the consume loop on a background task.
    ///
    /// The loop ends when the bus closes or `shutdown` flips to `true`.
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> ConsumerHandle {
        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        let mut subscription = self.bus.subscribe(&self.channels);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        counter.fetch_add(1, Ordering::Relaxed);
                        info!(
                            channel = %event.channel,
                            published_at_ms = event.published_at_ms,
                            "Received message: {}",
                            event.text
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Audit consumer stopped");
        });

        ConsumerHandle { received, task }
    }
}

/// Handle to a running consumer.
pub struct ConsumerHandle {
    received: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Events consumed so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Shared counter, for reporting from other components.
    #[must_use]
    pub fn received_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.received)
    }

    /// Waits for the loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
