//! Process lifecycle: health state and in-flight tracking for graceful drain.
//!
//! One [`Lifecycle`] is shared by every listener in a process (RPC servers
//! and the gateway). Health state is swapped lock-free through `ArcSwap`. The
//! in-flight count lives in a `watch` channel, so a drain wakes as soon as
//! the last [`InFlightGuard`] drops.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, info};

/// Health state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Initializing, not yet accepting requests.
    Starting,
    /// Fully operational.
    Ready,
    /// No new requests; in-flight requests are finishing.
    Draining,
    /// All in-flight requests completed.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates readiness and graceful shutdown across listeners.
///
/// 1. Health checks read [`health_state`](Self::health_state)
/// 2. Listeners wrap each call in an [`InFlightGuard`]
/// 3. [`begin_drain`](Self::begin_drain) moves to `Draining` and signals listeners
/// 4. [`wait_for_drain`](Self::wait_for_drain) waits for in-flight calls to finish
#[derive(Debug)]
pub struct Lifecycle {
    draining: watch::Sender<bool>,
    in_flight: Arc<watch::Sender<u64>>,
    health_state: ArcSwap<HealthState>,
}

impl Lifecycle {
    /// Creates a lifecycle in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            draining: watch::Sender::new(false),
            in_flight: Arc::new(watch::Sender::new(0)),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
        info!("Lifecycle ready");
    }

    /// Returns a receiver that flips to `true` when draining begins.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.draining.subscribe()
    }

    /// Moves to `Draining` and signals every shutdown receiver.
    pub fn begin_drain(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        self.draining.send_replace(true);
        info!(in_flight = self.in_flight_count(), "Draining");
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Whether new calls should be admitted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        matches!(self.health_state(), HealthState::Starting | HealthState::Ready)
    }

    /// Tracks one in-flight call until the guard drops, even on panic.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.send_modify(|n| *n += 1);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        *self.in_flight.borrow()
    }

    /// Waits for in-flight calls to complete, up to `timeout`.
    ///
    /// Returns `true` and moves to `Stopped` on a clean drain. Returns
    /// `false` on timeout, leaving the state at `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut counter = self.in_flight.subscribe();
        let idle = tokio::time::timeout(timeout, counter.wait_for(|n| *n == 0))
            .await
            .is_ok_and(|waited| waited.is_ok());
        if !idle {
            return false;
        }
        self.health_state.store(Arc::new(HealthState::Stopped));
        debug!("Drain complete");
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when dropped, waking drain waiters at zero.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<watch::Sender<u64>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}
