//! Audit event emission and consumption.
//!
//! Domain services publish one free-text [`AuditEvent`] per operation onto
//! their kind's channel through an [`EventEmitter`](crate::traits::EventEmitter).
//! The in-process [`EventBus`] is the process-scoped handle constructed at
//! startup; the gateway runs an [`EventConsumer`] that logs what it receives.
//! When the gateway runs apart from the services, an [`EventRelay`] per kind
//! streams the services' events onto the gateway's own bus.

pub mod bus;
pub mod consumer;
pub mod relay;

pub use bus::{EventBus, Subscription};
pub use consumer::{ConsumerHandle, EventConsumer};
pub use relay::EventRelay;

use gridline_core::EntityKind;

/// Maximum events buffered per subscriber before the slowest one lags.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A published audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Channel the record was published to.
    pub channel: String,
    /// Human-readable description of the operation or failure.
    pub text: String,
    /// Kind owning the channel, if the channel belongs to one.
    pub kind: Option<EntityKind>,
    /// Wall-clock publish time in milliseconds since the Unix epoch.
    pub published_at_ms: u64,
}

/// Failure to hand an event to the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("event bus closed")]
    Closed,
    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}
