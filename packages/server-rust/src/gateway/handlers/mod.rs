//! Gateway handlers and the shared state they extract.

pub mod graphql;
pub mod health;
pub mod rest;

pub use graphql::{build_schema, graphiql_handler, graphql_handler, GatewaySchema};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use rest::kind_routes;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use gridline_core::EntityKind;

use crate::lifecycle::Lifecycle;
use crate::traits::EntityClient;

/// One client per entity kind.
#[derive(Clone)]
pub struct GatewayClients {
    pub drivers: Arc<dyn EntityClient>,
    pub riders: Arc<dyn EntityClient>,
}

impl GatewayClients {
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> &Arc<dyn EntityClient> {
        match kind {
            EntityKind::Driver => &self.drivers,
            EntityKind::Rider => &self.riders,
        }
    }
}

/// Shared state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references so cloning is cheap.
#[derive(Clone)]
pub struct GatewayState {
    pub clients: GatewayClients,
    pub schema: GatewaySchema,
    pub lifecycle: Arc<Lifecycle>,
    /// Audit events seen by the in-process consumer, if one runs.
    pub events_consumed: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl GatewayState {
    #[must_use]
    pub fn new(clients: GatewayClients, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            schema: build_schema(clients.clone()),
            clients,
            lifecycle,
            events_consumed: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_events_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.events_consumed = counter;
        self
    }
}

/// Gateway state over in-memory stores, reached through [`LocalClient`]s.
///
/// [`LocalClient`]: crate::rpc::LocalClient
#[cfg(test)]
pub(crate) fn test_state() -> GatewayState {
    use crate::events::EventBus;
    use crate::rpc::LocalClient;
    use crate::service::{DomainService, ServiceConfig};
    use crate::storage::MemoryStore;

    let bus = Arc::new(EventBus::new());
    let client = |kind| -> Arc<dyn EntityClient> {
        let service = DomainService::new(
            Arc::new(MemoryStore::new(kind)),
            bus.clone(),
            ServiceConfig::default(),
        );
        Arc::new(LocalClient::new(Arc::new(service)))
    };
    let clients = GatewayClients {
        drivers: client(EntityKind::Driver),
        riders: client(EntityKind::Rider),
    };
    GatewayState::new(clients, Arc::new(Lifecycle::new()))
}
