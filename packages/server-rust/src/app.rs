//! Process assembly for the three deployment modes of the `gridline` binary.
//!
//! - [`AllInOne`]: both domain services, the shared bus, the consumer, and the gateway
//! - [`ServiceProcess`]: one domain service behind its RPC listener
//! - [`GatewayProcess`]: the gateway alone, reaching remote services through
//!   pools and relaying their audit events
//!
//! Shutdown order is fixed: stop accepting HTTP, drain HTTP, stop the RPC
//! listeners, drain RPC, close the bus, close the stores.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gridline_core::EntityKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::events::{ConsumerHandle, EventBus, EventConsumer, EventRelay, DEFAULT_BUS_CAPACITY};
use crate::gateway::{GatewayClients, GatewayConfig, GatewayModule};
use crate::lifecycle::Lifecycle;
use crate::rpc::{ClientPoolConfig, RpcClientPool, RpcConfig, RpcServer};
use crate::service::{DomainService, ServiceConfig};
use crate::storage::{StorageConfig, StoreFactory, StorePair};
use crate::traits::{EntityClient, EventEmitter};

/// Everything the binary can configure.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub drivers_rpc: RpcConfig,
    pub riders_rpc: RpcConfig,
    pub drivers_pool: ClientPoolConfig,
    pub riders_pool: ClientPoolConfig,
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub bus_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            drivers_rpc: RpcConfig::for_kind(EntityKind::Driver),
            riders_rpc: RpcConfig::for_kind(EntityKind::Rider),
            drivers_pool: ClientPoolConfig::for_kind(EntityKind::Driver),
            riders_pool: ClientPoolConfig::for_kind(EntityKind::Rider),
            service: ServiceConfig::default(),
            storage: StorageConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn rpc(&self, kind: EntityKind) -> &RpcConfig {
        match kind {
            EntityKind::Driver => &self.drivers_rpc,
            EntityKind::Rider => &self.riders_rpc,
        }
    }

    #[must_use]
    pub fn pool(&self, kind: EntityKind) -> &ClientPoolConfig {
        match kind {
            EntityKind::Driver => &self.drivers_pool,
            EntityKind::Rider => &self.riders_pool,
        }
    }
}

fn domain_service(
    kind: EntityKind,
    stores: &StorePair,
    bus: &Arc<EventBus>,
    config: &ServiceConfig,
) -> Arc<DomainService> {
    Arc::new(DomainService::new(
        stores.get(kind),
        Arc::clone(bus) as Arc<dyn EventEmitter>,
        config.clone(),
    ))
}

async fn close_resources(bus: &EventBus, stores: &StorePair) {
    bus.close();
    if let Err(err) = stores.close().await {
        warn!(error = %err, "Store close failed");
    }
}

/// All components in one process, sharing one bus and one lifecycle.
pub struct AllInOne {
    gateway: GatewayModule,
    gateway_addr: SocketAddr,
    rpc_servers: Vec<RpcServer>,
    rpc_addrs: Vec<(EntityKind, SocketAddr)>,
    bus: Arc<EventBus>,
    stores: StorePair,
    lifecycle: Arc<Lifecycle>,
    consumer: ConsumerHandle,
    consumer_stop: watch::Sender<bool>,
}

impl AllInOne {
    /// Opens the stores and binds every listener.
    ///
    /// Each client pool is pointed at the address its RPC listener actually
    /// bound, so port 0 works for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or a listener cannot bind.
    pub async fn start(config: AppConfig) -> anyhow::Result<Self> {
        let stores = StoreFactory::new(config.storage.clone()).open()?;
        let bus = Arc::new(EventBus::with_capacity(config.bus_capacity));
        let lifecycle = Arc::new(Lifecycle::new());

        let (consumer_stop, consumer_rx) = watch::channel(false);
        let consumer = EventConsumer::new(Arc::clone(&bus)).spawn(consumer_rx);

        let (driver_server, driver_addr, drivers) =
            start_domain(EntityKind::Driver, &config, &stores, &bus, &lifecycle).await?;
        let (rider_server, rider_addr, riders) =
            start_domain(EntityKind::Rider, &config, &stores, &bus, &lifecycle).await?;

        let clients = GatewayClients { drivers, riders };
        let mut gateway = GatewayModule::new(config.gateway.clone(), clients, Arc::clone(&lifecycle))
            .with_events_counter(consumer.received_counter());
        let gateway_addr = gateway.start().await?;

        Ok(Self {
            gateway,
            gateway_addr,
            rpc_servers: vec![driver_server, rider_server],
            rpc_addrs: vec![(EntityKind::Driver, driver_addr), (EntityKind::Rider, rider_addr)],
            bus,
            stores,
            lifecycle,
            consumer,
            consumer_stop,
        })
    }

    #[must_use]
    pub fn gateway_addr(&self) -> SocketAddr {
        self.gateway_addr
    }

    #[must_use]
    pub fn rpc_addr(&self, kind: EntityKind) -> Option<SocketAddr> {
        self.rpc_addrs
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, addr)| *addr)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Serves until `shutdown` resolves, then tears everything down in order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the gateway or an RPC listener.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let (rpc_stop_tx, rpc_stop_rx) = watch::channel(false);
        let rpc_tasks: Vec<JoinHandle<anyhow::Result<()>>> = self
            .rpc_servers
            .into_iter()
            .map(|server| {
                let stop = rpc_stop_rx.clone();
                tokio::spawn(server.serve(wait_for_true(stop)))
            })
            .collect();

        let lifecycle = Arc::clone(&self.lifecycle);
        let gateway_result = self
            .gateway
            .serve(async move {
                shutdown.await;
                lifecycle.begin_drain();
            })
            .await;

        let _ = rpc_stop_tx.send(true);
        let mut result = gateway_result;
        for task in rpc_tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "RPC server failed");
                    result = result.and(Err(err));
                }
                Err(join) => warn!(error = %join, "RPC server task panicked"),
            }
        }

        close_resources(&self.bus, &self.stores).await;
        let _ = self.consumer_stop.send(true);
        self.consumer.join().await;
        info!("Shutdown complete");
        result
    }
}

/// Binds one kind's RPC listener and builds a pool pointed at it.
async fn start_domain(
    kind: EntityKind,
    config: &AppConfig,
    stores: &StorePair,
    bus: &Arc<EventBus>,
    lifecycle: &Arc<Lifecycle>,
) -> anyhow::Result<(RpcServer, SocketAddr, Arc<dyn EntityClient>)> {
    let service = domain_service(kind, stores, bus, &config.service);
    let mut server = RpcServer::new(service, config.rpc(kind).clone(), Arc::clone(lifecycle));
    let addr = server.start().await?;
    let pool_config = config.pool(kind).clone().with_endpoint(addr.to_string());
    Ok((server, addr, Arc::new(RpcClientPool::new(kind, &pool_config))))
}

async fn wait_for_true(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// One domain service with its own bus, log consumer, and RPC listener.
///
/// The listener also streams the service's audit events to any gateway that
/// subscribes.
pub struct ServiceProcess {
    kind: EntityKind,
    server: RpcServer,
    rpc_addr: SocketAddr,
    drain_timeout: Duration,
    bus: Arc<EventBus>,
    stores: StorePair,
    lifecycle: Arc<Lifecycle>,
    consumer: ConsumerHandle,
    consumer_stop: watch::Sender<bool>,
}

impl ServiceProcess {
    /// Opens the store and binds the kind's RPC listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the listener cannot bind.
    pub async fn start(kind: EntityKind, config: AppConfig) -> anyhow::Result<Self> {
        let stores = StoreFactory::new(config.storage.clone()).open()?;
        let bus = Arc::new(EventBus::with_capacity(config.bus_capacity));
        let lifecycle = Arc::new(Lifecycle::new());
        let (consumer_stop, consumer_rx) = watch::channel(false);
        let consumer = EventConsumer::for_kinds(Arc::clone(&bus), &[kind]).spawn(consumer_rx);

        let service = domain_service(kind, &stores, &bus, &config.service);
        let mut server = RpcServer::new(service, config.rpc(kind).clone(), Arc::clone(&lifecycle))
            .with_event_stream(Arc::clone(&bus));
        let rpc_addr = server.start().await?;

        Ok(Self {
            kind,
            server,
            rpc_addr,
            drain_timeout: config.rpc(kind).drain_timeout,
            bus,
            stores,
            lifecycle,
            consumer,
            consumer_stop,
        })
    }

    #[must_use]
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Serves until `shutdown` resolves, then drains and closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        self.lifecycle.set_ready();
        let drain = Arc::clone(&self.lifecycle);
        let result = self
            .server
            .serve(async move {
                shutdown.await;
                drain.begin_drain();
            })
            .await;
        self.lifecycle.wait_for_drain(self.drain_timeout).await;

        close_resources(&self.bus, &self.stores).await;
        let _ = self.consumer_stop.send(true);
        self.consumer.join().await;
        info!(kind = %self.kind, "Service stopped");
        result
    }
}

/// The gateway alone, reaching remote services through client pools.
///
/// One [`EventRelay`] per kind feeds the services' audit events onto a local
/// bus so the consumer and `/health` see them.
pub struct GatewayProcess {
    gateway: GatewayModule,
    gateway_addr: SocketAddr,
    bus: Arc<EventBus>,
    relays: Vec<JoinHandle<()>>,
    relay_stop: watch::Sender<bool>,
    consumer: ConsumerHandle,
    consumer_stop: watch::Sender<bool>,
}

impl GatewayProcess {
    /// Starts the relays and consumer and binds the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(config: AppConfig) -> anyhow::Result<Self> {
        let bus = Arc::new(EventBus::with_capacity(config.bus_capacity));
        let (consumer_stop, consumer_rx) = watch::channel(false);
        let consumer = EventConsumer::new(Arc::clone(&bus)).spawn(consumer_rx);

        let (relay_stop, relay_rx) = watch::channel(false);
        let relays = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                EventRelay::new(kind, config.pool(kind), Arc::clone(&bus)).spawn(relay_rx.clone())
            })
            .collect();

        let clients = GatewayClients {
            drivers: Arc::new(RpcClientPool::new(EntityKind::Driver, &config.drivers_pool)),
            riders: Arc::new(RpcClientPool::new(EntityKind::Rider, &config.riders_pool)),
        };
        let mut gateway =
            GatewayModule::new(config.gateway.clone(), clients, Arc::new(Lifecycle::new()))
                .with_events_counter(consumer.received_counter());
        let gateway_addr = gateway.start().await?;

        Ok(Self {
            gateway,
            gateway_addr,
            bus,
            relays,
            relay_stop,
            consumer,
            consumer_stop,
        })
    }

    #[must_use]
    pub fn gateway_addr(&self) -> SocketAddr {
        self.gateway_addr
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        self.gateway.lifecycle()
    }

    /// Serves until `shutdown` resolves, then stops the relays and consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let result = self.gateway.serve(shutdown).await;

        let _ = self.relay_stop.send(true);
        for relay in self.relays {
            if let Err(join) = relay.await {
                warn!(error = %join, "Audit relay task panicked");
            }
        }
        self.bus.close();
        let _ = self.consumer_stop.send(true);
        self.consumer.join().await;
        info!("Gateway stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_per_kind_ports() {
        let config = AppConfig::default();
        assert_eq!(config.rpc(EntityKind::Driver).bind.port(), 50052);
        assert_eq!(config.rpc(EntityKind::Rider).bind.port(), 50053);
        assert_eq!(config.pool(EntityKind::Rider).endpoint, "127.0.0.1:50053");
        assert_eq!(config.gateway.port, 3000);
    }

    #[tokio::test]
    async fn wait_for_true_returns_when_flag_flips() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_true(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
