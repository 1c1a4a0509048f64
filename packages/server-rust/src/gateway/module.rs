//! Gateway module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections. The split lets the binary start the
//! domain services and the consumer between `start()` and `serve()`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use gridline_core::EntityKind;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::GatewayConfig;
use super::handlers::{
    graphiql_handler, graphql_handler, health_handler, kind_routes, liveness_handler,
    readiness_handler, GatewayClients, GatewayState,
};
use super::middleware::{track_in_flight, with_http_layers};
use crate::lifecycle::Lifecycle;

/// Owns the HTTP listener and router of the protocol gateway.
pub struct GatewayModule {
    config: GatewayConfig,
    state: GatewayState,
    listener: Option<TcpListener>,
}

impl GatewayModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: GatewayConfig, clients: GatewayClients, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            config,
            state: GatewayState::new(clients, lifecycle),
            listener: None,
        }
    }

    /// Reports events seen by an in-process consumer on `/health`.
    #[must_use]
    pub fn with_events_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.state = self.state.with_events_counter(counter);
        self
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.state.lifecycle)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health`, `GET /health/live`, `GET /health/ready`
    /// - `GET|POST /graphql` -- GraphiQL and the GraphQL endpoint
    /// - `/f1...` and `/motogp...` -- REST, see [`kind_routes`]
    pub fn build_router(&self) -> Router {
        let in_flight = axum::middleware::from_fn_with_state(
            Arc::clone(&self.state.lifecycle),
            track_in_flight,
        );

        let routes = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/graphql", get(graphiql_handler).post(graphql_handler))
            .merge(kind_routes(EntityKind::Driver))
            .merge(kind_routes(EntityKind::Rider))
            .layer(in_flight)
            .with_state(self.state.clone());
        with_http_layers(routes, &self.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound address, which carries the OS-assigned port when
    /// port 0 is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound = listener.local_addr()?;

        info!(%bound, "Gateway listener bound");

        self.listener = Some(listener);
        Ok(bound)
    }

    /// Serves HTTP until `shutdown` resolves.
    ///
    /// Marks the lifecycle ready once serving. After the shutdown signal
    /// axum stops accepting connections and finishes open requests; the
    /// module then waits up to `drain_timeout` for tracked calls.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let lifecycle = Arc::clone(&self.state.lifecycle);

        lifecycle.set_ready();
        info!("Serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        if lifecycle.is_accepting() {
            lifecycle.begin_drain();
        }
        if lifecycle.wait_for_drain(self.config.drain_timeout).await {
            info!("Gateway drained");
        } else {
            warn!("Drain timeout expired with in-flight requests remaining");
        }
        Ok(())
    }
}
