//! RPC listener and client pool configuration.

use std::net::SocketAddr;
use std::time::Duration;

use gridline_core::EntityKind;

use super::codec::MAX_FRAME_LEN;

/// Default RPC port for a kind's domain service.
#[must_use]
pub fn default_port(kind: EntityKind) -> u16 {
    match kind {
        EntityKind::Driver => 50052,
        EntityKind::Rider => 50053,
    }
}

/// Listener configuration for one domain service.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Address to bind. Port 0 means OS-assigned.
    pub bind: SocketAddr,
    /// Largest accepted frame body.
    pub max_frame_len: usize,
    /// How long shutdown waits for in-flight calls.
    pub drain_timeout: Duration,
}

impl RpcConfig {
    /// Loopback listener on the kind's default port.
    #[must_use]
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], default_port(kind))),
            ..Self::default()
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_frame_len: MAX_FRAME_LEN,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Client pool configuration for reaching one domain service.
#[derive(Debug, Clone)]
pub struct ClientPoolConfig {
    /// `host:port` of the service.
    pub endpoint: String,
    /// Number of multiplexed connections.
    pub pool_size: usize,
    /// Deadline for one call, connect included.
    pub call_timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Largest accepted frame body.
    pub max_frame_len: usize,
}

impl ClientPoolConfig {
    /// Pool reaching `127.0.0.1` on the kind's default port.
    #[must_use]
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            endpoint: format!("127.0.0.1:{}", default_port(kind)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:50052".to_string(),
            pool_size: 4,
            call_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}
