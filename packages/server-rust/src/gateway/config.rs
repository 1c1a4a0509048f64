//! Gateway configuration.

use std::time::Duration;

/// HTTP listener configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
