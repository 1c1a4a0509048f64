//! Protocol gateway: REST and GraphQL over axum, backed by per-kind
//! [`EntityClient`](crate::traits::EntityClient)s.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use handlers::{GatewayClients, GatewayState};
pub use module::GatewayModule;
