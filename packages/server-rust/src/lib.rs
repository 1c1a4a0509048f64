//! Gridline server: per-kind domain services behind a direct RPC boundary,
//! a REST/GraphQL gateway, and an in-process audit event bus.

pub mod app;
pub mod events;
pub mod gateway;
pub mod lifecycle;
pub mod rpc;
pub mod service;
pub mod storage;
pub mod traits;

pub use app::{AllInOne, AppConfig};
pub use traits::{EntityClient, EntityStore, EventEmitter};
