//! Gridline core: entity model, error taxonomy, RPC message schemas, and audit texts.

pub mod audit;
pub mod error;
pub mod messages;
pub mod types;

pub use error::{ErrorKind, RpcStatus};
pub use messages::{RpcCall, RpcRequest, RpcResponse, RpcResult};
pub use types::{Entity, EntityFields, EntityId, EntityKind, ParseKindError};
