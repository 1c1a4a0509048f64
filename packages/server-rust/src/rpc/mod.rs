//! Direct RPC between the gateway and the domain services.
//!
//! Frames are length-delimited named `MsgPack` ([`codec`]). One
//! [`RpcServer`] per kind dispatches calls into the domain pipeline; the
//! gateway reaches it through an [`RpcClientPool`] of multiplexed
//! [`RpcChannel`]s. [`LocalClient`] offers the same [`EntityClient`] surface
//! without a network hop.
//!
//! [`EntityClient`]: crate::traits::EntityClient

pub mod client;
pub mod codec;
pub mod config;
pub mod local;
pub mod pool;
pub mod server;

pub use client::RpcChannel;
pub use codec::{ClientCodec, RpcCodec, ServerCodec, MAX_FRAME_LEN};
pub use config::{ClientPoolConfig, RpcConfig};
pub use local::LocalClient;
pub use pool::RpcClientPool;
pub use server::RpcServer;

use gridline_core::{Entity, ErrorKind, RpcResult, RpcStatus};

/// Failure of a call made through an [`EntityClient`](crate::traits::EntityClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The service answered with an error status.
    #[error("{}", .0.message)]
    Status(RpcStatus),
    /// The connection could not be established or broke mid-call.
    #[error("transport error: {0}")]
    Transport(String),
    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// No response within the client call timeout.
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl RpcError {
    /// Caller-facing error kind. Anything but a service status is internal.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Status(status) => status.kind,
            Self::Transport(_) | Self::Codec(_) | Self::Timeout { .. } => ErrorKind::Internal,
        }
    }
}

impl From<RpcStatus> for RpcError {
    fn from(status: RpcStatus) -> Self {
        Self::Status(status)
    }
}

/// Typed views of an [`RpcResult`], shared by every client flavor.
pub(crate) mod reply {
    use super::{Entity, RpcError, RpcResult};

    fn unexpected(expected: &str, got: &RpcResult) -> RpcError {
        let got = match got {
            RpcResult::Entity { .. } => "ENTITY",
            RpcResult::Entities { .. } => "ENTITIES",
            RpcResult::Empty => "EMPTY",
            RpcResult::Error { .. } => "ERROR",
            RpcResult::Event { .. } => "EVENT",
        };
        RpcError::Codec(format!("expected {expected} result, got {got}"))
    }

    pub(crate) fn entity(result: RpcResult) -> Result<Entity, RpcError> {
        match result {
            RpcResult::Entity { entity } => Ok(entity),
            RpcResult::Error { status } => Err(RpcError::Status(status)),
            other => Err(unexpected("ENTITY", &other)),
        }
    }

    pub(crate) fn entities(result: RpcResult) -> Result<Vec<Entity>, RpcError> {
        match result {
            RpcResult::Entities { entities } => Ok(entities),
            RpcResult::Error { status } => Err(RpcError::Status(status)),
            other => Err(unexpected("ENTITIES", &other)),
        }
    }

    pub(crate) fn empty(result: RpcResult) -> Result<(), RpcError> {
        match result {
            RpcResult::Empty => Ok(()),
            RpcResult::Error { status } => Err(RpcError::Status(status)),
            other => Err(unexpected("EMPTY", &other)),
        }
    }
}
