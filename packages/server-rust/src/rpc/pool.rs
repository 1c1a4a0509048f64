//! Long-lived pool of RPC channels to one domain service.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind, RpcCall, RpcResult};

use super::client::RpcChannel;
use super::config::ClientPoolConfig;
use super::{reply, RpcError};
use crate::traits::EntityClient;

/// Round-robin pool of multiplexed channels.
///
/// Built once at gateway startup and shared by every request handler.
/// Channels connect lazily, so building a pool never blocks on the network.
pub struct RpcClientPool {
    kind: EntityKind,
    channels: Vec<RpcChannel>,
    next: AtomicUsize,
}

impl RpcClientPool {
    #[must_use]
    pub fn new(kind: EntityKind, config: &ClientPoolConfig) -> Self {
        let size = config.pool_size.max(1);
        tracing::debug!(%kind, endpoint = %config.endpoint, size, "RPC client pool created");
        Self {
            kind,
            channels: (0..size).map(|_| RpcChannel::new(config)).collect(),
            next: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self) -> &RpcChannel {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        &self.channels[index]
    }

    async fn call(&self, call: RpcCall) -> Result<RpcResult, RpcError> {
        self.channel().call(call).await
    }
}

#[async_trait]
impl EntityClient for RpcClientPool {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get(&self, id: EntityId) -> Result<Entity, RpcError> {
        reply::entity(self.call(RpcCall::Get { id }).await?)
    }

    async fn list(&self) -> Result<Vec<Entity>, RpcError> {
        reply::entities(self.call(RpcCall::Search).await?)
    }

    async fn create(&self, fields: EntityFields) -> Result<Entity, RpcError> {
        reply::entity(self.call(RpcCall::add(fields)).await?)
    }

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<Entity, RpcError> {
        reply::entity(self.call(RpcCall::update(id, fields)).await?)
    }

    async fn delete(&self, id: EntityId) -> Result<(), RpcError> {
        reply::empty(self.call(RpcCall::Delete { id }).await?)
    }
}
