//! In-process [`EntityClient`] that drives the domain pipeline directly.
//!
//! Used by the gateway when a domain service is embedded in the same
//! process without going through a socket, and by tests.
//!
//! Each call runs on its own task, so a caller that stops waiting (an HTTP
//! timeout, a dropped request) never cuts an operation short.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind, RpcResult, RpcStatus};
use tower::ServiceExt;
use tracing::warn;

use super::{reply, RpcError};
use crate::service::{
    build_operation_pipeline, DomainService, Operation, OperationContext, OperationPipeline,
};
use crate::traits::EntityClient;

pub struct LocalClient {
    kind: EntityKind,
    pipeline: OperationPipeline,
    next_call_id: AtomicU64,
}

impl LocalClient {
    #[must_use]
    pub fn new(service: Arc<DomainService>) -> Self {
        Self {
            kind: service.kind(),
            pipeline: build_operation_pipeline(service),
            next_call_id: AtomicU64::new(1),
        }
    }

    fn ctx(&self) -> OperationContext {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        OperationContext::new(call_id, self.kind)
    }

    async fn run(&self, op: Operation) -> RpcResult {
        let call = tokio::spawn(self.pipeline.clone().oneshot(op));
        match call.await {
            Ok(Ok(resp)) => resp.into(),
            Ok(Err(err)) => RpcResult::Error { status: err.into() },
            Err(join) => {
                warn!(kind = %self.kind, error = %join, "Local operation task failed");
                RpcResult::Error {
                    status: RpcStatus::internal(format!("{} operation failed", self.kind.title())),
                }
            }
        }
    }
}

#[async_trait]
impl EntityClient for LocalClient {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get(&self, id: EntityId) -> Result<Entity, RpcError> {
        reply::entity(self.run(Operation::Get { ctx: self.ctx(), id }).await)
    }

    async fn list(&self) -> Result<Vec<Entity>, RpcError> {
        reply::entities(self.run(Operation::List { ctx: self.ctx() }).await)
    }

    async fn create(&self, fields: EntityFields) -> Result<Entity, RpcError> {
        reply::entity(self.run(Operation::Create { ctx: self.ctx(), fields }).await)
    }

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<Entity, RpcError> {
        reply::entity(
            self.run(Operation::Update {
                ctx: self.ctx(),
                id,
                fields,
            })
            .await,
        )
    }

    async fn delete(&self, id: EntityId) -> Result<(), RpcError> {
        reply::empty(self.run(Operation::Delete { ctx: self.ctx(), id }).await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gridline_core::ErrorKind;

    use super::*;
    use crate::events::EventBus;
    use crate::service::ServiceConfig;
    use crate::storage::testing::SlowAckStore;
    use crate::storage::MemoryStore;

    fn client(kind: EntityKind) -> LocalClient {
        let service = DomainService::new(
            Arc::new(MemoryStore::new(kind)),
            Arc::new(EventBus::new()),
            ServiceConfig::default(),
        );
        LocalClient::new(Arc::new(service))
    }

    #[tokio::test]
    async fn create_get_delete() {
        let client = client(EntityKind::Rider);
        assert_eq!(client.kind(), EntityKind::Rider);

        let rider = client
            .create(EntityFields::new("Marc", "Ducati"))
            .await
            .unwrap();
        assert_eq!(client.get(rider.id.clone()).await.unwrap(), rider);

        client.delete(rider.id.clone()).await.unwrap();
        let err = client.get(rider.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Rider not found");
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let client = client(EntityKind::Driver);
        let err = client
            .update(EntityId::from("ghost"), EntityFields::new("a", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_still_commits_and_emits() {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(SlowAckStore::new(EntityKind::Driver, Duration::from_secs(10)));
        let service = DomainService::new(
            Arc::clone(&store) as _,
            Arc::clone(&bus) as _,
            ServiceConfig::default(),
        );
        let client = LocalClient::new(Arc::new(service));

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            client.create(EntityFields::new("Lando", "McLaren")),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(bus.published_count(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.stored(), 1);
        assert_eq!(bus.published_count(), 1);
    }
}
