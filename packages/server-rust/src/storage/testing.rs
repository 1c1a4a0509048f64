//! Store doubles for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};

use super::{MemoryStore, StoreError};
use crate::traits::EntityStore;

/// Memory store whose inserts commit, then stall before answering.
pub(crate) struct SlowAckStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowAckStore {
    pub(crate) fn new(kind: EntityKind, delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(kind),
            delay,
        }
    }

    /// Entities committed so far, acknowledged or not.
    pub(crate) fn stored(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl EntityStore for SlowAckStore {
    fn kind(&self) -> EntityKind {
        self.inner.kind()
    }

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn list_all(&self) -> Result<Vec<Entity>, StoreError> {
        self.inner.list_all().await
    }

    async fn insert(&self, fields: EntityFields) -> Result<Entity, StoreError> {
        let entity = self.inner.insert(fields).await?;
        tokio::time::sleep(self.delay).await;
        Ok(entity)
    }

    async fn update_by_id(
        &self,
        id: &EntityId,
        fields: EntityFields,
    ) -> Result<Option<Entity>, StoreError> {
        self.inner.update_by_id(id, fields).await
    }

    async fn delete_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.inner.delete_by_id(id).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}
