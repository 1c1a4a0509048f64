use async_trait::async_trait;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};

use crate::events::EmitError;
use crate::rpc::RpcError;
use crate::storage::StoreError;

/// Per-kind persistence access against a document store.
///
/// Implementations: in-memory (`DashMap`), redb (embedded document store).
/// A missing id is a normal outcome and is reported as `Ok(None)`; only
/// connectivity or engine faults are errors.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// The entity kind this store holds. Stores never mix kinds.
    fn kind(&self) -> EntityKind;

    /// Load a single entity by id.
    async fn get_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Load every entity, in store-native order.
    async fn list_all(&self) -> Result<Vec<Entity>, StoreError>;

    /// Persist a new entity. The store assigns the id.
    async fn insert(&self, fields: EntityFields) -> Result<Entity, StoreError>;

    /// Overwrite both fields of an existing entity. Returns the updated entity.
    async fn update_by_id(
        &self,
        id: &EntityId,
        fields: EntityFields,
    ) -> Result<Option<Entity>, StoreError>;

    /// Remove an entity, returning the removed record.
    async fn delete_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Release resources and flush pending writes.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Best-effort publisher of audit texts.
///
/// `publish` returns once the event is handed to the bus; it never waits
/// for a consumer.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn publish(&self, channel: &str, text: String) -> Result<(), EmitError>;
}

/// The five canonical operations of one entity kind, as seen by the gateway.
///
/// Implementations: the pooled RPC client and an in-process client that
/// drives the domain pipeline directly.
#[async_trait]
pub trait EntityClient: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn get(&self, id: EntityId) -> Result<Entity, RpcError>;

    async fn list(&self) -> Result<Vec<Entity>, RpcError>;

    async fn create(&self, fields: EntityFields) -> Result<Entity, RpcError>;

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<Entity, RpcError>;

    async fn delete(&self, id: EntityId) -> Result<(), RpcError>;
}
