//! In-memory [`EntityStore`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking. Every
//! operation touches a single key, so no multi-step transaction ever spans
//! the shared map.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};

use super::StoreError;
use crate::traits::EntityStore;

/// In-memory store for one entity kind.
pub struct MemoryStore {
    kind: EntityKind,
    entries: DashMap<EntityId, Entity>,
    closed: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<Entity>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }

    async fn insert(&self, fields: EntityFields) -> Result<Entity, StoreError> {
        self.ensure_open()?;
        let entity = Entity::new(EntityId::generate(), fields);
        self.entries.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn update_by_id(
        &self,
        id: &EntityId,
        fields: EntityFields,
    ) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.get_mut(id).map(|mut entry| {
            let entity = entry.value_mut();
            entity.name = fields.name;
            entity.team = fields.team;
            entity.clone()
        }))
    }

    async fn delete_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.remove(id).map(|(_, entity)| entity))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_id_and_get_returns_it() {
        let store = MemoryStore::new(EntityKind::Driver);
        let created = store
            .insert(EntityFields::new("Max", "RedBull"))
            .await
            .unwrap();

        let loaded = store.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.name, "Max");
        assert_eq!(loaded.team, "RedBull");
    }

    #[tokio::test]
    async fn missing_id_is_none_not_error() {
        let store = MemoryStore::new(EntityKind::Rider);
        let id = EntityId::from("nope");
        assert_eq!(store.get_by_id(&id).await.unwrap(), None);
        assert_eq!(
            store
                .update_by_id(&id, EntityFields::new("a", "b"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(store.delete_by_id(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_overwrites_both_fields() {
        let store = MemoryStore::new(EntityKind::Driver);
        let created = store
            .insert(EntityFields::new("Lewis", "McLaren"))
            .await
            .unwrap();

        let updated = store
            .update_by_id(&created.id, EntityFields::new("Lewis", ""))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.team, "");
    }

    #[tokio::test]
    async fn delete_returns_removed_record_once() {
        let store = MemoryStore::new(EntityKind::Driver);
        let created = store.insert(EntityFields::new("a", "b")).await.unwrap();

        assert_eq!(
            store.delete_by_id(&created.id).await.unwrap(),
            Some(created.clone())
        );
        assert_eq!(store.delete_by_id(&created.id).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_all_on_empty_store_is_empty() {
        let store = MemoryStore::new(EntityKind::Rider);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new(EntityKind::Rider);
        store.close().await.unwrap();
        assert_eq!(store.list_all().await.unwrap_err(), StoreError::Closed);
    }
}
