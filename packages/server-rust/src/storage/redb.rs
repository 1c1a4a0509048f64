//! Persistent [`EntityStore`] on an embedded redb database.
//!
//! One database file per process, shared by both kinds. Each kind owns a
//! separate table named after its collection, so identifier spaces never
//! overlap. Records hold `name` and `team` as named `MsgPack`; the id is
//! the table key. All redb calls are blocking and run on the blocking pool.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};
use redb::{Database, ReadableTable, TableDefinition};

use super::StoreError;
use crate::traits::EntityStore;

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

fn table_for(kind: EntityKind) -> RecordTable {
    TableDefinition::new(kind.collection())
}

fn unavailable(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Unavailable(err.into().to_string())
}

fn encode_fields(fields: &EntityFields) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(fields).map_err(|e| StoreError::Unavailable(e.to_string()))
}

fn decode_entity(key: &str, bytes: &[u8]) -> Result<Entity, StoreError> {
    let fields: EntityFields = rmp_serde::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        id: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Entity::new(EntityId::from(key), fields))
}

/// redb-backed store for one entity kind.
pub struct RedbStore {
    kind: EntityKind,
    db: Arc<Database>,
    closed: AtomicBool,
}

impl RedbStore {
    /// Opens (or creates) the database file and makes sure every kind's table
    /// exists, so read transactions never see a missing table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// the tables cannot be created.
    pub fn open_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StoreError> {
        let db = Database::create(path).map_err(unavailable)?;
        let txn = db.begin_write().map_err(unavailable)?;
        for kind in EntityKind::ALL {
            txn.open_table(table_for(kind)).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;
        Ok(Arc::new(db))
    }

    #[must_use]
    pub fn new(db: Arc<Database>, kind: EntityKind) -> Self {
        Self {
            kind,
            db,
            closed: AtomicBool::new(false),
        }
    }

    /// Runs a blocking closure against the database on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, RecordTable) -> Result<T, StoreError> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let db = Arc::clone(&self.db);
        let table = table_for(self.kind);
        tokio::task::spawn_blocking(move || f(&db, table))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl EntityStore for RedbStore {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let key = id.as_str().to_string();
        self.blocking(move |db, def| {
            let txn = db.begin_read().map_err(unavailable)?;
            let table = txn.open_table(def).map_err(unavailable)?;
            let found = table.get(key.as_str()).map_err(unavailable)?;
            found
                .map(|guard| decode_entity(&key, guard.value()))
                .transpose()
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Entity>, StoreError> {
        self.blocking(|db, def| {
            let txn = db.begin_read().map_err(unavailable)?;
            let table = txn.open_table(def).map_err(unavailable)?;
            let mut entities = Vec::new();
            for row in table.iter().map_err(unavailable)? {
                let (key, value) = row.map_err(unavailable)?;
                entities.push(decode_entity(key.value(), value.value())?);
            }
            Ok(entities)
        })
        .await
    }

    async fn insert(&self, fields: EntityFields) -> Result<Entity, StoreError> {
        self.blocking(move |db, def| {
            let entity = Entity::new(EntityId::generate(), fields);
            let bytes = encode_fields(&entity.fields())?;
            let txn = db.begin_write().map_err(unavailable)?;
            {
                let mut table = txn.open_table(def).map_err(unavailable)?;
                table
                    .insert(entity.id.as_str(), bytes.as_slice())
                    .map_err(unavailable)?;
            }
            txn.commit().map_err(unavailable)?;
            Ok(entity)
        })
        .await
    }

    async fn update_by_id(
        &self,
        id: &EntityId,
        fields: EntityFields,
    ) -> Result<Option<Entity>, StoreError> {
        let id = id.clone();
        self.blocking(move |db, def| {
            let bytes = encode_fields(&fields)?;
            let txn = db.begin_write().map_err(unavailable)?;
            let existed = {
                let mut table = txn.open_table(def).map_err(unavailable)?;
                let existed = table.get(id.as_str()).map_err(unavailable)?.is_some();
                if existed {
                    table
                        .insert(id.as_str(), bytes.as_slice())
                        .map_err(unavailable)?;
                }
                existed
            };
            if !existed {
                txn.abort().map_err(unavailable)?;
                return Ok(None);
            }
            txn.commit().map_err(unavailable)?;
            Ok(Some(Entity::new(id, fields)))
        })
        .await
    }

    async fn delete_by_id(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let key = id.as_str().to_string();
        self.blocking(move |db, def| {
            let txn = db.begin_write().map_err(unavailable)?;
            let removed: Option<Vec<u8>> = {
                let mut table = txn.open_table(def).map_err(unavailable)?;
                let removed = table
                    .remove(key.as_str())
                    .map_err(unavailable)?
                    .map(|guard| guard.value().to_vec());
                removed
            };
            txn.commit().map_err(unavailable)?;
            removed
                .map(|bytes| decode_entity(&key, &bytes))
                .transpose()
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
