//! Factory for the per-kind store pair.
//!
//! [`StoreFactory`] is the dependency injection point for persistence: it
//! opens the backing store once and hands out one [`EntityStore`] per kind,
//! all sharing the same process-scoped handle.

use std::path::PathBuf;
use std::sync::Arc;

use gridline_core::EntityKind;

use super::memory::MemoryStore;
use super::StoreError;
use crate::traits::EntityStore;

/// Which document store backs the domain services.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageConfig {
    /// Volatile in-memory maps. Data is lost on exit.
    #[default]
    Memory,
    /// Embedded redb database file shared by both kinds.
    Redb { path: PathBuf },
}

/// One store per entity kind.
#[derive(Clone)]
pub struct StorePair {
    pub drivers: Arc<dyn EntityStore>,
    pub riders: Arc<dyn EntityStore>,
}

impl StorePair {
    /// Returns the store holding the given kind.
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Arc<dyn EntityStore> {
        match kind {
            EntityKind::Driver => Arc::clone(&self.drivers),
            EntityKind::Rider => Arc::clone(&self.riders),
        }
    }

    /// Closes both stores, reporting the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised by either store's `close()`.
    pub async fn close(&self) -> Result<(), StoreError> {
        let drivers = self.drivers.close().await;
        let riders = self.riders.close().await;
        drivers.and(riders)
    }
}

/// Builds [`StorePair`]s from a [`StorageConfig`].
pub struct StoreFactory {
    config: StorageConfig,
}

impl StoreFactory {
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Opens the configured backend and returns a store for each kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be opened,
    /// or if a redb path is configured but the `redb` feature is disabled.
    pub fn open(&self) -> Result<StorePair, StoreError> {
        match &self.config {
            StorageConfig::Memory => Ok(StorePair {
                drivers: Arc::new(MemoryStore::new(EntityKind::Driver)),
                riders: Arc::new(MemoryStore::new(EntityKind::Rider)),
            }),
            StorageConfig::Redb { path } => Self::open_redb(path),
        }
    }

    #[cfg(feature = "redb")]
    fn open_redb(path: &std::path::Path) -> Result<StorePair, StoreError> {
        use super::redb::RedbStore;

        tracing::info!(path = %path.display(), "Opening redb document store");
        let db = RedbStore::open_database(path)?;
        Ok(StorePair {
            drivers: Arc::new(RedbStore::new(Arc::clone(&db), EntityKind::Driver)),
            riders: Arc::new(RedbStore::new(db, EntityKind::Rider)),
        })
    }

    #[cfg(not(feature = "redb"))]
    fn open_redb(path: &std::path::Path) -> Result<StorePair, StoreError> {
        Err(StoreError::Unavailable(format!(
            "redb support not compiled in (requested {})",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use gridline_core::EntityFields;

    use super::*;

    #[test]
    fn default_config_is_memory() {
        assert_eq!(StorageConfig::default(), StorageConfig::Memory);
    }

    #[tokio::test]
    async fn memory_pair_has_independent_stores() {
        let pair = StoreFactory::new(StorageConfig::Memory).open().unwrap();
        assert_eq!(pair.get(EntityKind::Driver).kind(), EntityKind::Driver);
        assert_eq!(pair.get(EntityKind::Rider).kind(), EntityKind::Rider);

        let driver = pair
            .drivers
            .insert(EntityFields::new("Max", "RedBull"))
            .await
            .unwrap();
        assert_eq!(pair.riders.get_by_id(&driver.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_closes_both() {
        let pair = StoreFactory::new(StorageConfig::Memory).open().unwrap();
        pair.close().await.unwrap();
        assert!(pair.drivers.list_all().await.is_err());
        assert!(pair.riders.list_all().await.is_err());
    }

    #[cfg(feature = "redb")]
    #[tokio::test]
    async fn redb_pair_opens_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let pair = StoreFactory::new(StorageConfig::Redb {
            path: dir.path().join("data.redb"),
        })
        .open()
        .unwrap();
        assert!(pair.riders.list_all().await.unwrap().is_empty());
    }
}
