//! Per-kind document store adapters.
//!
//! - [`MemoryStore`]: concurrent in-memory store backed by `DashMap`
//! - [`RedbStore`]: persistent store on an embedded redb database (feature `redb`)
//! - [`StoreFactory`]: builds the driver/rider store pair from [`StorageConfig`]

pub mod factory;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;
#[cfg(feature = "redb")]
pub mod redb;

pub use factory::{StorageConfig, StoreFactory, StorePair};
pub use memory::MemoryStore;
#[cfg(feature = "redb")]
pub use self::redb::RedbStore;

/// Store fault, distinct from a missing id (which is `Ok(None)`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached or the engine rejected the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A persisted record could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    /// The store has been closed.
    #[error("store closed")]
    Closed,
}
