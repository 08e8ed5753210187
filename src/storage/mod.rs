//! Local storage layer for clinicstore
//!
//! The local store is the durability floor: every write lands here even
//! when the remote service is unreachable. It only knows two operations,
//! load a whole collection and replace a whole collection.

pub mod collection;
pub mod record;
pub mod retry;

use crate::Result;
use async_trait::async_trait;
use record::Record;

/// A store of named collections, each read and written as a unit
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Every record in the collection, or an empty set if it was never created.
    ///
    /// Fails with `StoreCorrupt` when the collection exists but cannot be parsed.
    async fn load_all(&self, collection: &str) -> Result<Vec<Record>>;

    /// Atomically replace the whole collection.
    ///
    /// Fails with `WriteLocked` if another writer holds the collection.
    async fn replace_all(&self, collection: &str, records: &[Record]) -> Result<()>;
}
