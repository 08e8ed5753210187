//! Remote Entity Service adapters
//!
//! The hosted relational service is the primary store when it is reachable.
//! It is consumed only through the generic per-table operations of
//! [`RemoteService`]; every failure is reported as `RemoteUnavailable` so
//! the repository can fall back to the local store.

mod memory;
mod rest;

pub use memory::MemoryRemote;
pub use rest::RestRemote;

use crate::error::{Error, Result};
use crate::query::{Filter, Query};
use crate::storage::record::{Fields, Record};
use async_trait::async_trait;

/// Generic table operations of the hosted relational service
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Rows matching the query
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>>;

    /// Insert rows, returning them as stored
    async fn insert(&self, table: &str, records: &[Record]) -> Result<Vec<Record>>;

    /// Apply `patch` to every row matching `filters`, returning the updated rows
    async fn update(&self, table: &str, filters: &[Filter], patch: &Fields) -> Result<Vec<Record>>;

    /// Delete every row matching `filters`, returning the deleted rows
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>>;
}

/// Stand-in used when no remote is configured; every call is unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

const OFFLINE: &str = "no remote service configured";

#[async_trait]
impl RemoteService for Offline {
    async fn select(&self, _table: &str, _query: &Query) -> Result<Vec<Record>> {
        Err(Error::remote(OFFLINE))
    }

    async fn insert(&self, _table: &str, _records: &[Record]) -> Result<Vec<Record>> {
        Err(Error::remote(OFFLINE))
    }

    async fn update(&self, _table: &str, _filters: &[Filter], _patch: &Fields) -> Result<Vec<Record>> {
        Err(Error::remote(OFFLINE))
    }

    async fn delete(&self, _table: &str, _filters: &[Filter]) -> Result<Vec<Record>> {
        Err(Error::remote(OFFLINE))
    }
}
