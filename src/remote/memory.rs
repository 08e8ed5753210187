//! In-process remote service
//!
//! Tables live in memory and the whole service can be switched offline,
//! which makes fail-over behaviour reproducible without a network.

use super::RemoteService;
use crate::error::{Error, Result};
use crate::query::{Filter, Query};
use crate::storage::record::{Fields, Record};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Remote service backed by in-memory tables
#[derive(Debug)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    online: AtomicBool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate a network outage (or its end)
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Put rows straight into a table, bypassing the online switch
    pub fn seed(&self, table: &str, records: Vec<Record>) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(records);
    }

    /// Current rows of a table, bypassing the online switch
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::remote("connection refused"))
        }
    }
}

fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|f| f.matches(record))
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>> {
        self.check_online()?;
        Ok(query.apply(self.rows(table)))
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<Vec<Record>> {
        self.check_online()?;
        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();

        for record in records {
            if rows.iter().any(|r| r.id == record.id) {
                return Err(Error::remote(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                )));
            }
        }

        rows.extend(records.iter().cloned());
        Ok(records.to_vec())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Fields) -> Result<Vec<Record>> {
        self.check_online()?;
        let mut tables = self.tables.lock();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| matches_all(filters, r)) {
            for (key, value) in patch {
                row.fields.insert(key.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        self.check_online()?;
        let mut tables = self.tables.lock();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let (deleted, kept): (Vec<_>, Vec<_>) =
            rows.drain(..).partition(|r| matches_all(filters, r));
        *rows = kept;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;

    fn row(id: &str, sno: i64) -> Record {
        let mut record = Record::new(id);
        record.sno = Some(sno);
        record
    }

    #[tokio::test]
    async fn test_select_max_sno() {
        let remote = MemoryRemote::new();
        remote.seed("labs", vec![row("a", 4), row("b", 10), row("c", 2)]);

        let query = Query::new().order_by("Sno", Direction::Desc).limit(1);
        let top = remote.select("labs", &query).await.unwrap();
        assert_eq!(top[0].sno, Some(10));
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let remote = MemoryRemote::new();
        remote.set_online(false);

        let err = remote.select("labs", &Query::new()).await.unwrap_err();
        assert!(err.is_remote());
        assert!(remote.insert("labs", &[row("a", 1)]).await.is_err());
        assert!(remote.rows("labs").is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_by_id() {
        let remote = MemoryRemote::new();
        remote.insert("labs", &[row("a", 1), row("b", 2)]).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("test".into(), "CBC".into());
        let updated = remote
            .update("labs", &[Filter::eq("id", "a")], &patch)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].get("test").and_then(|v| v.as_str()), Some("CBC"));

        let deleted = remote.delete("labs", &[Filter::eq("id", "b")]).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(remote.rows("labs").len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let remote = MemoryRemote::new();
        remote.insert("labs", &[row("a", 1)]).await.unwrap();
        assert!(remote.insert("labs", &[row("a", 2)]).await.is_err());
    }
}
