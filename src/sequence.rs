//! Sno reconciliation
//!
//! The next display sequence for a collection is one past the largest Sno
//! seen in either store. A remote failure counts as "no remote rows" so
//! numbering keeps advancing from local state during an outage.

use crate::error::Result;
use crate::query::{Direction, Query};
use crate::remote::RemoteService;
use crate::storage::record::{Record, SNO_FIELD};
use crate::storage::retry::RetryingStore;
use std::sync::Arc;

/// Computes the next Sno from both stores
#[derive(Clone)]
pub struct SequenceReconciler {
    remote: Arc<dyn RemoteService>,
    local: RetryingStore,
}

impl SequenceReconciler {
    pub fn new(remote: Arc<dyn RemoteService>, local: RetryingStore) -> Self {
        Self { remote, local }
    }

    /// `max(remote max, local max) + 1`, or 1 for an empty collection
    pub async fn next_sequence(&self, collection: &str) -> Result<i64> {
        let local = self.local.load_all(collection).await?;
        Ok(self.next_after(collection, &local).await)
    }

    /// Same as [`next_sequence`](Self::next_sequence) with the local
    /// collection already loaded by the caller
    pub async fn next_after(&self, collection: &str, local: &[Record]) -> i64 {
        let remote_max = self.remote_max(collection).await;
        let local_max = local_max(local);
        let next = remote_max.max(local_max) + 1;
        tracing::debug!(collection, remote_max, local_max, next, "reconciled sequence");
        next
    }

    async fn remote_max(&self, collection: &str) -> i64 {
        let query = Query::new().order_by(SNO_FIELD, Direction::Desc).limit(1);
        match self.remote.select(collection, &query).await {
            Ok(rows) => rows.iter().filter_map(|r| r.sno).max().unwrap_or(0),
            Err(err) => {
                tracing::warn!(collection, error = %err, "remote Sno lookup failed, using local only");
                0
            }
        }
    }
}

fn local_max(records: &[Record]) -> i64 {
    records.iter().filter_map(|r| r.sno).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::storage::collection::FileStore;
    use crate::storage::retry::RetryPolicy;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    fn sequenced(id: &str, sno: i64) -> Record {
        let mut record = Record::new(id);
        record.sno = Some(sno);
        record
    }

    fn setup(tmp: &TempDir) -> (Arc<MemoryRemote>, Arc<FileStore>, SequenceReconciler) {
        let remote = Arc::new(MemoryRemote::new());
        let files = Arc::new(FileStore::open(tmp.path()));
        let local = RetryingStore::new(files.clone(), RetryPolicy::default());
        let reconciler = SequenceReconciler::new(remote.clone(), local);
        (remote, files, reconciler)
    }

    #[tokio::test]
    async fn test_empty_collection_starts_at_one() {
        let tmp = TempDir::new().unwrap();
        let (_remote, _files, reconciler) = setup(&tmp);
        assert_eq!(reconciler.next_sequence("prescriptions").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remote_ahead_then_outage() {
        let tmp = TempDir::new().unwrap();
        let (remote, files, reconciler) = setup(&tmp);

        remote.seed("prescriptions", vec![sequenced("r", 10)]);
        files
            .replace_all("prescriptions", &[sequenced("l", 7)])
            .await
            .unwrap();
        assert_eq!(reconciler.next_sequence("prescriptions").await.unwrap(), 11);

        remote.set_online(false);
        files
            .replace_all("prescriptions", &[sequenced("l", 7), sequenced("m", 11)])
            .await
            .unwrap();
        assert_eq!(reconciler.next_sequence("prescriptions").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_local_ahead_of_remote() {
        let tmp = TempDir::new().unwrap();
        let (remote, files, reconciler) = setup(&tmp);

        remote.seed("labs", vec![sequenced("a", 3)]);
        files.replace_all("labs", &[sequenced("b", 5)]).await.unwrap();
        assert_eq!(reconciler.next_sequence("labs").await.unwrap(), 6);
    }
}
