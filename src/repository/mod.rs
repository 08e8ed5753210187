//! Dual-store entity repository
//!
//! Composes the remote service, the retrying local store and the sequence
//! reconciler into create/read/update/delete/search for one entity type.
//!
//! # Read path
//!
//! Remote first. On success the remote rows are returned as-is; on any
//! remote failure the whole local collection is loaded and the same query
//! is evaluated in memory. The two stores are never merged.
//!
//! # Write path
//!
//! Every write is two legs. The remote leg is attempted first and its
//! failure is only logged. The local leg always runs and its failure is the
//! operation's failure (see [`WriteDurability`]).
//!
//! Local writes read, modify and replace the full collection while holding
//! a per-collection async lock, so concurrent writers in this process never
//! lose updates or hand out the same Sno twice.

pub mod entity;

pub use entity::{DeleteGuard, EntitySpec};

use crate::error::{Error, Result};
use crate::query::{Direction, Filter, Query};
use crate::remote::RemoteService;
use crate::sequence::SequenceReconciler;
use crate::session::Session;
use crate::storage::record::{Fields, Record, Value, ID_FIELD, SNO_FIELD};
use crate::storage::retry::{RetryPolicy, RetryingStore};
use crate::storage::LocalStore;
use crate::validation::validate_record_id;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const CREATED_BY: &str = "createdBy";
const CREATED_AT: &str = "createdAt";
const UPDATED_BY: &str = "updatedBy";
const UPDATED_AT: &str = "updatedAt";

// =============================================================================
// Write durability
// =============================================================================

/// Outcome of the remote leg of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLeg {
    /// The remote service applied the write
    Ok,
    /// The remote service was reachable but had no matching row
    Missing,
    /// The remote service could not be reached or rejected the write
    Failed(String),
}

impl RemoteLeg {
    fn failed(err: &Error) -> Self {
        RemoteLeg::Failed(err.to_string())
    }
}

/// Result of a write: the record plus how the remote leg went
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport<T> {
    pub value: T,
    pub remote: RemoteLeg,
}

impl<T> WriteReport<T> {
    /// True if the remote store also holds this write
    pub fn is_mirrored(&self) -> bool {
        self.remote == RemoteLeg::Ok
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Which legs of a write must succeed for the caller to see success
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteDurability {
    /// Remote is best effort; the local write is required
    #[default]
    LocalRequired,
}

impl WriteDurability {
    /// Combine both legs into the caller-visible result
    pub fn settle<T>(
        &self,
        collection: &str,
        remote: RemoteLeg,
        local: Result<()>,
        value: T,
    ) -> Result<WriteReport<T>> {
        match self {
            WriteDurability::LocalRequired => {
                if let Err(err) = local {
                    tracing::error!(collection, error = %err, remote = ?remote, "local write failed");
                    return Err(err);
                }
                match &remote {
                    RemoteLeg::Ok => {}
                    RemoteLeg::Missing => {
                        tracing::warn!(collection, "remote row missing, local copy written only")
                    }
                    RemoteLeg::Failed(reason) => {
                        tracing::warn!(collection, reason = %reason, "remote write failed, local copy written only")
                    }
                }
                Ok(WriteReport { value, remote })
            }
        }
    }
}

// =============================================================================
// Shared stores
// =============================================================================

/// One async lock per collection name
#[derive(Default)]
struct CollectionLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionLocks {
    async fn acquire(&self, collection: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock();
            locks.entry(collection.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The two stores and the machinery shared by every repository
pub struct DualStore {
    remote: Arc<dyn RemoteService>,
    local: RetryingStore,
    sequence: SequenceReconciler,
    locks: CollectionLocks,
}

impl DualStore {
    pub fn new(remote: Arc<dyn RemoteService>, local: Arc<dyn LocalStore>, retry: RetryPolicy) -> Self {
        let local = RetryingStore::new(local, retry);
        let sequence = SequenceReconciler::new(remote.clone(), local.clone());
        Self {
            remote,
            local,
            sequence,
            locks: CollectionLocks::default(),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Remote-primary, local-fallback access to one entity type
#[derive(Clone)]
pub struct Repository {
    spec: EntitySpec,
    stores: Arc<DualStore>,
    durability: WriteDurability,
}

impl Repository {
    pub fn new(spec: EntitySpec, stores: Arc<DualStore>) -> Self {
        Self {
            spec,
            stores,
            durability: WriteDurability::default(),
        }
    }

    pub fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    fn collection(&self) -> &'static str {
        self.spec.collection
    }

    /// Create a record from caller attributes, assigning `id` and, for
    /// sequenced entities, `Sno`
    #[tracing::instrument(skip_all, fields(collection = self.spec.collection))]
    pub async fn create(&self, session: &Session, attributes: Fields) -> Result<WriteReport<Record>> {
        let collection = self.collection();
        let _guard = self.stores.locks.acquire(collection).await;
        let mut records = self.stores.local.load_all(collection).await?;

        let mut record = Record::with_attributes(Record::generate_id(), attributes);
        record
            .set(CREATED_BY, session.actor())
            .set(CREATED_AT, timestamp());
        if self.spec.sequenced {
            record.sno = Some(self.stores.sequence.next_after(collection, &records).await);
        }
        tracing::debug!(id = %record.id, sno = ?record.sno, "creating record");

        let remote = match self
            .stores
            .remote
            .insert(collection, std::slice::from_ref(&record))
            .await
        {
            Ok(_) => RemoteLeg::Ok,
            Err(err) => RemoteLeg::failed(&err),
        };

        records.push(record.clone());
        let local = self.stores.local.replace_all(collection, &records).await;
        self.durability.settle(collection, remote, local, record)
    }

    /// Fail-over read: remote rows verbatim, or the local collection
    /// filtered in memory when the remote is unavailable
    #[tracing::instrument(skip_all, fields(collection = self.spec.collection))]
    pub async fn read(&self, query: &Query) -> Result<Vec<Record>> {
        let collection = self.collection();
        match self.stores.remote.select(collection, query).await {
            Ok(rows) => Ok(rows.into_iter().map(Record::without_nulls).collect()),
            Err(err) => {
                tracing::warn!(error = %err, "remote read failed, reading local collection");
                let records = self.stores.local.load_all(collection).await?;
                Ok(query.apply(records))
            }
        }
    }

    /// Every record, in Sno order for sequenced entities
    pub async fn read_all(&self) -> Result<Vec<Record>> {
        self.read(&self.default_query()).await
    }

    /// Records whose `field` holds exactly `date` (e.g. `2024-03-01`)
    pub async fn read_by_date(&self, field: &str, date: &str) -> Result<Vec<Record>> {
        let query = self.default_query().filter(Filter::eq(field, date));
        self.read(&query).await
    }

    /// A single record by ID
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        validate_record_id(id)?;
        let query = Query::new().filter(Filter::eq(ID_FIELD, id)).limit(1);
        Ok(self.read(&query).await?.into_iter().next())
    }

    /// Replace a record's attributes wholesale.
    ///
    /// `Sno` and the creation stamps are carried over from the stored copy;
    /// every other attribute not in `attributes` is removed.
    #[tracing::instrument(skip_all, fields(collection = self.spec.collection, id = %id))]
    pub async fn update(
        &self,
        session: &Session,
        id: &str,
        attributes: Fields,
    ) -> Result<WriteReport<Record>> {
        validate_record_id(id)?;
        let collection = self.collection();
        let _guard = self.stores.locks.acquire(collection).await;
        let mut records = self.stores.local.load_all(collection).await?;
        let position = records.iter().position(|r| r.id == id);

        let by_id = [Filter::eq(ID_FIELD, id)];
        let stored_remote = self.remote_row(collection, id).await;

        let mut record = Record::with_attributes(id, attributes);
        if let Some(prior) = position.map(|i| &records[i]).or(stored_remote.as_ref()) {
            carry_over(prior, &mut record);
        }
        record
            .set(UPDATED_BY, session.actor())
            .set(UPDATED_AT, timestamp());

        // Attributes dropped by a full replace are nulled remotely, whichever
        // store still holds them
        let mut patch = record.fields.clone();
        let stale = position
            .map(|i| &records[i])
            .into_iter()
            .chain(stored_remote.as_ref());
        for prior in stale {
            for key in prior.fields.keys() {
                patch.entry(key.clone()).or_insert(Value::Null);
            }
        }

        let (remote, remote_row) = match self
            .stores
            .remote
            .update(collection, &by_id, &patch)
            .await
        {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => (RemoteLeg::Ok, Some(row.without_nulls())),
                None => (RemoteLeg::Missing, None),
            },
            Err(err) => (RemoteLeg::failed(&err), None),
        };

        match position {
            Some(i) => records[i] = record.clone(),
            None => match &remote_row {
                Some(row) => {
                    carry_over(row, &mut record);
                    records.push(record.clone());
                }
                None => {
                    return Err(Error::NotFound {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    })
                }
            },
        }

        let local = self.stores.local.replace_all(collection, &records).await;
        let value = remote_row.unwrap_or(record);
        self.durability.settle(collection, remote, local, value)
    }

    /// Delete a record from both stores, returning the removed copy.
    ///
    /// The entity's delete guard runs against the local collection before
    /// either store is touched.
    #[tracing::instrument(skip_all, fields(collection = self.spec.collection, id = %id))]
    pub async fn delete(&self, id: &str) -> Result<WriteReport<Record>> {
        validate_record_id(id)?;
        let collection = self.collection();
        let _guard = self.stores.locks.acquire(collection).await;
        let mut records = self.stores.local.load_all(collection).await?;
        let target = records.iter().find(|r| r.id == id).cloned();

        if let (Some(guard), Some(target)) = (self.spec.delete_guard, &target) {
            guard.check(collection, target, &records)?;
        }

        let (remote, remote_row) = match self
            .stores
            .remote
            .delete(collection, &[Filter::eq(ID_FIELD, id)])
            .await
        {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => (RemoteLeg::Ok, Some(row.without_nulls())),
                None => (RemoteLeg::Missing, None),
            },
            Err(err) => (RemoteLeg::failed(&err), None),
        };

        let (removed, local) = match (target, remote_row) {
            (Some(stored), _) => {
                records.retain(|r| r.id != id);
                let written = self.stores.local.replace_all(collection, &records).await;
                (stored, written)
            }
            // Nothing to remove locally
            (None, Some(row)) => (row, Ok(())),
            (None, None) => {
                return Err(Error::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
        };

        self.durability.settle(collection, remote, local, removed)
    }

    /// Case-insensitive substring search.
    ///
    /// Remote search scans the entity's fixed search fields. The local
    /// fail-over scans every field of every record, so it can find matches
    /// the remote search would not.
    #[tracing::instrument(skip_all, fields(collection = self.spec.collection))]
    pub async fn search(&self, term: &str) -> Result<Vec<Record>> {
        let collection = self.collection();
        let query = Query::new().filter(Filter::search(self.spec.search_fields, term));

        match self.stores.remote.select(collection, &query).await {
            Ok(rows) => Ok(rows.into_iter().map(Record::without_nulls).collect()),
            Err(err) => {
                tracing::warn!(error = %err, "remote search failed, scanning local collection");
                let records = self.stores.local.load_all(collection).await?;
                Ok(records
                    .into_iter()
                    .filter(|r| r.matches_any_field(term))
                    .collect())
            }
        }
    }

    /// Next display sequence (e.g. the next receipt number)
    pub async fn next_sequence(&self) -> Result<i64> {
        self.stores.sequence.next_sequence(self.collection()).await
    }

    /// The remote copy of a record, or `None` if absent or unreachable
    async fn remote_row(&self, collection: &str, id: &str) -> Option<Record> {
        let query = Query::new().filter(Filter::eq(ID_FIELD, id)).limit(1);
        match self.stores.remote.select(collection, &query).await {
            Ok(rows) => rows.into_iter().next(),
            Err(err) => {
                tracing::debug!(error = %err, "remote row lookup failed");
                None
            }
        }
    }

    fn default_query(&self) -> Query {
        if self.spec.sequenced {
            Query::new().order_by(SNO_FIELD, Direction::Asc)
        } else {
            Query::new()
        }
    }
}

/// Copy the fields an update never changes from the stored copy
fn carry_over(stored: &Record, record: &mut Record) {
    record.sno = stored.sno;
    for key in [CREATED_BY, CREATED_AT] {
        if let Some(value) = stored.get(key) {
            record.fields.insert(key.to_string(), value.clone());
        }
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::storage::collection::FileStore;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        remote: Arc<MemoryRemote>,
        files: Arc<FileStore>,
        stores: Arc<DualStore>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let files = Arc::new(FileStore::open(tmp.path()));
        let stores = Arc::new(DualStore::new(
            remote.clone(),
            files.clone(),
            RetryPolicy::default(),
        ));
        Fixture {
            _tmp: tmp,
            remote,
            files,
            stores,
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_create_writes_both_stores() {
        let fx = fixture();
        let repo = Repository::new(entity::PATIENTS, fx.stores.clone());

        let report = repo
            .create(&Session::new("dr-rao"), attrs(&[("name", "Asha")]))
            .await
            .unwrap();

        assert!(report.is_mirrored());
        let record = report.into_inner();
        assert_eq!(record.get("createdBy").and_then(|v| v.as_str()), Some("dr-rao"));
        assert_eq!(fx.remote.rows("patients").len(), 1);
        assert_eq!(fx.files.load_all("patients").await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_create_survives_remote_outage() {
        let fx = fixture();
        fx.remote.set_online(false);
        let repo = Repository::new(entity::PRESCRIPTIONS, fx.stores.clone());

        let report = repo
            .create(&Session::system(), attrs(&[("medicine", "Paracetamol")]))
            .await
            .unwrap();

        assert!(matches!(report.remote, RemoteLeg::Failed(_)));
        assert_eq!(report.value.sno, Some(1));
        assert!(fx.remote.rows("prescriptions").is_empty());
        assert_eq!(fx.files.load_all("prescriptions").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_keep_every_record() {
        let fx = fixture();
        let repo = Repository::new(entity::LABS, fx.stores.clone());

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let mut fields = Fields::new();
                fields.insert("test".into(), Value::Int(i));
                repo.create(&Session::system(), fields).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let local = fx.files.load_all("labs").await.unwrap();
        assert_eq!(local.len(), 8);
        let mut snos: Vec<i64> = local.iter().filter_map(|r| r.sno).collect();
        snos.sort();
        assert_eq!(snos, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_update_missing_everywhere_is_not_found() {
        let fx = fixture();
        let repo = Repository::new(entity::OPERATIONS, fx.stores.clone());

        let err = repo
            .update(&Session::system(), "ghost", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(fx.files.load_all("operations").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_remote_only_row_is_mirrored_locally() {
        let fx = fixture();
        let mut row = Record::new("op-1");
        row.set("procedure", "Appendectomy");
        fx.remote.seed("operations", vec![row]);
        let repo = Repository::new(entity::OPERATIONS, fx.stores.clone());

        let report = repo
            .update(&Session::system(), "op-1", attrs(&[("procedure", "Hernia repair")]))
            .await
            .unwrap();

        assert!(report.is_mirrored());
        let local = fx.files.load_all("operations").await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].get("procedure").and_then(|v| v.as_str()), Some("Hernia repair"));
    }

    #[tokio::test]
    async fn test_update_remote_only_row_drops_stale_remote_fields() {
        let fx = fixture();
        let mut row = Record::new("op-1");
        row.set("procedure", "Appendectomy")
            .set("surgeon", "Dr. Rao")
            .set("createdBy", "front-desk");
        fx.remote.seed("operations", vec![row]);
        let repo = Repository::new(entity::OPERATIONS, fx.stores.clone());

        let replacement = attrs(&[("procedure", "Hernia repair")]);
        let report = repo
            .update(&Session::system(), "op-1", replacement.clone())
            .await
            .unwrap();
        assert!(report.is_mirrored());
        assert_eq!(report.value.user_fields(), replacement);
        assert_eq!(
            report.value.get("createdBy").and_then(|v| v.as_str()),
            Some("front-desk")
        );

        let remote = repo.get("op-1").await.unwrap().unwrap();
        assert_eq!(remote.user_fields(), replacement);

        fx.remote.set_online(false);
        let local = repo.get("op-1").await.unwrap().unwrap();
        assert_eq!(local.user_fields(), replacement);
    }

    #[tokio::test]
    async fn test_update_nulls_remote_fields_missing_locally() {
        let fx = fixture();
        let mut local = Record::new("p-1");
        local.set("name", "Asha");
        fx.files.replace_all("patients", &[local.clone()]).await.unwrap();
        local.set("allergies", "Penicillin");
        fx.remote.seed("patients", vec![local]);
        let repo = Repository::new(entity::PATIENTS, fx.stores.clone());

        repo.update(&Session::system(), "p-1", attrs(&[("name", "Asha K")]))
            .await
            .unwrap();

        let remote = repo.get("p-1").await.unwrap().unwrap();
        assert_eq!(remote.user_fields(), attrs(&[("name", "Asha K")]));
    }

    #[tokio::test]
    async fn test_delete_reports_missing_remote_row() {
        let fx = fixture();
        fx.files
            .replace_all("patients", &[Record::new("p-1")])
            .await
            .unwrap();
        let repo = Repository::new(entity::PATIENTS, fx.stores.clone());

        let report = repo.delete("p-1").await.unwrap();
        assert_eq!(report.remote, RemoteLeg::Missing);
        assert!(fx.files.load_all("patients").await.unwrap().is_empty());

        let err = repo.delete("p-1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
