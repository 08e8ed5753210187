//! clinicstore - dual-store persistence for clinic records
//!
//! Every entity (patients, prescriptions, operations, staff, labs) lives in
//! two places: a hosted relational service that is the primary store when
//! reachable, and a local per-collection file that is the durability floor.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Clinic                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              Dual-Store Entity Repository                   ││
//! │  │   create / read / update / delete / search / next_sequence  ││
//! │  └───────┬───────────────────────┬─────────────────────┬───────┘│
//! │          │                       │                     │        │
//! │          ▼                       ▼                     ▼        │
//! │  ┌───────────────┐   ┌───────────────────────┐  ┌─────────────┐ │
//! │  │ Remote Entity │   │  Retry-on-Lock Writer │  │  Sequence   │ │
//! │  │ Service       │   │  (3 attempts, 1s)     │  │  Reconciler │ │
//! │  │ (primary)     │   └───────────┬───────────┘  └──────┬──────┘ │
//! │  └───────┬───────┘               │                     │        │
//! │          │                       ▼                     │        │
//! │          │           ┌───────────────────────┐         │        │
//! │          │           │ Local Collection Store│◄────────┘        │
//! │          │           │ (durability floor)    │                  │
//! │          │           └───────────┬───────────┘                  │
//! └──────────┼───────────────────────┼──────────────────────────────┘
//!            ▼                       ▼
//!      REST /rest/v1/{table}    {data_dir}/{collection}.json
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod query;
pub mod remote;
pub mod repository;
pub mod sequence;
pub mod session;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{Direction, Filter, Query};
pub use repository::entity::{self, EntitySpec};
pub use repository::{DualStore, RemoteLeg, Repository, WriteDurability, WriteReport};
pub use session::Session;
pub use storage::record::{Fields, Record, Value};

use remote::{Offline, RemoteService, RestRemote};
use std::sync::Arc;
use storage::collection::FileStore;
use storage::retry::RetryPolicy;
use storage::LocalStore;

/// The main handle: one set of stores shared by every entity repository
#[derive(Clone)]
pub struct Clinic {
    stores: Arc<DualStore>,
}

impl Clinic {
    /// Open the stores described by the configuration
    pub async fn open(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|source| Error::FileWriteError {
                path: config.data_dir.clone(),
                source,
            })?;

        // Hashing is slow, so the admin is only built if staff is created
        let seed = config.staff_seed.clone();
        let local = FileStore::open(&config.data_dir).with_lazy_seed(entity::STAFF.collection, move || {
            Ok(vec![credential::default_admin(&seed)?])
        });

        let remote: Arc<dyn RemoteService> = match &config.remote {
            Some(remote) => {
                tracing::info!(url = %remote.url, "using remote entity service");
                Arc::new(RestRemote::new(remote)?)
            }
            None => {
                tracing::info!("no remote configured, running local-only");
                Arc::new(Offline)
            }
        };

        Ok(Self::with_stores(remote, Arc::new(local), config.retry))
    }

    /// Build a handle over explicit store implementations
    pub fn with_stores(
        remote: Arc<dyn RemoteService>,
        local: Arc<dyn LocalStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            stores: Arc::new(DualStore::new(remote, local, retry)),
        }
    }

    /// Repository for any entity type
    pub fn repository(&self, spec: EntitySpec) -> Repository {
        Repository::new(spec, self.stores.clone())
    }

    pub fn patients(&self) -> Repository {
        self.repository(entity::PATIENTS)
    }

    pub fn prescriptions(&self) -> Repository {
        self.repository(entity::PRESCRIPTIONS)
    }

    pub fn operations(&self) -> Repository {
        self.repository(entity::OPERATIONS)
    }

    pub fn staff(&self) -> Repository {
        self.repository(entity::STAFF)
    }

    pub fn labs(&self) -> Repository {
        self.repository(entity::LABS)
    }

    /// Check staff credentials, returning the matching staff record
    pub async fn verify_login(&self, username: &str, password: &str) -> Result<Option<Record>> {
        let query = Query::new().filter(Filter::eq(credential::USERNAME_FIELD, username));
        let candidates = self.staff().read(&query).await?;

        Ok(candidates.into_iter().find(|record| {
            record
                .get(credential::PASSWORD_FIELD)
                .and_then(|v| v.as_str())
                .map(|hashed| credential::verify(password, hashed))
                .unwrap_or(false)
        }))
    }
}
