//! File-backed collections
//!
//! Each collection is a single JSON array in the data directory, guarded
//! by an advisory lock file while it is being rewritten.
//!
//! Directory structure:
//! ```text
//! /data/
//!   patients.json
//!   patients.lock
//!   prescriptions.json
//!   staff.json
//! ```

use super::record::Record;
use super::LocalStore;
use crate::error::{Error, Result};
use crate::validation::validate_collection_name;
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use walkdir::WalkDir;

const DATA_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

/// Builds the initial contents of a collection; only called when the
/// collection file is first created
pub type Seed = Arc<dyn Fn() -> Result<Vec<Record>> + Send + Sync>;

/// A directory of collection files
pub struct FileStore {
    /// Data directory
    root: PathBuf,
    /// Initial contents for collections that are created on first use
    seeds: HashMap<String, Seed>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("seeded", &self.seeds.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FileStore {
    /// Open a store rooted at the given directory
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seeds: HashMap::new(),
        }
    }

    /// Seed a collection with records the first time it is created
    pub fn with_seed(self, collection: impl Into<String>, records: Vec<Record>) -> Self {
        self.with_lazy_seed(collection, move || Ok(records.clone()))
    }

    /// Seed a collection from `build`, which runs only if the collection
    /// file has to be created
    pub fn with_lazy_seed<F>(mut self, collection: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Result<Vec<Record>> + Send + Sync + 'static,
    {
        self.seeds.insert(collection.into(), Arc::new(build));
        self
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a collection
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.{}", collection, DATA_EXTENSION))
    }

    fn lock_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.{}", collection, LOCK_EXTENSION))
    }

    /// Names of every collection that exists on disk
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        if !self.root.exists() {
            return Ok(names);
        }

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().map(|e| e == DATA_EXTENSION).unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Create the collection file with its seed unless some other writer
    /// got there first
    async fn create_collection(&self, collection: &str) -> Result<()> {
        let seed = self.seeds.get(collection).cloned();
        let root = self.root.clone();
        let path = self.collection_path(collection);
        let name = collection.to_string();

        blocking(move || {
            let records = match seed {
                Some(build) => build()?,
                None => Vec::new(),
            };
            let content = serde_json::to_vec_pretty(&records)?;
            if write_atomic(&root, &name, &path, &content, false)? {
                tracing::info!(collection = %name, records = records.len(), "created local collection");
            }
            Ok(())
        })
        .await
    }
}

/// Run blocking file work off the async workers
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| Error::Other(format!("file task failed: {}", err)))?
}

/// Write `content` to a fresh temp file and move it over `path`.
///
/// Readers never see a partial file. With `overwrite` off an existing
/// `path` is left alone and `false` is returned.
fn write_atomic(
    root: &Path,
    collection: &str,
    path: &Path,
    content: &[u8],
    overwrite: bool,
) -> Result<bool> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::FileWriteError { path, source }
    };

    std::fs::create_dir_all(root).map_err(write_err(root))?;
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{}.", collection))
        .suffix(".tmp")
        .tempfile_in(root)
        .map_err(write_err(root))?;
    temp.write_all(content).map_err(write_err(temp.path()))?;
    temp.as_file().sync_all().map_err(write_err(temp.path()))?;

    let persisted = if overwrite {
        temp.persist(path)
    } else {
        temp.persist_noclobber(path)
    };
    match persisted {
        Ok(_) => Ok(true),
        Err(err) if !overwrite && err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(Error::FileWriteError {
            path: path.to_path_buf(),
            source: err.error,
        }),
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load_all(&self, collection: &str) -> Result<Vec<Record>> {
        validate_collection_name(collection)?;
        let path = self.collection_path(collection);

        let exists = fs::try_exists(&path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.clone(),
                source,
            })?;
        if !exists {
            self.create_collection(collection).await?;
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.clone(),
                source,
            })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|err| Error::StoreCorrupt {
            collection: collection.to_string(),
            message: err.to_string(),
        })
    }

    async fn replace_all(&self, collection: &str, records: &[Record]) -> Result<()> {
        validate_collection_name(collection)?;
        let content = serde_json::to_vec_pretty(records)?;
        let root = self.root.clone();
        let path = self.collection_path(collection);
        let lock_path = self.lock_path(collection);
        let name = collection.to_string();
        let count = records.len();

        blocking(move || {
            std::fs::create_dir_all(&root).map_err(|source| Error::FileWriteError {
                path: root.clone(),
                source,
            })?;

            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|source| Error::FileWriteError {
                    path: lock_path.clone(),
                    source,
                })?;

            // Held until `lock_file` drops at the end of this closure
            if lock_file.try_lock_exclusive().is_err() {
                return Err(Error::WriteLocked { collection: name });
            }

            tracing::debug!(collection = %name, records = count, "replacing local collection");
            write_atomic(&root, &name, &path, &content, true).map(|_| ())
        })
        .await
    }
}
