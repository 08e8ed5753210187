//! Retry-on-lock wrapper for local writes
//!
//! A collection file can be held briefly by another process (a spreadsheet
//! viewer, a second instance). Writes that hit `WriteLocked` are retried on
//! a fixed interval; every other error is returned immediately.

use super::record::Record;
use super::LocalStore;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Fixed-interval retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Wait between attempts, in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// A local store whose writes retry while the collection is locked
#[derive(Clone)]
pub struct RetryingStore {
    inner: Arc<dyn LocalStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn LocalStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Reads are never retried
    pub async fn load_all(&self, collection: &str) -> Result<Vec<Record>> {
        self.inner.load_all(collection).await
    }

    /// Replace the collection, retrying on `WriteLocked`
    pub async fn replace_all(&self, collection: &str, records: &[Record]) -> Result<()> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.replace_all(collection, records).await {
                Err(Error::WriteLocked { .. }) if attempt < max_attempts => {
                    tracing::warn!(
                        collection,
                        attempt,
                        max_attempts,
                        "collection locked, retrying in {:?}",
                        self.policy.backoff()
                    );
                    tokio::time::sleep(self.policy.backoff()).await;
                    attempt += 1;
                }
                Err(err @ Error::WriteLocked { .. }) => {
                    tracing::error!(collection, attempts = attempt, "collection still locked, giving up");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports `WriteLocked` for the first `locked_for` writes
    struct FlakyStore {
        locked_for: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl LocalStore for FlakyStore {
        async fn load_all(&self, _collection: &str) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn replace_all(&self, collection: &str, _records: &[Record]) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.locked_for {
                Err(Error::WriteLocked {
                    collection: collection.to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn flaky(locked_for: u32) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            locked_for,
            attempts: AtomicU32::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let store = flaky(u32::MAX);
        let writer = RetryingStore::new(store.clone(), RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let err = writer.replace_all("staff", &[]).await.unwrap_err();

        assert!(matches!(err, Error::WriteLocked { .. }));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_once_lock_clears() {
        let store = flaky(1);
        let writer = RetryingStore::new(store.clone(), RetryPolicy::default());

        let started = tokio::time::Instant::now();
        writer.replace_all("staff", &[]).await.unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        struct Broken(AtomicU32);

        #[async_trait]
        impl LocalStore for Broken {
            async fn load_all(&self, _collection: &str) -> Result<Vec<Record>> {
                Ok(Vec::new())
            }

            async fn replace_all(&self, _collection: &str, _records: &[Record]) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(Error::Other("disk full".into()))
            }
        }

        let store = Arc::new(Broken(AtomicU32::new(0)));
        let writer = RetryingStore::new(store.clone(), RetryPolicy::default());

        assert!(writer.replace_all("labs", &[]).await.is_err());
        assert_eq!(store.0.load(Ordering::SeqCst), 1);
    }
}
