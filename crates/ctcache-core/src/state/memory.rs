// # Memory Cache Store
//
// In-memory implementation of CacheStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and for sessions where the cache only needs to live as long as the
// process.
//
// ## Crash Behavior
//
// - All entries are lost on exit
// - The next run classifies every value as new and sends it to the remote,
//   which is harmless because the remote is authoritative

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::state::tables::CacheTables;
use crate::traits::cache_store::{
    CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
use crate::value::{CacheValue, EntryType};

/// In-memory cache store implementation
///
/// This implementation keeps the cache tables behind a RwLock. Clones share
/// the same tables.
///
/// # Example
///
/// ```rust
/// use ctcache_core::{CacheStore, CacheValue, MemoryCacheStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryCacheStore::new();
///     let range = CacheValue::ip_range("203.0.113.1", "203.0.113.100")?;
///
///     store.upsert_touch("Blocked IPs", &range, chrono::Utc::now()).await?;
///     assert!(store.exists("Blocked IPs", &range).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<CacheTables>>,
}

impl MemoryCacheStore {
    /// Create a new empty memory cache store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry and container record
    pub async fn clear(&self) {
        *self.inner.write().await = CacheTables::default();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn upsert_touch(
        &self,
        container_key: &str,
        value: &CacheValue,
        now: DateTime<Utc>,
    ) -> Result<Upsert, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.upsert_touch(container_key, value, now))
    }

    async fn exists(&self, container_key: &str, value: &CacheValue) -> Result<bool, Error> {
        let guard = self.inner.read().await;
        Ok(guard.exists(container_key, value))
    }

    async fn delete(&self, container_key: &str, value: &CacheValue) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.delete(container_key, value))
    }

    async fn delete_container(&self, container_key: &str) -> Result<RemovedCounts, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.delete_container(container_key))
    }

    async fn list(
        &self,
        container_key: &str,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<CacheEntry>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.list(container_key, entry_type))
    }

    async fn purge_older_than(
        &self,
        container_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RemovedCounts, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.purge_older_than(container_key, cutoff))
    }

    async fn stats(&self, container_key: Option<&str>) -> Result<StoreStats, Error> {
        let guard = self.inner.read().await;
        Ok(guard.stats(container_key))
    }

    async fn record_container(&self, record: &ContainerRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.record_container(record);
        Ok(())
    }

    async fn container(&self, container_key: &str) -> Result<Option<ContainerRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.container(container_key))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.list_containers())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}
