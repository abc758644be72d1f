// # Cache Store Trait
//
// Defines the interface for persistent cache storage.
//
// ## Purpose
//
// The store is the leaf of the cache: it persists what it is told and
// answers queries about it. It tracks, per container:
// - IP-range entries
// - FQDN entries
// - When each entry was first added and last seen
// - Container metadata (kind, remote id, remote-reported size)
//
// It has no knowledge of remote semantics. Deciding *when* to write is the
// job of `CacheService`.
//
// ## Implementations
//
// - File-based: a single JSON file, atomic write-then-rename
// - Memory: for tests and throwaway sessions
//
// ## Usage
//
// ```rust
// use ctcache_core::{CacheStore, CacheValue, MemoryCacheStore, Upsert};
//
// #[tokio::main]
// async fn main() -> ctcache_core::Result<()> {
//     let store = MemoryCacheStore::new();
//     let value = CacheValue::fqdn("example.com")?;
//     let now = chrono::Utc::now();
//
//     assert_eq!(store.upsert_touch("Allowed", &value, now).await?, Upsert::Created);
//     assert_eq!(store.upsert_touch("Allowed", &value, now).await?, Upsert::Touched);
//     assert!(store.exists("Allowed", &value).await?);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::value::{CacheValue, EntryType};

/// One cached value scoped to a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Owning container (opaque to the cache)
    pub container_key: String,
    /// Canonical value
    pub value: CacheValue,
    /// Set once, at first insertion
    pub added_at: DateTime<Utc>,
    /// Refreshed on every touch
    pub last_seen_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn entry_type(&self) -> EntryType {
        self.value.entry_type()
    }

    /// Whether the entry was last seen strictly before `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen_at < cutoff
    }
}

/// Outcome of [`CacheStore::upsert_touch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upsert {
    /// The key was absent and has been inserted
    Created,
    /// The key was present; only `last_seen_at` changed
    Touched,
}

/// Per-type counts of removed entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedCounts {
    pub ip_ranges: usize,
    pub fqdns: usize,
}

impl RemovedCounts {
    pub fn total(&self) -> usize {
        self.ip_ranges + self.fqdns
    }
}

/// Aggregate counts over one container or the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub ip_ranges: usize,
    pub fqdns: usize,
    /// Latest `last_seen_at` in scope; `None` when the scope is empty
    pub last_seen_at: Option<DateTime<Utc>>,
    pub containers_with_ip_ranges: usize,
    pub containers_with_fqdns: usize,
    /// Containers with a metadata record in scope
    pub tracked_containers: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.ip_ranges + self.fqdns
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// What the cache knows about a container itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container key, as used to scope entries
    pub key: String,
    /// Which kind of values the container holds
    pub kind: EntryType,
    /// Identifier assigned by the remote system, if known
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Size last reported by the remote system
    #[serde(default)]
    pub remote_size: Option<u64>,
    /// When the remote last confirmed an operation on this container
    pub last_sync_at: DateTime<Utc>,
}

/// Trait for cache store implementations
///
/// # Atomicity
///
/// Every mutating call is one transaction: after a crash or a failed write
/// the store holds either the pre-state or the post-state, never a mix.
/// Batch variants are a single transaction for the whole batch when the
/// implementation overrides them.
///
/// # Errors
///
/// Storage failures are reported as [`crate::Error::StoreUnavailable`].
/// Absence is never an error: deleting a missing key returns `false`.
///
/// # Responsibilities
///
/// - ✅ Persist entries and container records
/// - ✅ Answer lookups, listings and aggregates
/// - ❌ Normalize values (owned by `value`)
/// - ❌ Decide when to add or evict (owned by `CacheService`)
/// - ❌ Talk to the remote system
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert the key with `added_at = last_seen_at = now`, or refresh
    /// `last_seen_at` if it already exists
    async fn upsert_touch(
        &self,
        container_key: &str,
        value: &CacheValue,
        now: DateTime<Utc>,
    ) -> Result<Upsert>;

    /// [`upsert_touch`](Self::upsert_touch) for every value, in order
    async fn upsert_touch_batch(
        &self,
        container_key: &str,
        values: &[CacheValue],
        now: DateTime<Utc>,
    ) -> Result<Vec<Upsert>> {
        let mut outcomes = Vec::with_capacity(values.len());
        for value in values {
            outcomes.push(self.upsert_touch(container_key, value, now).await?);
        }
        Ok(outcomes)
    }

    /// Pure lookup
    async fn exists(&self, container_key: &str, value: &CacheValue) -> Result<bool>;

    /// Remove the key; returns whether a row was removed
    async fn delete(&self, container_key: &str, value: &CacheValue) -> Result<bool>;

    /// [`delete`](Self::delete) for every value; returns how many rows were removed
    async fn delete_batch(&self, container_key: &str, values: &[CacheValue]) -> Result<usize> {
        let mut removed = 0;
        for value in values {
            if self.delete(container_key, value).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry of the container, and its metadata record
    async fn delete_container(&self, container_key: &str) -> Result<RemovedCounts>;

    /// Entries of the container ordered by value, optionally of one type only
    async fn list(
        &self,
        container_key: &str,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<CacheEntry>>;

    /// Remove the container's entries with `last_seen_at < cutoff`
    async fn purge_older_than(
        &self,
        container_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RemovedCounts>;

    /// Aggregates for one container, or for the whole store with `None`
    async fn stats(&self, container_key: Option<&str>) -> Result<StoreStats>;

    /// Insert or replace a container's metadata record
    async fn record_container(&self, record: &ContainerRecord) -> Result<()>;

    /// Metadata record of a container, if the cache has ever seen it
    async fn container(&self, container_key: &str) -> Result<Option<ContainerRecord>>;

    /// All container records, ordered by key
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;

    /// Where the store keeps its data, for display
    fn location(&self) -> Option<&Path> {
        None
    }
}
