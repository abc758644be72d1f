//! Cache service
//!
//! The policy layer the rest of the system talks to. It never calls the
//! network and never guesses whether a remote operation worked: the caller
//! classifies first, performs the remote call for the `new` subset only, and
//! confirms afterwards.
//!
//! ## Protocol
//!
//! ```text
//!   caller                     CacheService                 remote
//!     │  classify_batch(values)     │                          │
//!     │────────────────────────────▶│ exists() only            │
//!     │◀──── {already_cached, new} ─│                          │
//!     │                                                        │
//!     │  add(new) ────────────────────────────────────────────▶│
//!     │◀──────────────────────────────────────────── success ──│
//!     │                                                        │
//!     │  confirm_added(values)      │                          │
//!     │────────────────────────────▶│ upsert_touch() each      │
//! ```
//!
//! A failed remote call simply skips the confirm step, so the cache can never
//! run ahead of the remote container.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::integrity::{IntegrityReport, RemoteContainer};
use crate::traits::{
    CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
use crate::value::{CacheValue, EntryType};

/// Canonical identity of a remote container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIdentity {
    /// Stable key used to scope cache entries (name or remote id)
    pub key: String,
    /// Identifier assigned by the remote system
    pub remote_id: Option<String>,
    /// What the container holds
    pub kind: EntryType,
}

impl ContainerIdentity {
    pub fn new(key: impl Into<String>, kind: EntryType) -> Self {
        Self {
            key: key.into(),
            remote_id: None,
            kind,
        }
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

/// Result of [`CacheService::classify_batch`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Values the cache already holds; no remote call needed
    pub already_cached: BTreeSet<CacheValue>,
    /// Values that must be sent to the remote
    pub new: BTreeSet<CacheValue>,
}

impl Classification {
    /// Whether the remote call can be skipped entirely
    pub fn all_cached(&self) -> bool {
        self.new.is_empty()
    }

    /// The subset to send to the remote, in canonical order
    pub fn new_values(&self) -> Vec<CacheValue> {
        self.new.iter().cloned().collect()
    }
}

/// Counts from a confirmation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSummary {
    pub created: usize,
    pub touched: usize,
}

/// Entries of one container grouped by type, for inspection tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedValues {
    pub container: String,
    pub ip_ranges: Vec<CacheEntry>,
    pub fqdns: Vec<CacheEntry>,
}

impl CachedValues {
    pub fn is_empty(&self) -> bool {
        self.ip_ranges.is_empty() && self.fqdns.is_empty()
    }
}

/// Cache statistics reshaped for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Container in scope; `None` for global stats
    pub container: Option<String>,
    /// Whether anything is cached in scope
    pub cached: bool,
    /// Whether the cache has ever recorded the container in scope
    pub known: bool,
    pub ip_ranges: usize,
    pub fqdns: usize,
    pub total: usize,
    /// Latest `last_seen_at` in scope
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Container kind, when a single known container is in scope
    pub kind: Option<EntryType>,
    /// Size last reported by the remote, when a single known container is in scope
    pub remote_size: Option<u64>,
    /// When the remote last confirmed an operation, for a single container
    pub last_sync_at: Option<DateTime<Utc>>,
    pub tracked_containers: usize,
    pub containers_with_ip_ranges: usize,
    pub containers_with_fqdns: usize,
    /// Cache file, for file-backed stores
    pub cache_file: Option<PathBuf>,
}

/// One known container with its cached counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub kind: EntryType,
    pub remote_id: Option<String>,
    pub remote_size: Option<u64>,
    pub cached_ip_ranges: usize,
    pub cached_fqdns: usize,
    pub last_sync_at: DateTime<Utc>,
}

impl ContainerSummary {
    pub fn total_cached(&self) -> usize {
        self.cached_ip_ranges + self.cached_fqdns
    }
}

/// Open the configured cache, or `None` when caching is disabled
pub async fn open_cache(config: &CacheConfig) -> Result<Option<CacheService>> {
    config.validate()?;

    if !config.enabled {
        debug!("Cache disabled by configuration");
        return Ok(None);
    }

    let store = config.store.open().await?;
    debug!(store = config.store.type_name(), "Cache opened");
    Ok(Some(CacheService::new(store)))
}

/// Normalization, classification and the confirmation protocol
pub struct CacheService {
    store: Box<dyn CacheStore>,
}

impl CacheService {
    /// Create a service over an opened store
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    /// Partition `values` into already-cached and new
    ///
    /// Never mutates the store: calling it twice without a confirmation in
    /// between yields identical results.
    pub async fn classify_batch(
        &self,
        container_key: &str,
        entry_type: EntryType,
        values: &[CacheValue],
    ) -> Result<Classification> {
        ensure_entry_type(entry_type, values)?;

        let mut classification = Classification::default();
        for value in values {
            if self.store.exists(container_key, value).await? {
                classification.already_cached.insert(value.clone());
            } else {
                classification.new.insert(value.clone());
            }
        }

        debug!(
            container = container_key,
            %entry_type,
            cached = classification.already_cached.len(),
            new = classification.new.len(),
            "Classified batch"
        );
        Ok(classification)
    }

    /// Record a confirmed remote add
    ///
    /// Touches every value of the original request, including those the
    /// remote call skipped because they were already cached.
    pub async fn confirm_added(
        &self,
        container_key: &str,
        entry_type: EntryType,
        values: &[CacheValue],
        now: DateTime<Utc>,
    ) -> Result<ConfirmSummary> {
        ensure_entry_type(entry_type, values)?;

        if self.store.container(container_key).await?.is_none() {
            self.store
                .record_container(&ContainerRecord {
                    key: container_key.to_string(),
                    kind: entry_type,
                    remote_id: None,
                    remote_size: None,
                    last_sync_at: now,
                })
                .await?;
        }

        let summary = self.upsert_all(container_key, values, now).await?;
        debug!(
            container = container_key,
            created = summary.created,
            touched = summary.touched,
            "Confirmed add"
        );
        Ok(summary)
    }

    /// Record a confirmed remote removal; absent values are not an error
    pub async fn confirm_removed(
        &self,
        container_key: &str,
        entry_type: EntryType,
        values: &[CacheValue],
    ) -> Result<usize> {
        ensure_entry_type(entry_type, values)?;

        let removed = self.store.delete_batch(container_key, values).await?;
        debug!(
            container = container_key,
            requested = values.len(),
            removed,
            "Confirmed removal"
        );
        Ok(removed)
    }

    /// Drop the container's whole cache scope after a confirmed remote delete
    pub async fn confirm_container_deleted(&self, container_key: &str) -> Result<RemovedCounts> {
        let removed = self.store.delete_container(container_key).await?;
        info!(
            container = container_key,
            removed = removed.total(),
            "Container deleted, cache scope dropped"
        );
        Ok(removed)
    }

    /// Seed the cache after a confirmed container creation
    ///
    /// The container is recorded even without initial values, so an empty
    /// container stays distinguishable from one never seen. The recorded size
    /// counts distinct canonical values, as the remote holds them.
    pub async fn write_through_create(
        &self,
        identity: &ContainerIdentity,
        initial_values: &[CacheValue],
        now: DateTime<Utc>,
    ) -> Result<ConfirmSummary> {
        ensure_entry_type(identity.kind, initial_values)?;

        let distinct: BTreeSet<&CacheValue> = initial_values.iter().collect();
        self.store
            .record_container(&ContainerRecord {
                key: identity.key.clone(),
                kind: identity.kind,
                remote_id: identity.remote_id.clone(),
                remote_size: Some(distinct.len() as u64),
                last_sync_at: now,
            })
            .await?;

        self.upsert_all(&identity.key, initial_values, now).await
    }

    /// Record the container's identity and the size the remote reported
    /// after a confirmed operation
    pub async fn confirm_synced(
        &self,
        identity: &ContainerIdentity,
        remote_size: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let previous = self.store.container(&identity.key).await?;

        let record = ContainerRecord {
            key: identity.key.clone(),
            kind: identity.kind,
            remote_id: identity
                .remote_id
                .clone()
                .or_else(|| previous.as_ref().and_then(|p| p.remote_id.clone())),
            remote_size: remote_size.or_else(|| previous.as_ref().and_then(|p| p.remote_size)),
            last_sync_at: now,
        };

        self.store.record_container(&record).await
    }

    /// Remove entries last seen more than `max_age_days` before `now`
    pub async fn purge_stale(
        &self,
        container_key: &str,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<RemovedCounts> {
        // A window reaching past the earliest representable instant purges nothing
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(max_age_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.purge_older_than(container_key, cutoff).await?;

        info!(
            container = container_key,
            max_age_days,
            ip_ranges = removed.ip_ranges,
            fqdns = removed.fqdns,
            "Purged stale entries"
        );
        Ok(removed)
    }

    /// Administrative clear of one container's cache scope
    pub async fn clear_container(&self, container_key: &str) -> Result<RemovedCounts> {
        let removed = self.store.delete_container(container_key).await?;
        info!(
            container = container_key,
            ip_ranges = removed.ip_ranges,
            fqdns = removed.fqdns,
            "Cleared container cache"
        );
        Ok(removed)
    }

    /// Entries of the container grouped by type
    pub async fn list_cached_values(&self, container_key: &str) -> Result<CachedValues> {
        Ok(CachedValues {
            container: container_key.to_string(),
            ip_ranges: self.store.list(container_key, Some(EntryType::IpRange)).await?,
            fqdns: self.store.list(container_key, Some(EntryType::Fqdn)).await?,
        })
    }

    /// Statistics for one container, or for the whole cache with `None`
    pub async fn cache_stats(&self, container_key: Option<&str>) -> Result<CacheStats> {
        let stats: StoreStats = self.store.stats(container_key).await?;
        let record = match container_key {
            Some(key) => self.store.container(key).await?,
            None => None,
        };

        Ok(CacheStats {
            container: container_key.map(str::to_string),
            cached: !stats.is_empty(),
            known: record.is_some() || !stats.is_empty(),
            ip_ranges: stats.ip_ranges,
            fqdns: stats.fqdns,
            total: stats.total(),
            last_seen_at: stats.last_seen_at,
            kind: record.as_ref().map(|r| r.kind),
            remote_size: record.as_ref().and_then(|r| r.remote_size),
            last_sync_at: record.as_ref().map(|r| r.last_sync_at),
            tracked_containers: stats.tracked_containers,
            containers_with_ip_ranges: stats.containers_with_ip_ranges,
            containers_with_fqdns: stats.containers_with_fqdns,
            cache_file: self.store.location().map(|p| p.to_path_buf()),
        })
    }

    /// Every container the cache has recorded, with cached counts
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let mut summaries = Vec::new();
        for record in self.store.list_containers().await? {
            let stats = self.store.stats(Some(&record.key)).await?;
            summaries.push(ContainerSummary {
                name: record.key,
                kind: record.kind,
                remote_id: record.remote_id,
                remote_size: record.remote_size,
                cached_ip_ranges: stats.ip_ranges,
                cached_fqdns: stats.fqdns,
                last_sync_at: record.last_sync_at,
            });
        }
        Ok(summaries)
    }

    /// Compare the remote's container listing with what the cache recorded
    pub async fn validate_integrity(
        &self,
        remote: &[RemoteContainer],
        now: DateTime<Utc>,
    ) -> Result<IntegrityReport> {
        let cached = self.store.list_containers().await?;
        let report = IntegrityReport::compare(remote, &cached, now);

        info!(
            passed = report.passed,
            missing_in_cache = report.missing_in_cache.len(),
            missing_in_remote = report.missing_in_remote.len(),
            size_mismatches = report.size_mismatches.len(),
            "Validated cache integrity"
        );
        Ok(report)
    }

    /// Persist any pending changes
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    async fn upsert_all(
        &self,
        container_key: &str,
        values: &[CacheValue],
        now: DateTime<Utc>,
    ) -> Result<ConfirmSummary> {
        let outcomes = self
            .store
            .upsert_touch_batch(container_key, values, now)
            .await?;

        let created = outcomes.iter().filter(|o| **o == Upsert::Created).count();
        Ok(ConfirmSummary {
            created,
            touched: outcomes.len() - created,
        })
    }
}

fn ensure_entry_type(entry_type: EntryType, values: &[CacheValue]) -> Result<()> {
    match values.iter().find(|v| v.entry_type() != entry_type) {
        Some(value) => Err(Error::invalid_value(format!(
            "'{}' is not a {} value",
            value, entry_type
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryCacheStore;

    fn service() -> CacheService {
        CacheService::new(Box::new(MemoryCacheStore::new()))
    }

    fn fqdns(names: &[&str]) -> Vec<CacheValue> {
        names.iter().map(|n| CacheValue::fqdn(n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_mixed_batch_rejected() {
        let cache = service();
        let values = vec![
            CacheValue::fqdn("a.com").unwrap(),
            CacheValue::ip_range("1.1.1.1", "1.1.1.1").unwrap(),
        ];

        let err = cache
            .classify_batch("c", EntryType::Fqdn, &values)
            .await
            .unwrap_err();
        assert!(err.is_invalid_value());

        let err = cache
            .confirm_added("c", EntryType::Fqdn, &values, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_invalid_value());
        assert!(cache.cache_stats(Some("c")).await.unwrap().total == 0);
    }

    #[tokio::test]
    async fn test_classification_dedupes_equivalent_values() {
        let cache = service();
        let values = fqdns(&["a.com", "A.COM.", "b.com"]);

        let classification = cache
            .classify_batch("c", EntryType::Fqdn, &values)
            .await
            .unwrap();
        assert_eq!(classification.new.len(), 2);
        assert!(!classification.all_cached());
    }

    #[tokio::test]
    async fn test_confirm_synced_keeps_previous_remote_id() {
        let cache = service();
        let now = Utc::now();
        let identity = ContainerIdentity::new("c", EntryType::Fqdn).with_remote_id("1234");

        cache.confirm_synced(&identity, Some(3), now).await.unwrap();
        cache
            .confirm_synced(&ContainerIdentity::new("c", EntryType::Fqdn), None, now)
            .await
            .unwrap();

        let record = cache.store().container("c").await.unwrap().unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("1234"));
        assert_eq!(record.remote_size, Some(3));
    }

    #[tokio::test]
    async fn test_clear_container_reports_per_type_counts() {
        let cache = service();
        let now = Utc::now();
        cache
            .confirm_added("c", EntryType::Fqdn, &fqdns(&["a.com", "b.com"]), now)
            .await
            .unwrap();
        cache
            .confirm_added(
                "c",
                EntryType::IpRange,
                &[CacheValue::ip_range("10.0.0.0", "10.0.0.255").unwrap()],
                now,
            )
            .await
            .unwrap();

        let removed = cache.clear_container("c").await.unwrap();
        assert_eq!(removed, RemovedCounts { ip_ranges: 1, fqdns: 2 });
        assert!(cache.list_cached_values("c").await.unwrap().is_empty());
        assert!(cache.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_integrity_uses_recorded_sizes() {
        let cache = service();
        let now = Utc::now();
        cache
            .write_through_create(
                &ContainerIdentity::new("Allowed", EntryType::Fqdn),
                &fqdns(&["a.com"]),
                now,
            )
            .await
            .unwrap();

        let remote = [RemoteContainer {
            name: "Allowed".to_string(),
            kind: EntryType::Fqdn,
            size: 1,
        }];
        let report = cache.validate_integrity(&remote, now).await.unwrap();
        assert!(report.passed);

        let remote = [RemoteContainer {
            name: "Allowed".to_string(),
            kind: EntryType::Fqdn,
            size: 4,
        }];
        let report = cache.validate_integrity(&remote, now).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.size_mismatches[0].difference(), 3);
    }

    #[tokio::test]
    async fn test_write_through_create_counts_distinct_values() {
        let cache = service();
        let now = Utc::now();
        let identity = ContainerIdentity::new("Allowed", EntryType::Fqdn).with_remote_id("77");

        let summary = cache
            .write_through_create(&identity, &fqdns(&["a.com", "A.com."]), now)
            .await
            .unwrap();
        assert_eq!(summary, ConfirmSummary { created: 1, touched: 1 });

        let record = cache.store().container("Allowed").await.unwrap().unwrap();
        assert_eq!(record.remote_size, Some(1));
        assert_eq!(record.remote_id.as_deref(), Some("77"));

        let remote = [RemoteContainer {
            name: "Allowed".to_string(),
            kind: EntryType::Fqdn,
            size: 1,
        }];
        let report = cache.validate_integrity(&remote, now).await.unwrap();
        assert!(report.passed);
        assert_eq!(cache.cache_stats(Some("Allowed")).await.unwrap().fqdns, 1);
    }

    #[tokio::test]
    async fn test_open_cache_respects_enabled_flag() {
        let mut config = CacheConfig {
            store: crate::config::StoreConfig::Memory,
            ..CacheConfig::new()
        };
        assert!(open_cache(&config).await.unwrap().is_some());

        config.enabled = false;
        assert!(open_cache(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_container_stats() {
        let cache = service();
        let stats = cache.cache_stats(Some("never-seen")).await.unwrap();

        assert!(!stats.cached);
        assert!(!stats.known);
        assert_eq!(stats.last_seen_at, None);
        assert_eq!(stats.cache_file, None);
    }
}
