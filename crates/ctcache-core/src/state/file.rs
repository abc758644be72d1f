// # File Cache Store
//
// File-based implementation of CacheStore with crash recovery.
//
// ## Purpose
//
// Keeps the cache across process runs in a single local file, so the next
// run can skip remote writes for values it already confirmed.
//
// ## Crash Recovery
//
// - Atomic writes: every mutation is written to a temp file, then renamed
// - Copy-on-write: the in-memory tables only change after the rename
//   succeeded, so a failed write leaves memory and disk at the pre-state
// - Automatic backup: keeps `.backup` of the last known good file
// - Recovery: falls back to the backup if the main file is corrupted
// - If no usable copy exists the store refuses to open: a corrupt cache is
//   reported as unavailable, never silently treated as empty
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "ip_ranges": {
//     "Blocked IPs": {
//       "v4:cb007101-cb007164": {
//         "value": { "type": "ip_range", "from": "203.0.113.1", "to": "203.0.113.100" },
//         "added_at": "2025-01-09T12:00:00Z",
//         "last_seen_at": "2025-01-09T12:00:00Z"
//       }
//     }
//   },
//   "fqdns": {},
//   "containers": {
//     "Blocked IPs": { "key": "Blocked IPs", "kind": "ip_range", "last_sync_at": "2025-01-09T12:00:00Z" }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::state::tables::CacheTables;
use crate::traits::cache_store::{
    CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
use crate::value::{CacheValue, EntryType};

/// Cache file format version
/// Used for future migration if format changes
const CACHE_FILE_VERSION: &str = "1.0";

/// File-based cache store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ctcache_core::{CacheStore, CacheValue, FileCacheStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileCacheStore::open("/var/lib/ctcache/cache.json").await?;
///     let fqdn = CacheValue::fqdn("example.com")?;
///
///     // Atomically written to disk
///     store.upsert_touch("Allowed domains", &fqdn, chrono::Utc::now()).await?;
///     assert!(store.exists("Allowed domains", &fqdn).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    tables: RwLock<CacheTables>,
}

/// Serializable cache file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CacheFileFormat {
    version: String,
    #[serde(flatten)]
    tables: CacheTables,
}

/// Why a cache file could not be loaded
#[derive(Debug)]
enum LoadError {
    /// The file exists but cannot be read
    Unreadable(std::io::Error),
    /// The file was read but is not a valid cache file
    Corrupt(serde_json::Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Unreadable(e) => write!(f, "unreadable: {e}"),
            LoadError::Corrupt(e) => write!(f, "corrupt: {e}"),
        }
    }
}

impl FileCacheStore {
    /// Open or create a file cache store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing cache file, if any
    /// 3. If the file is corrupt, recover from the backup
    /// 4. If no usable copy exists, fail with `StoreUnavailable`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tables = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load tables from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<CacheTables, Error> {
        let corruption = match Self::load(path).await {
            Ok(tables) => {
                tracing::debug!(path = %path.display(), entries = tables.len(), "Loaded cache file");
                return Ok(tables);
            }
            Err(LoadError::Unreadable(e)) => {
                return Err(Error::store_unavailable(format!(
                    "Failed to read cache file {}: {}",
                    path.display(),
                    e
                )));
            }
            Err(LoadError::Corrupt(e)) => e,
        };

        tracing::warn!(
            "Cache file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            corruption
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            return Err(Error::store_unavailable(format!(
                "Cache file {} is corrupted and no backup exists: {}",
                path.display(),
                corruption
            )));
        }

        match Self::load(&backup_path).await {
            Ok(tables) => {
                tracing::info!("Recovered cache from backup: {} entries", tables.len());

                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore cache file from backup: {}",
                        restore_err
                    );
                }

                Ok(tables)
            }
            Err(backup_err) => Err(Error::store_unavailable(format!(
                "Cache file {} is corrupted ({}) and its backup is unusable ({})",
                path.display(),
                corruption,
                backup_err
            ))),
        }
    }

    /// Load tables from one file; a missing file is an empty cache
    async fn load(path: &Path) -> Result<CacheTables, LoadError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Cache file does not exist: {}", path.display());
                return Ok(CacheTables::default());
            }
            Err(e) => return Err(LoadError::Unreadable(e)),
        };

        let cache_file: CacheFileFormat =
            serde_json::from_str(&content).map_err(LoadError::Corrupt)?;

        if cache_file.version != CACHE_FILE_VERSION {
            tracing::warn!(
                "Cache file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                CACHE_FILE_VERSION,
                cache_file.version
            );
        }

        Ok(cache_file.tables)
    }

    /// Apply `op` to a copy of the tables, persist the copy, then publish it
    ///
    /// The write lock is held across the file write, so mutations are
    /// serialized and readers never observe a state that is not on disk.
    async fn mutate<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut CacheTables) -> T + Send,
        T: Send,
    {
        let mut guard = self.tables.write().await;
        let mut next = guard.clone();
        let outcome = op(&mut next);

        if next != *guard {
            self.write_tables(&next).await?;
            *guard = next;
        }

        Ok(outcome)
    }

    /// Write tables to file atomically
    async fn write_tables(&self, tables: &CacheTables) -> Result<(), Error> {
        let cache_file = CacheFileFormat {
            version: CACHE_FILE_VERSION.to_string(),
            tables: tables.clone(),
        };

        let json = serde_json::to_string_pretty(&cache_file)
            .map_err(|e| Error::store_unavailable(format!("Failed to serialize cache: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store_unavailable(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Cache written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes (`<file>.tmp`)
    fn temp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".tmp")
    }

    /// Get path to backup file (`<file>.backup`)
    fn backup_path(path: &Path) -> PathBuf {
        sibling_with_suffix(path, ".backup")
    }
}

/// Append `suffix` to the full file name, so the sibling never equals `path`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn upsert_touch(
        &self,
        container_key: &str,
        value: &CacheValue,
        now: DateTime<Utc>,
    ) -> Result<Upsert, Error> {
        self.mutate(|tables| tables.upsert_touch(container_key, value, now))
            .await
    }

    async fn upsert_touch_batch(
        &self,
        container_key: &str,
        values: &[CacheValue],
        now: DateTime<Utc>,
    ) -> Result<Vec<Upsert>, Error> {
        self.mutate(|tables| {
            values
                .iter()
                .map(|value| tables.upsert_touch(container_key, value, now))
                .collect()
        })
        .await
    }

    async fn exists(&self, container_key: &str, value: &CacheValue) -> Result<bool, Error> {
        let guard = self.tables.read().await;
        Ok(guard.exists(container_key, value))
    }

    async fn delete(&self, container_key: &str, value: &CacheValue) -> Result<bool, Error> {
        self.mutate(|tables| tables.delete(container_key, value))
            .await
    }

    async fn delete_batch(
        &self,
        container_key: &str,
        values: &[CacheValue],
    ) -> Result<usize, Error> {
        self.mutate(|tables| {
            values
                .iter()
                .filter(|value| tables.delete(container_key, value))
                .count()
        })
        .await
    }

    async fn delete_container(&self, container_key: &str) -> Result<RemovedCounts, Error> {
        self.mutate(|tables| tables.delete_container(container_key))
            .await
    }

    async fn list(
        &self,
        container_key: &str,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<CacheEntry>, Error> {
        let guard = self.tables.read().await;
        Ok(guard.list(container_key, entry_type))
    }

    async fn purge_older_than(
        &self,
        container_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RemovedCounts, Error> {
        self.mutate(|tables| tables.purge_older_than(container_key, cutoff))
            .await
    }

    async fn stats(&self, container_key: Option<&str>) -> Result<StoreStats, Error> {
        let guard = self.tables.read().await;
        Ok(guard.stats(container_key))
    }

    async fn record_container(&self, record: &ContainerRecord) -> Result<(), Error> {
        self.mutate(|tables| tables.record_container(record)).await
    }

    async fn container(&self, container_key: &str) -> Result<Option<ContainerRecord>, Error> {
        let guard = self.tables.read().await;
        Ok(guard.container(container_key))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, Error> {
        let guard = self.tables.read().await;
        Ok(guard.list_containers())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every mutation is written before it becomes visible
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileCacheStore::open(&path).await.unwrap();

        // Initially empty
        assert!(store.stats(None).await.unwrap().is_empty());

        let value = CacheValue::fqdn("example.com").unwrap();
        let now = Utc::now();
        store.upsert_touch("Allowed", &value, now).await.unwrap();

        // Verify file was written
        assert!(path.exists());

        // Load new instance and verify persistence
        let store2 = FileCacheStore::open(&path).await.unwrap();
        let entries = store2.list("Allowed", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, value);
        assert_eq!(entries[0].added_at, now);
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileCacheStore::open(&path).await.unwrap();
        let first = CacheValue::fqdn("a.com").unwrap();
        let second = CacheValue::fqdn("b.com").unwrap();
        store.upsert_touch("c", &first, Utc::now()).await.unwrap();

        // Second write leaves the first state in the backup
        store.upsert_touch("c", &second, Utc::now()).await.unwrap();
        let backup_path = FileCacheStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileCacheStore::open(&path)
            .await
            .expect("corrupt cache file should be recovered from backup");
        assert!(recovered.exists("c", &first).await.unwrap());
        assert!(
            !recovered.exists("c", &second).await.unwrap(),
            "Backup should contain previous state, not latest"
        );

        // The main file was restored too
        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("a.com"));
    }

    #[tokio::test]
    async fn test_file_store_corruption_without_backup_is_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let err = FileCacheStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_file_store_failed_write_keeps_pre_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = FileCacheStore::open(&path).await.unwrap();
        let value = CacheValue::fqdn("a.com").unwrap();

        // A directory where the temp file should go makes the write fail
        std::fs::create_dir(store.temp_path()).unwrap();

        let err = store.upsert_touch("c", &value, Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(!store.exists("c", &value).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_batch_is_one_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = FileCacheStore::open(&path).await.unwrap();
        let now = Utc::now();

        let values: Vec<CacheValue> = ["a.com", "b.com", "a.com"]
            .iter()
            .map(|name| CacheValue::fqdn(name).unwrap())
            .collect();

        let outcomes = store.upsert_touch_batch("c", &values, now).await.unwrap();
        assert_eq!(outcomes, [Upsert::Created, Upsert::Created, Upsert::Touched]);

        // Only one write happened, so no backup of an earlier state exists
        assert!(!FileCacheStore::backup_path(&path).exists());

        let removed = store.delete_batch("c", &values).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.list("c", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_purge_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = FileCacheStore::open(&path).await.unwrap();
        let now = Utc::now();

        let old = CacheValue::ip_range("10.0.0.1", "10.0.0.1").unwrap();
        let fresh = CacheValue::ip_range("10.0.0.2", "10.0.0.2").unwrap();
        store.upsert_touch("c", &old, now - Duration::days(40)).await.unwrap();
        store.upsert_touch("c", &fresh, now).await.unwrap();

        let removed = store
            .purge_older_than("c", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed.ip_ranges, 1);

        let reopened = FileCacheStore::open(&path).await.unwrap();
        assert!(!reopened.exists("c", &old).await.unwrap());
        assert!(reopened.exists("c", &fresh).await.unwrap());
        assert_eq!(reopened.location(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_file_store_sibling_names_never_collide() {
        let dir = tempdir().unwrap();

        for name in ["cache.tmp", "cache.backup"] {
            let path = dir.path().join(name);
            let store = FileCacheStore::open(&path).await.unwrap();
            assert_ne!(store.temp_path(), path);
            assert_ne!(FileCacheStore::backup_path(&path), path);

            let first = CacheValue::fqdn("a.com").unwrap();
            let second = CacheValue::fqdn("b.com").unwrap();
            store.upsert_touch("c", &first, Utc::now()).await.unwrap();
            store.upsert_touch("c", &second, Utc::now()).await.unwrap();

            let reopened = FileCacheStore::open(&path).await.unwrap();
            assert!(reopened.exists("c", &first).await.unwrap());
            assert!(reopened.exists("c", &second).await.unwrap());
        }

        let path = dir.path().join("cache.json");
        assert_eq!(
            FileCacheStore::backup_path(&path),
            dir.path().join("cache.json.backup")
        );
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store = FileCacheStore::open(&path).await.unwrap();
        store
            .upsert_touch("c", &CacheValue::fqdn("a.com").unwrap(), Utc::now())
            .await
            .unwrap();
        assert!(path.exists());
    }
}
