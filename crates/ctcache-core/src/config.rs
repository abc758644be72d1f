//! Configuration types for the container cache
//!
//! Configuration is an explicit value handed to constructors. Nothing in the
//! crate reads the environment behind the caller's back; [`CacheConfig::from_env`]
//! exists for binaries that want environment-driven setup.
//!
//! ## Environment
//!
//! - `CTCACHE_ENABLED`: `false`, `0` or `no` disables the cache (default: enabled)
//! - `CTCACHE_STORE`: `file` (default) or `memory`
//! - `CTCACHE_PATH`: cache file path (default: `~/.ctcache/cache.json`)
//! - `CTCACHE_MAX_AGE_DAYS`: default staleness window for purges (default: 30)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::state::{FileCacheStore, MemoryCacheStore};
use crate::traits::CacheStore;

/// Bounds for the staleness window, in days
const MAX_AGE_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=3650;

/// Main cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the cache is used at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Where entries are kept
    #[serde(default)]
    pub store: StoreConfig,

    /// Default staleness window for purges, in days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl CacheConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            enabled: default_enabled(),
            store: StoreConfig::default(),
            max_age_days: default_max_age_days(),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(enabled) = lookup("CTCACHE_ENABLED") {
            config.enabled = !matches!(
                enabled.trim().to_lowercase().as_str(),
                "false" | "0" | "no"
            );
        }

        let path = lookup("CTCACHE_PATH").map(PathBuf::from);
        config.store = match lookup("CTCACHE_STORE").as_deref().map(str::trim) {
            None | Some("file") => StoreConfig::File {
                path: path.unwrap_or_else(default_cache_path),
            },
            Some("memory") => StoreConfig::Memory,
            Some(other) => {
                return Err(Error::config(format!(
                    "CTCACHE_STORE '{}' is not supported. Supported stores: file, memory",
                    other
                )));
            }
        };

        if let Some(days) = lookup("CTCACHE_MAX_AGE_DAYS") {
            config.max_age_days = days.trim().parse().map_err(|_| {
                Error::config(format!(
                    "CTCACHE_MAX_AGE_DAYS must be a whole number of days. Got: {}",
                    days
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !MAX_AGE_DAYS_RANGE.contains(&self.max_age_days) {
            return Err(Error::config(format!(
                "max_age_days must be between {} and {}. Got: {}",
                MAX_AGE_DAYS_RANGE.start(),
                MAX_AGE_DAYS_RANGE.end(),
                self.max_age_days
            )));
        }

        self.store.validate()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the cache file
        path: PathBuf,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            StoreConfig::File { path } if path.as_os_str().is_empty() => {
                Err(Error::config("Cache file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Open the configured store
    pub async fn open(&self) -> Result<Box<dyn CacheStore>> {
        match self {
            StoreConfig::File { path } => Ok(Box::new(FileCacheStore::open(path).await?)),
            StoreConfig::Memory => Ok(Box::new(MemoryCacheStore::new())),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: default_cache_path(),
        }
    }
}

/// Returns the default cache file location, `~/.ctcache/cache.json`.
///
/// Falls back to `./.ctcache/cache.json` if the home directory cannot be
/// determined.
pub fn default_cache_path() -> PathBuf {
    dirs::home_dir()
        .map_or_else(|| PathBuf::from(".ctcache"), |home| home.join(".ctcache"))
        .join("cache.json")
}

fn default_enabled() -> bool {
    true
}

fn default_max_age_days() -> u32 {
    30
}
