// # ctcache-core
//
// Local persistence cache that shadows remote network-object containers
// (IP-range lists and FQDN lists).
//
// ## Architecture Overview
//
// - **CacheStore**: Trait for durable storage of entries and container records
// - **FileCacheStore / MemoryCacheStore**: The two store backends
// - **CacheService**: Normalization, classification and the confirmation
//   protocol used around remote mutations
// - **value**: Canonical forms of IP ranges and FQDNs
//
// ## Design Principles
//
// 1. **The remote is authoritative**: the cache only records what the
//    caller confirms succeeded remotely
// 2. **Two phases**: classify before the remote call, confirm after it
// 3. **No network access**: transport lives entirely outside this crate
// 4. **Explicit configuration**: stores are built from a passed-in config
// 5. **Loud failures**: an unusable cache is an error, never an empty cache

pub mod config;
pub mod error;
pub mod integrity;
pub mod service;
pub mod state;
pub mod traits;
pub mod value;

// Re-export core types for convenience
pub use config::{CacheConfig, StoreConfig};
pub use error::{Error, Result};
pub use integrity::{IntegrityReport, RemoteContainer};
pub use service::{
    CacheService, CacheStats, CachedValues, Classification, ConfirmSummary,
    ContainerIdentity, ContainerSummary, open_cache,
};
pub use state::{FileCacheStore, MemoryCacheStore};
pub use traits::{CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert};
pub use value::{CacheValue, EntryType, Fqdn, IpRange, normalize_fqdn, normalize_ip_range};
