//! Core traits for the container cache
//!
//! - [`CacheStore`]: Persistent storage of cached entries and container records

pub mod cache_store;

pub use cache_store::{
    CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
