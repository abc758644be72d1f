//! Test doubles and common utilities for cache contract tests
//!
//! This module provides a simulated remote container and a store that is
//! always unavailable, plus the caller-side add/remove flow that real
//! container-operation code runs around the cache.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ctcache_core::error::{Error, Result};
use ctcache_core::traits::{
    CacheEntry, CacheStore, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
use ctcache_core::{CacheService, CacheValue, EntryType, MemoryCacheStore};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A remote container that records every call made to it
#[derive(Default)]
pub struct SimulatedRemote {
    values: Mutex<BTreeSet<CacheValue>>,
    /// Values sent by each add call, in order
    sent: Mutex<Vec<Vec<CacheValue>>>,
    add_call_count: AtomicUsize,
    remove_call_count: AtomicUsize,
    fail_next: AtomicBool,
}

impl SimulatedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next add or remove call fail
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Get the number of times add() was called
    pub fn add_call_count(&self) -> usize {
        self.add_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times remove() was called
    pub fn remove_call_count(&self) -> usize {
        self.remove_call_count.load(Ordering::SeqCst)
    }

    /// Values sent by each add call
    pub fn sent(&self) -> Vec<Vec<CacheValue>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn size(&self) -> u64 {
        self.values.lock().unwrap().len() as u64
    }

    /// Insert a value behind the cache's back, as another tool would
    pub fn insert_out_of_band(&self, value: CacheValue) {
        self.values.lock().unwrap().insert(value);
    }

    pub fn add(&self, values: &[CacheValue]) -> std::result::Result<(), String> {
        self.add_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("remote rejected the request".to_string());
        }
        self.sent.lock().unwrap().push(values.to_vec());
        self.values.lock().unwrap().extend(values.iter().cloned());
        Ok(())
    }

    pub fn remove(&self, values: &[CacheValue]) -> std::result::Result<(), String> {
        self.remove_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("remote rejected the request".to_string());
        }
        let mut stored = self.values.lock().unwrap();
        for value in values {
            stored.remove(value);
        }
        Ok(())
    }
}

/// What the caller-side add flow did
#[derive(Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Everything was cached; no remote call was made
    SkippedRemote,
    /// The remote call for the new subset succeeded and was confirmed
    Sent { new: usize },
    /// The remote call failed; the cache was left alone
    RemoteFailed,
}

/// The classify → remote → confirm flow a container-operation caller runs
pub async fn add_through_cache(
    cache: &CacheService,
    remote: &SimulatedRemote,
    container: &str,
    entry_type: EntryType,
    values: &[CacheValue],
    now: DateTime<Utc>,
) -> Result<AddOutcome> {
    let classification = cache.classify_batch(container, entry_type, values).await?;

    let outcome = if classification.all_cached() {
        AddOutcome::SkippedRemote
    } else {
        let new = classification.new_values();
        if remote.add(&new).is_err() {
            return Ok(AddOutcome::RemoteFailed);
        }
        AddOutcome::Sent { new: new.len() }
    };

    cache.confirm_added(container, entry_type, values, now).await?;
    Ok(outcome)
}

/// The remove flow: remote first, evict only on success
pub async fn remove_through_cache(
    cache: &CacheService,
    remote: &SimulatedRemote,
    container: &str,
    entry_type: EntryType,
    values: &[CacheValue],
) -> Result<bool> {
    if remote.remove(values).is_err() {
        return Ok(false);
    }
    cache.confirm_removed(container, entry_type, values).await?;
    Ok(true)
}

/// A store whose every operation fails, as with an unwritable cache file
pub struct UnavailableStore {
    calls: AtomicUsize,
}

impl UnavailableStore {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::store_unavailable("disk I/O error"))
    }
}

#[async_trait::async_trait]
impl CacheStore for UnavailableStore {
    async fn upsert_touch(&self, _: &str, _: &CacheValue, _: DateTime<Utc>) -> Result<Upsert> {
        self.fail()
    }

    async fn exists(&self, _: &str, _: &CacheValue) -> Result<bool> {
        self.fail()
    }

    async fn delete(&self, _: &str, _: &CacheValue) -> Result<bool> {
        self.fail()
    }

    async fn delete_container(&self, _: &str) -> Result<RemovedCounts> {
        self.fail()
    }

    async fn list(&self, _: &str, _: Option<EntryType>) -> Result<Vec<CacheEntry>> {
        self.fail()
    }

    async fn purge_older_than(&self, _: &str, _: DateTime<Utc>) -> Result<RemovedCounts> {
        self.fail()
    }

    async fn stats(&self, _: Option<&str>) -> Result<StoreStats> {
        self.fail()
    }

    async fn record_container(&self, _: &ContainerRecord) -> Result<()> {
        self.fail()
    }

    async fn container(&self, _: &str) -> Result<Option<ContainerRecord>> {
        self.fail()
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        self.fail()
    }

    async fn flush(&self) -> Result<()> {
        self.fail()
    }
}

/// A service over a fresh memory store
pub fn memory_cache() -> CacheService {
    CacheService::new(Box::new(MemoryCacheStore::new()))
}

pub fn fqdns(names: &[&str]) -> Vec<CacheValue> {
    names
        .iter()
        .map(|name| CacheValue::fqdn(name).expect("valid fqdn"))
        .collect()
}

pub fn ip_range(from: &str, to: &str) -> CacheValue {
    CacheValue::ip_range(from, to).expect("valid range")
}

/// A fixed reference instant, so tests never depend on the wall clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap()
}

pub fn days_before(instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    instant - Duration::days(days)
}
