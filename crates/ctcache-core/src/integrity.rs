//! Cache integrity validation
//!
//! Compares a container listing fetched from the remote system with the
//! container records the cache holds. Pure comparison: the report tells the
//! caller where the cache drifted; repairing it is the caller's decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::traits::ContainerRecord;
use crate::value::EntryType;

/// One container as listed by the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContainer {
    pub name: String,
    pub kind: EntryType,
    #[serde(default)]
    pub size: u64,
}

/// A container present on one side only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingContainer {
    pub name: String,
    pub kind: EntryType,
    pub size: u64,
}

/// A container whose remote size differs from the last size the cache recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub name: String,
    pub kind: EntryType,
    pub remote_size: u64,
    pub cached_size: u64,
}

impl SizeMismatch {
    /// Remote size minus cached size
    pub fn difference(&self) -> i64 {
        self.remote_size as i64 - self.cached_size as i64
    }
}

/// Outcome of comparing the remote listing with the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checked_at: DateTime<Utc>,
    pub remote_containers: usize,
    pub cached_containers: usize,
    /// Present remotely, never recorded by the cache
    pub missing_in_cache: Vec<MissingContainer>,
    /// Recorded by the cache, gone from the remote
    pub missing_in_remote: Vec<MissingContainer>,
    pub size_mismatches: Vec<SizeMismatch>,
    /// Containers present on both sides
    pub validated: usize,
    pub passed: bool,
}

impl IntegrityReport {
    /// Build a report from both listings; every list is ordered by name
    pub fn compare(
        remote: &[RemoteContainer],
        cached: &[ContainerRecord],
        checked_at: DateTime<Utc>,
    ) -> Self {
        let remote: BTreeMap<&str, &RemoteContainer> =
            remote.iter().map(|c| (c.name.as_str(), c)).collect();
        let cached: BTreeMap<&str, &ContainerRecord> =
            cached.iter().map(|c| (c.key.as_str(), c)).collect();

        let missing_in_cache: Vec<MissingContainer> = remote
            .values()
            .filter(|c| !cached.contains_key(c.name.as_str()))
            .map(|c| MissingContainer {
                name: c.name.clone(),
                kind: c.kind,
                size: c.size,
            })
            .collect();

        let missing_in_remote: Vec<MissingContainer> = cached
            .values()
            .filter(|c| !remote.contains_key(c.key.as_str()))
            .map(|c| MissingContainer {
                name: c.key.clone(),
                kind: c.kind,
                size: c.remote_size.unwrap_or(0),
            })
            .collect();

        let mut validated = 0;
        let mut size_mismatches = Vec::new();
        for (name, remote_container) in &remote {
            let Some(record) = cached.get(name) else {
                continue;
            };
            validated += 1;

            let cached_size = record.remote_size.unwrap_or(0);
            if remote_container.size != cached_size {
                size_mismatches.push(SizeMismatch {
                    name: name.to_string(),
                    kind: remote_container.kind,
                    remote_size: remote_container.size,
                    cached_size,
                });
            }
        }

        let passed =
            missing_in_cache.is_empty() && missing_in_remote.is_empty() && size_mismatches.is_empty();

        Self {
            checked_at,
            remote_containers: remote.len(),
            cached_containers: cached.len(),
            missing_in_cache,
            missing_in_remote,
            size_mismatches,
            validated,
            passed,
        }
    }
}
