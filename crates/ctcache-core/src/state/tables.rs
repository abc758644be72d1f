// # Cache Tables
//
// The in-memory shape shared by every store backend: two entry tables and
// one container table. Backends only add locking and persistence around it.
//
// ```text
// ip_ranges:  container_key -> canonical key -> EntryRow
// fqdns:      container_key -> canonical key -> EntryRow
// containers: container_key -> ContainerRecord
// ```
//
// Empty per-container maps are dropped as soon as their last row goes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::traits::cache_store::{
    CacheEntry, ContainerRecord, RemovedCounts, StoreStats, Upsert,
};
use crate::value::{CacheValue, EntryType};

type Table = BTreeMap<String, BTreeMap<String, EntryRow>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EntryRow {
    value: CacheValue,
    added_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CacheTables {
    #[serde(default)]
    ip_ranges: Table,
    #[serde(default)]
    fqdns: Table,
    #[serde(default)]
    containers: BTreeMap<String, ContainerRecord>,
}

impl CacheTables {
    fn table(&self, entry_type: EntryType) -> &Table {
        match entry_type {
            EntryType::IpRange => &self.ip_ranges,
            EntryType::Fqdn => &self.fqdns,
        }
    }

    fn table_mut(&mut self, entry_type: EntryType) -> &mut Table {
        match entry_type {
            EntryType::IpRange => &mut self.ip_ranges,
            EntryType::Fqdn => &mut self.fqdns,
        }
    }

    pub(crate) fn upsert_touch(
        &mut self,
        container_key: &str,
        value: &CacheValue,
        now: DateTime<Utc>,
    ) -> Upsert {
        let rows = self
            .table_mut(value.entry_type())
            .entry(container_key.to_string())
            .or_default();

        match rows.entry(value.key()) {
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                // A clock that went backwards must not break added_at <= last_seen_at
                row.last_seen_at = now.max(row.added_at);
                Upsert::Touched
            }
            Entry::Vacant(slot) => {
                slot.insert(EntryRow {
                    value: value.clone(),
                    added_at: now,
                    last_seen_at: now,
                });
                Upsert::Created
            }
        }
    }

    pub(crate) fn exists(&self, container_key: &str, value: &CacheValue) -> bool {
        self.table(value.entry_type())
            .get(container_key)
            .is_some_and(|rows| rows.contains_key(&value.key()))
    }

    pub(crate) fn delete(&mut self, container_key: &str, value: &CacheValue) -> bool {
        let table = self.table_mut(value.entry_type());
        let Some(rows) = table.get_mut(container_key) else {
            return false;
        };

        let removed = rows.remove(&value.key()).is_some();
        if rows.is_empty() {
            table.remove(container_key);
        }
        removed
    }

    pub(crate) fn delete_container(&mut self, container_key: &str) -> RemovedCounts {
        self.containers.remove(container_key);
        RemovedCounts {
            ip_ranges: self.ip_ranges.remove(container_key).map_or(0, |r| r.len()),
            fqdns: self.fqdns.remove(container_key).map_or(0, |r| r.len()),
        }
    }

    pub(crate) fn list(
        &self,
        container_key: &str,
        entry_type: Option<EntryType>,
    ) -> Vec<CacheEntry> {
        let types = match entry_type {
            Some(t) => vec![t],
            None => vec![EntryType::IpRange, EntryType::Fqdn],
        };

        let mut entries: Vec<CacheEntry> = types
            .into_iter()
            .filter_map(|t| self.table(t).get(container_key))
            .flat_map(|rows| rows.values())
            .map(|row| CacheEntry {
                container_key: container_key.to_string(),
                value: row.value.clone(),
                added_at: row.added_at,
                last_seen_at: row.last_seen_at,
            })
            .collect();

        entries.sort_by(|a, b| a.value.cmp(&b.value));
        entries
    }

    pub(crate) fn purge_older_than(
        &mut self,
        container_key: &str,
        cutoff: DateTime<Utc>,
    ) -> RemovedCounts {
        RemovedCounts {
            ip_ranges: purge_rows(&mut self.ip_ranges, container_key, cutoff),
            fqdns: purge_rows(&mut self.fqdns, container_key, cutoff),
        }
    }

    pub(crate) fn stats(&self, container_key: Option<&str>) -> StoreStats {
        let in_scope = |key: &String| container_key.is_none_or(|scope| scope == key.as_str());

        let mut stats = StoreStats::default();
        for (entry_type, table) in [
            (EntryType::IpRange, &self.ip_ranges),
            (EntryType::Fqdn, &self.fqdns),
        ] {
            for rows in table.iter().filter(|(key, _)| in_scope(*key)).map(|(_, rows)| rows) {
                let latest = rows.values().map(|row| row.last_seen_at).max();
                stats.last_seen_at = stats.last_seen_at.max(latest);

                match entry_type {
                    EntryType::IpRange => {
                        stats.ip_ranges += rows.len();
                        stats.containers_with_ip_ranges += 1;
                    }
                    EntryType::Fqdn => {
                        stats.fqdns += rows.len();
                        stats.containers_with_fqdns += 1;
                    }
                }
            }
        }
        stats.tracked_containers = self.containers.keys().filter(|key| in_scope(*key)).count();
        stats
    }

    pub(crate) fn record_container(&mut self, record: &ContainerRecord) {
        self.containers.insert(record.key.clone(), record.clone());
    }

    pub(crate) fn container(&self, container_key: &str) -> Option<ContainerRecord> {
        self.containers.get(container_key).cloned()
    }

    pub(crate) fn list_containers(&self) -> Vec<ContainerRecord> {
        self.containers.values().cloned().collect()
    }

    /// Total number of entries across both tables
    pub(crate) fn len(&self) -> usize {
        self.ip_ranges
            .values()
            .chain(self.fqdns.values())
            .map(|rows| rows.len())
            .sum()
    }
}

fn purge_rows(table: &mut Table, container_key: &str, cutoff: DateTime<Utc>) -> usize {
    let Some(rows) = table.get_mut(container_key) else {
        return 0;
    };

    let before = rows.len();
    rows.retain(|_, row| row.last_seen_at >= cutoff);
    let removed = before - rows.len();

    if rows.is_empty() {
        table.remove(container_key);
    }
    removed
}
