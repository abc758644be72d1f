//! Rendering of command results as text or JSON on stdout

use anyhow::Result;
use chrono::{DateTime, Utc};
use ctcache_core::{
    CacheEntry, CacheStats, CachedValues, ContainerSummary, IntegrityReport, RemovedCounts,
};
use serde::Serialize;

use crate::OutputFormat;

fn json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

pub fn stats(stats: &CacheStats, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(stats);
    }

    match &stats.container {
        Some(container) => {
            println!("Container: {}", container);
            if !stats.known {
                println!("  Not cached (never recorded)");
                return Ok(());
            }
            if let Some(kind) = stats.kind {
                println!("  Kind:            {}", kind);
            }
            if let Some(size) = stats.remote_size {
                println!("  Remote size:     {}", size);
            }
            println!("  Last sync:       {}", timestamp(stats.last_sync_at));
        }
        None => {
            println!("Cache statistics");
            println!("  Containers:      {}", stats.tracked_containers);
            println!("    with IP ranges: {}", stats.containers_with_ip_ranges);
            println!("    with FQDNs:     {}", stats.containers_with_fqdns);
        }
    }

    println!("  IP ranges:       {}", stats.ip_ranges);
    println!("  FQDNs:           {}", stats.fqdns);
    println!("  Total:           {}", stats.total);
    println!("  Last seen:       {}", timestamp(stats.last_seen_at));
    if let Some(path) = &stats.cache_file {
        println!("  Cache file:      {}", path.display());
    }
    Ok(())
}

pub fn cached_values(values: &CachedValues, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(values);
    }

    if values.is_empty() {
        println!("No cached values for '{}'", values.container);
        return Ok(());
    }

    println!("Cached values for '{}'", values.container);
    print_entries("IP ranges", &values.ip_ranges);
    print_entries("FQDNs", &values.fqdns);
    Ok(())
}

fn print_entries(title: &str, entries: &[CacheEntry]) {
    if entries.is_empty() {
        return;
    }

    println!("  {} ({}):", title, entries.len());
    for entry in entries {
        println!(
            "    {:<40} added {}  last seen {}",
            entry.value.to_string(),
            timestamp(Some(entry.added_at)),
            timestamp(Some(entry.last_seen_at))
        );
    }
}

#[derive(Serialize)]
struct RemovedOutput<'a> {
    container: &'a str,
    #[serde(flatten)]
    removed: &'a RemovedCounts,
    total: usize,
}

pub fn removed(
    action: &str,
    container: &str,
    removed: &RemovedCounts,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        return json(&RemovedOutput {
            container,
            removed,
            total: removed.total(),
        });
    }

    println!(
        "{} {} entries from '{}' ({} IP ranges, {} FQDNs)",
        action,
        removed.total(),
        container,
        removed.ip_ranges,
        removed.fqdns
    );
    Ok(())
}

pub fn containers(containers: &[ContainerSummary], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(containers);
    }

    if containers.is_empty() {
        println!("No containers recorded");
        return Ok(());
    }

    println!(
        "{:<32} {:<8} {:>11} {:>8}  LAST SYNC",
        "NAME", "KIND", "REMOTE SIZE", "CACHED"
    );
    for container in containers {
        println!(
            "{:<32} {:<8} {:>11} {:>8}  {}",
            container.name,
            container.kind.to_string(),
            container
                .remote_size
                .map_or_else(|| "-".to_string(), |size| size.to_string()),
            container.total_cached(),
            timestamp(Some(container.last_sync_at))
        );
    }
    Ok(())
}

pub fn integrity(report: &IntegrityReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(report);
    }

    println!(
        "Checked {} remote and {} cached containers, {} present on both sides",
        report.remote_containers, report.cached_containers, report.validated
    );

    for missing in &report.missing_in_cache {
        println!("  missing in cache:  {} ({}, size {})", missing.name, missing.kind, missing.size);
    }
    for missing in &report.missing_in_remote {
        println!("  missing in remote: {} ({})", missing.name, missing.kind);
    }
    for mismatch in &report.size_mismatches {
        println!(
            "  size mismatch:     {} (remote {}, cached {}, {:+})",
            mismatch.name,
            mismatch.remote_size,
            mismatch.cached_size,
            mismatch.difference()
        );
    }

    println!("Result: {}", if report.passed { "PASSED" } else { "FAILED" });
    Ok(())
}
