//! Minimal embedding example for ctcache-core
//!
//! This example drives the classify → remote call → confirm protocol around
//! a custom in-process "remote" standing in for a real network client. The
//! application owns the remote connection; the cache only records what the
//! remote accepted.

use chrono::Utc;
use ctcache_core::{
    CacheConfig, CacheService, CacheValue, ContainerIdentity, EntryType, Result, StoreConfig,
    open_cache,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;

/// What a network client must offer the caller
#[async_trait::async_trait]
trait RemoteContainers: Send + Sync {
    /// Create a container; returns its remote identifier
    async fn create(&self, name: &str, values: &[CacheValue]) -> std::result::Result<String, String>;

    /// Add values; returns the container size reported afterwards
    async fn add(&self, name: &str, values: &[CacheValue]) -> std::result::Result<u64, String>;

    /// Remove values; returns the container size reported afterwards
    async fn remove(&self, name: &str, values: &[CacheValue]) -> std::result::Result<u64, String>;
}

/// Custom remote for embedded usage
#[derive(Default)]
struct EmbeddedRemote {
    containers: Mutex<BTreeMap<String, BTreeSet<CacheValue>>>,
    calls: AtomicUsize,
}

impl EmbeddedRemote {
    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteContainers for EmbeddedRemote {
    async fn create(&self, name: &str, values: &[CacheValue]) -> std::result::Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        println!("[Remote] create '{}' with {} value(s)", name, values.len());

        let mut containers = self.containers.lock().map_err(|e| e.to_string())?;
        containers.insert(name.to_string(), values.iter().cloned().collect());
        Ok(format!("remote-{}", containers.len()))
    }

    async fn add(&self, name: &str, values: &[CacheValue]) -> std::result::Result<u64, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        println!("[Remote] add {} value(s) to '{}'", values.len(), name);

        let mut containers = self.containers.lock().map_err(|e| e.to_string())?;
        let container = containers
            .get_mut(name)
            .ok_or_else(|| format!("container '{}' does not exist", name))?;
        container.extend(values.iter().cloned());
        Ok(container.len() as u64)
    }

    async fn remove(&self, name: &str, values: &[CacheValue]) -> std::result::Result<u64, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        println!("[Remote] remove {} value(s) from '{}'", values.len(), name);

        let mut containers = self.containers.lock().map_err(|e| e.to_string())?;
        let container = containers
            .get_mut(name)
            .ok_or_else(|| format!("container '{}' does not exist", name))?;
        for value in values {
            container.remove(value);
        }
        Ok(container.len() as u64)
    }
}

/// Add values through the cache: only the uncached subset reaches the remote
async fn add_values(
    cache: &CacheService,
    remote: &dyn RemoteContainers,
    identity: &ContainerIdentity,
    values: &[CacheValue],
) -> Result<()> {
    let classification = cache
        .classify_batch(&identity.key, identity.kind, values)
        .await?;

    if classification.all_cached() {
        println!("   all {} value(s) cached, remote call skipped", values.len());
    } else {
        match remote.add(&identity.key, &classification.new_values()).await {
            Ok(size) => cache.confirm_synced(identity, Some(size), Utc::now()).await?,
            Err(e) => {
                println!("   remote add failed ({}), cache left untouched", e);
                return Ok(());
            }
        }
    }

    let summary = cache
        .confirm_added(&identity.key, identity.kind, values, Utc::now())
        .await?;
    println!(
        "   confirmed: {} created, {} touched",
        summary.created, summary.touched
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    println!("=== Embedded ctcache-core Example ===\n");

    // Explicit configuration: no environment, no files
    let config = CacheConfig {
        store: StoreConfig::Memory,
        ..CacheConfig::new()
    };
    let Some(cache) = open_cache(&config).await? else {
        println!("Cache disabled, nothing to demonstrate");
        return Ok(());
    };
    let remote = EmbeddedRemote::default();

    println!("1. Creating container 'Blocked IPs'...");
    let initial = vec![CacheValue::ip_range("203.0.113.1", "203.0.113.100")?];
    let remote_id = match remote.create("Blocked IPs", &initial).await {
        Ok(remote_id) => remote_id,
        Err(e) => {
            println!("   remote create failed ({}), nothing cached", e);
            return Ok(());
        }
    };
    let identity = ContainerIdentity::new("Blocked IPs", EntryType::IpRange).with_remote_id(remote_id);
    cache
        .write_through_create(&identity, &initial, Utc::now())
        .await?;

    println!("\n2. Adding a batch where one range is already cached...");
    let batch = vec![
        CacheValue::ip_range("203.0.113.001", "203.0.113.100")?,
        CacheValue::ip_range("198.51.100.7", "198.51.100.7")?,
    ];
    add_values(&cache, &remote, &identity, &batch).await?;

    println!("\n3. Adding the same batch again...");
    add_values(&cache, &remote, &identity, &batch).await?;

    println!("\n4. Removing one range...");
    let removal = &batch[1..];
    match remote.remove(&identity.key, removal).await {
        Ok(size) => {
            let removed = cache
                .confirm_removed(&identity.key, identity.kind, removal)
                .await?;
            cache.confirm_synced(&identity, Some(size), Utc::now()).await?;
            println!("   evicted {} cached value(s)", removed);
        }
        Err(e) => println!("   remote remove failed ({}), cache left untouched", e),
    }

    println!("\n5. Cache contents:");
    for summary in cache.list_containers().await? {
        println!(
            "   {} [{}] remote size {:?}, {} cached",
            summary.name,
            summary.kind,
            summary.remote_size,
            summary.total_cached()
        );
    }
    for entry in cache.list_cached_values("Blocked IPs").await?.ip_ranges {
        println!("   - {} (last seen {})", entry.value, entry.last_seen_at);
    }

    println!("\n=== Embedding Successful ===");
    println!("Remote calls made: {}", remote.call_count());
    println!("Key Points:");
    println!("- The remote call only ever carries uncached values");
    println!("- The cache is written strictly after remote success");
    println!("- Configuration is passed in, never read from globals");

    Ok(())
}
