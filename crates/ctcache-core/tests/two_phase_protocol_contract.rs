//! Architectural Contract Test: Two-Phase Protocol
//!
//! This test verifies that the cache never runs ahead of the remote
//! container.
//!
//! Constraints verified:
//! - Classification reads the store and never mutates it
//! - Only the `new` subset is sent to the remote
//! - A failed remote call leaves the cache exactly as it was
//! - Store failures propagate instead of reading as an empty cache
//!
//! If this test fails, the cache can claim values the remote never accepted.

mod common;

use common::*;
use ctcache_core::{CacheService, EntryType};

#[tokio::test]
async fn classification_is_pure() {
    let cache = memory_cache();
    let values = fqdns(&["a.com", "b.com"]);
    cache
        .confirm_added("Allowed", EntryType::Fqdn, &values[..1], t0())
        .await
        .unwrap();

    let first = cache
        .classify_batch("Allowed", EntryType::Fqdn, &values)
        .await
        .unwrap();
    let second = cache
        .classify_batch("Allowed", EntryType::Fqdn, &values)
        .await
        .unwrap();

    assert_eq!(first, second);
    let stats = cache.cache_stats(Some("Allowed")).await.unwrap();
    assert_eq!(stats.fqdns, 1, "classification must not insert anything");
}

#[tokio::test]
async fn only_new_values_reach_the_remote() {
    let cache = memory_cache();
    let remote = SimulatedRemote::new();

    let outcome = add_through_cache(
        &cache,
        &remote,
        "Allowed",
        EntryType::Fqdn,
        &fqdns(&["a.com"]),
        days_before(t0(), 2),
    )
    .await
    .unwrap();
    assert_eq!(outcome, AddOutcome::Sent { new: 1 });

    let outcome = add_through_cache(
        &cache,
        &remote,
        "Allowed",
        EntryType::Fqdn,
        &fqdns(&["A.com.", "b.com"]),
        t0(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, AddOutcome::Sent { new: 1 });

    assert_eq!(remote.sent(), vec![fqdns(&["a.com"]), fqdns(&["b.com"])]);
    assert_eq!(remote.size(), 2);
}

#[tokio::test]
async fn fully_cached_batch_skips_the_remote() {
    let cache = memory_cache();
    let remote = SimulatedRemote::new();
    let values = fqdns(&["a.com", "b.com"]);

    add_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values, t0())
        .await
        .unwrap();
    let outcome =
        add_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values, t0())
            .await
            .unwrap();

    assert_eq!(outcome, AddOutcome::SkippedRemote);
    assert_eq!(remote.add_call_count(), 1);
}

#[tokio::test]
async fn failed_remote_add_leaves_cache_untouched() {
    let cache = memory_cache();
    let remote = SimulatedRemote::new();
    let values = fqdns(&["a.com"]);

    remote.fail_next_call();
    let outcome = add_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values, t0())
        .await
        .unwrap();
    assert_eq!(outcome, AddOutcome::RemoteFailed);

    let stats = cache.cache_stats(Some("Allowed")).await.unwrap();
    assert!(!stats.cached);
    assert!(!stats.known, "an unconfirmed add must not register the container");

    // The retry sends the value again because the cache never claimed it
    let outcome = add_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values, t0())
        .await
        .unwrap();
    assert_eq!(outcome, AddOutcome::Sent { new: 1 });
    assert_eq!(remote.add_call_count(), 2);
}

#[tokio::test]
async fn failed_remote_remove_keeps_entries() {
    let cache = memory_cache();
    let remote = SimulatedRemote::new();
    let values = fqdns(&["a.com", "b.com"]);
    add_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values, t0())
        .await
        .unwrap();

    remote.fail_next_call();
    let removed = remove_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values[..1])
        .await
        .unwrap();
    assert!(!removed);
    assert_eq!(cache.cache_stats(Some("Allowed")).await.unwrap().fqdns, 2);

    let removed = remove_through_cache(&cache, &remote, "Allowed", EntryType::Fqdn, &values[..1])
        .await
        .unwrap();
    assert!(removed);

    let classification = cache
        .classify_batch("Allowed", EntryType::Fqdn, &values[..1])
        .await
        .unwrap();
    assert_eq!(classification.new_values(), fqdns(&["a.com"]));
}

#[tokio::test]
async fn confirm_removed_tolerates_absent_values() {
    let cache = memory_cache();

    let removed = cache
        .confirm_removed("Allowed", EntryType::Fqdn, &fqdns(&["never-added.com"]))
        .await
        .unwrap();

    assert_eq!(removed, 0);
}

#[tokio::test]
async fn store_failures_propagate() {
    let cache = CacheService::new(Box::new(UnavailableStore::new()));
    let remote = SimulatedRemote::new();

    let err = add_through_cache(
        &cache,
        &remote,
        "Allowed",
        EntryType::Fqdn,
        &fqdns(&["a.com"]),
        t0(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ctcache_core::Error::StoreUnavailable(_)));
    assert_eq!(
        remote.add_call_count(),
        0,
        "an unreadable cache must not be mistaken for an empty one"
    );
    assert!(cache.cache_stats(None).await.is_err());
}

#[tokio::test]
async fn removal_then_classify_reports_new() {
    let cache = memory_cache();
    let values = vec![
        ip_range("203.0.113.1", "203.0.113.100"),
        ip_range("10.0.0.1", "10.0.0.1"),
    ];
    cache
        .confirm_added("Blocked IPs", EntryType::IpRange, &values, t0())
        .await
        .unwrap();

    cache
        .confirm_removed("Blocked IPs", EntryType::IpRange, &values)
        .await
        .unwrap();
    let classification = cache
        .classify_batch("Blocked IPs", EntryType::IpRange, &values)
        .await
        .unwrap();

    assert!(classification.already_cached.is_empty());
    assert_eq!(classification.new.len(), 2);
}
