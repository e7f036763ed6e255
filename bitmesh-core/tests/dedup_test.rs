use bitmesh_core::dedup::Deduplicator;
use std::time::{Duration, Instant};

#[test]
fn test_duplicate_detection() {
    let mut dedup = Deduplicator::default();
    let now = Instant::now();
    assert!(!dedup.is_duplicate("a:1:4", now));
    assert!(dedup.is_duplicate("a:1:4", now));
    assert!(dedup.is_duplicate("a:1:4", now + Duration::from_secs(1)));
    assert!(!dedup.is_duplicate("a:2:4", now));
}

#[test]
fn test_capacity_evicts_oldest_fifth() {
    let mut dedup = Deduplicator::new(10, Duration::from_secs(600));
    let start = Instant::now();
    for i in 0..10 {
        assert!(!dedup.is_duplicate(&format!("key-{i}"), start + Duration::from_secs(i)));
    }
    assert_eq!(dedup.len(), 10);

    // The insert that finds the set full evicts the two oldest entries.
    assert!(!dedup.is_duplicate("key-10", start + Duration::from_secs(10)));
    assert_eq!(dedup.len(), 9);

    // key-0 and key-1 were the oldest; they are fresh again.
    assert!(!dedup.is_duplicate("key-0", start + Duration::from_secs(11)));
    // key-2 onward survived.
    for i in 2..=10 {
        assert!(
            dedup.is_duplicate(&format!("key-{i}"), start + Duration::from_secs(12)),
            "key-{i} should have survived eviction"
        );
    }
}

#[test]
fn test_sweep_drops_expired() {
    let mut dedup = Deduplicator::new(100, Duration::from_secs(600));
    let start = Instant::now();
    dedup.is_duplicate("old", start);
    dedup.is_duplicate("fresh", start + Duration::from_secs(595));

    assert_eq!(dedup.sweep(start + Duration::from_secs(601)), 1);
    assert_eq!(dedup.len(), 1);
    assert!(!dedup.is_duplicate("old", start + Duration::from_secs(602)));
    assert!(dedup.is_duplicate("fresh", start + Duration::from_secs(602)));
}

#[test]
fn test_sweep_empty_is_noop() {
    let mut dedup = Deduplicator::default();
    assert_eq!(dedup.sweep(Instant::now()), 0);
    assert!(dedup.is_empty());
}
