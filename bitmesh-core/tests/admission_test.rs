use bitmesh_core::adapter::DeviceId;
use bitmesh_core::connection::{Admission, ConnectionManager, ConnectionPolicy};
use std::time::{Duration, Instant};

fn manager() -> ConnectionManager {
    ConnectionManager::new(ConnectionPolicy::default())
}

fn dev(name: &str) -> DeviceId {
    DeviceId::new(name)
}

#[test]
fn test_rssi_floor() {
    let manager = manager();
    let now = Instant::now();
    assert_eq!(
        manager.should_connect(&dev("x"), -85, now),
        Admission::SignalTooWeak
    );
    assert_eq!(
        manager.should_connect(&dev("x"), -80, now),
        Admission::Accept
    );
}

#[test]
fn test_budget_cap() {
    let mut manager = manager();
    let now = Instant::now();
    for i in 0..7 {
        manager.record_success(&dev(&format!("linked-{i}")), 182, now);
    }
    assert_eq!(manager.link_count(), 7);
    assert_eq!(
        manager.should_connect(&dev("x"), -70, now),
        Admission::BudgetExhausted
    );

    // One slot frees up and the same candidate is admissible again.
    manager.record_disconnect(&dev("linked-0"));
    assert_eq!(
        manager.should_connect(&dev("x"), -70, now),
        Admission::Accept
    );
}

#[test]
fn test_admission_with_six_links_and_clean_record() {
    let mut manager = manager();
    let now = Instant::now();
    for i in 0..6 {
        manager.record_success(&dev(&format!("linked-{i}")), 182, now);
    }
    assert_eq!(
        manager.should_connect(&dev("x"), -60, now),
        Admission::Accept
    );
}

#[test]
fn test_failure_backoff_window() {
    let mut manager = manager();
    let start = Instant::now();
    let device = dev("flaky");

    manager.record_failure(&device, start);
    let blocked = manager.should_connect(&device, -60, start + Duration::from_secs(29));
    assert!(matches!(blocked, Admission::BackingOff { .. }));
    assert_eq!(
        manager.should_connect(&device, -60, start + Duration::from_secs(31)),
        Admission::Accept
    );
}

#[test]
fn test_backoff_grows_with_failures_and_resets_on_success() {
    let mut manager = manager();
    let start = Instant::now();
    let device = dev("flaky");

    manager.record_failure(&device, start);
    let first = manager.next_allowed_attempt(&device).unwrap();
    assert_eq!(first, start + Duration::from_secs(30));

    // Second failure at t+40: window becomes backoff * 2 from the new
    // failure time, strictly later than before.
    let second_failure = start + Duration::from_secs(40);
    manager.record_failure(&device, second_failure);
    let second = manager.next_allowed_attempt(&device).unwrap();
    assert_eq!(second, second_failure + Duration::from_secs(60));
    assert!(second > first);

    // Success clears the record entirely.
    manager.record_success(&device, 182, second_failure + Duration::from_secs(100));
    assert!(manager.next_allowed_attempt(&device).is_none());
}

#[test]
fn test_best_candidate_prefers_strongest_rssi() {
    let mut manager = manager();
    let now = Instant::now();
    manager.observe_scan(dev("weak"), -75, now);
    manager.observe_scan(dev("strong"), -50, now);
    manager.observe_scan(dev("medium"), -65, now);
    // Below the floor, never a candidate.
    manager.observe_scan(dev("hopeless"), -90, now);

    assert_eq!(manager.best_candidate(now).unwrap().0, dev("strong"));

    // Once connected, the strongest drops out of the running.
    manager.record_success(&dev("strong"), 182, now);
    assert_eq!(manager.best_candidate(now).unwrap().0, dev("medium"));
}

#[test]
fn test_best_candidate_skips_backing_off_devices() {
    let mut manager = manager();
    let now = Instant::now();
    manager.observe_scan(dev("strong"), -50, now);
    manager.observe_scan(dev("weak"), -70, now);
    manager.record_failure(&dev("strong"), now);

    assert_eq!(manager.best_candidate(now).unwrap().0, dev("weak"));
}

#[test]
fn test_stale_peer_pruning() {
    let mut manager = manager();
    let start = Instant::now();
    manager.observe_scan(dev("fresh"), -60, start + Duration::from_secs(290));
    manager.observe_scan(dev("stale"), -60, start);
    manager.observe_scan(dev("stale-but-connected"), -60, start);
    manager.record_success(&dev("stale-but-connected"), 182, start);

    let pruned = manager.prune_stale(start + Duration::from_secs(301));
    assert_eq!(pruned, 1);

    let peers = manager.peers();
    let names: Vec<&str> = peers.iter().map(|p| p.device.as_str()).collect();
    assert!(names.contains(&"fresh"));
    assert!(names.contains(&"stale-but-connected"));
    assert!(!names.contains(&"stale"));
}

#[test]
fn test_peer_binding_and_link_mtu() {
    let mut manager = manager();
    let now = Instant::now();
    let device = dev("friend");
    manager.observe_scan(device.clone(), -55, now);
    manager.record_success(&device, 247, now);

    assert_eq!(manager.link_mtu(&device), 247);
    assert_eq!(manager.link_mtu(&dev("unknown")), 182);

    let peer_id = bitmesh_wire::PeerId::from([9; 8]);
    manager.bind_peer(&device, peer_id, Some("nick".into()));
    assert_eq!(manager.link_peer(&device), Some(peer_id));
    let peers = manager.peers();
    let friend = peers.iter().find(|p| p.device == device).unwrap();
    assert_eq!(friend.peer_id, Some(peer_id));
    assert_eq!(friend.nickname.as_deref(), Some("nick"));
}
