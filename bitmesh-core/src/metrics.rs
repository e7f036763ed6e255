//! Drop and relay counters.
//!
//! Malformed frames, duplicate packets, and failed link writes are swallowed
//! by policy; these counters are how that lost traffic stays observable.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MeshMetrics {
    pub packets_received: AtomicU64,
    pub packets_relayed: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub signature_failures: AtomicU64,
    pub link_write_failures: AtomicU64,
    pub fragments_expired: AtomicU64,
    pub rate_limited: AtomicU64,
}

impl MeshMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_relayed: self.packets_relayed.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            signature_failures: self.signature_failures.load(Ordering::Relaxed),
            link_write_failures: self.link_write_failures.load(Ordering::Relaxed),
            fragments_expired: self.fragments_expired.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_relayed: u64,
    pub duplicates_dropped: u64,
    pub malformed_frames: u64,
    pub signature_failures: u64,
    pub link_write_failures: u64,
    pub fragments_expired: u64,
    pub rate_limited: u64,
}
