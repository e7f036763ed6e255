//! Outbound link management: admission, failure backoff, peer bookkeeping.
//!
//! The radio can either scan or connect, not both; the service pauses the
//! scan around every attempt and this module decides which attempts are
//! worth making. Devices that fail accumulate a linearly growing cooldown
//! (`backoff * failures`) that a single success clears.

use crate::adapter::DeviceId;
use bitmesh_wire::constants::DEFAULT_LINK_MTU;
use bitmesh_wire::PeerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Peers unseen for this long are pruned unless connected.
pub const STALE_PEER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    /// Hard cap on simultaneous links.
    pub max_connections: usize,
    /// Candidates below this RSSI are ignored.
    pub rssi_floor: i16,
    /// Base cooldown after a failed attempt; multiplied by the failure count.
    pub failure_backoff: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            max_connections: 7,
            rssi_floor: -80,
            failure_backoff: Duration::from_secs(30),
        }
    }
}

/// Why a candidate was or was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    BudgetExhausted,
    SignalTooWeak,
    BackingOff { until: Instant },
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    failures: u32,
    last_failure: Instant,
}

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub device: DeviceId,
    /// Known once the peer announces itself.
    pub peer_id: Option<PeerId>,
    pub nickname: Option<String>,
    pub rssi: i16,
    pub last_seen: Instant,
    pub is_connected: bool,
}

#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub mtu: usize,
    pub peer_id: Option<PeerId>,
}

/// The tables behind the scan/connect state machine.
#[derive(Debug)]
pub struct ConnectionManager {
    policy: ConnectionPolicy,
    links: HashMap<DeviceId, LinkInfo>,
    peers: HashMap<DeviceId, PeerInfo>,
    failures: HashMap<DeviceId, FailureRecord>,
}

impl ConnectionManager {
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            policy,
            links: HashMap::new(),
            peers: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// The admission policy: budget, RSSI floor, then failure backoff.
    pub fn should_connect(&self, device: &DeviceId, rssi: i16, now: Instant) -> Admission {
        if self.links.len() >= self.policy.max_connections {
            return Admission::BudgetExhausted;
        }
        if rssi < self.policy.rssi_floor {
            return Admission::SignalTooWeak;
        }
        if let Some(until) = self.next_allowed_attempt(device) {
            if now < until {
                return Admission::BackingOff { until };
            }
        }
        Admission::Accept
    }

    /// `lastFailure + backoff * failures`, if the device has a failure record.
    pub fn next_allowed_attempt(&self, device: &DeviceId) -> Option<Instant> {
        self.failures
            .get(device)
            .map(|record| record.last_failure + self.policy.failure_backoff * record.failures)
    }

    /// Records a scan sighting, creating or refreshing the peer entry.
    pub fn observe_scan(&mut self, device: DeviceId, rssi: i16, now: Instant) {
        let connected = self.links.contains_key(&device);
        self.peers
            .entry(device.clone())
            .and_modify(|peer| {
                peer.rssi = rssi;
                peer.last_seen = now;
                peer.is_connected = connected;
            })
            .or_insert(PeerInfo {
                device,
                peer_id: None,
                nickname: None,
                rssi,
                last_seen: now,
                is_connected: connected,
            });
    }

    /// The strongest admissible candidate not already connected.
    pub fn best_candidate(&self, now: Instant) -> Option<(DeviceId, i16)> {
        self.peers
            .values()
            .filter(|peer| !self.links.contains_key(&peer.device))
            .filter(|peer| self.should_connect(&peer.device, peer.rssi, now) == Admission::Accept)
            .max_by_key(|peer| peer.rssi)
            .map(|peer| (peer.device.clone(), peer.rssi))
    }

    /// A connect attempt failed: bump the failure record.
    pub fn record_failure(&mut self, device: &DeviceId, now: Instant) {
        let record = self
            .failures
            .entry(device.clone())
            .or_insert(FailureRecord {
                failures: 0,
                last_failure: now,
            });
        record.failures += 1;
        record.last_failure = now;
        tracing::debug!(%device, failures = record.failures, "connect attempt failed");
    }

    /// A link came up: add it to the map and clear the failure record.
    pub fn record_success(&mut self, device: &DeviceId, mtu: usize, now: Instant) {
        self.failures.remove(device);
        self.links.insert(
            device.clone(),
            LinkInfo {
                mtu,
                peer_id: self.peers.get(device).and_then(|p| p.peer_id),
            },
        );
        if let Some(peer) = self.peers.get_mut(device) {
            peer.is_connected = true;
            peer.last_seen = now;
        } else {
            self.peers.insert(
                device.clone(),
                PeerInfo {
                    device: device.clone(),
                    peer_id: None,
                    nickname: None,
                    rssi: 0,
                    last_seen: now,
                    is_connected: true,
                },
            );
        }
    }

    pub fn record_disconnect(&mut self, device: &DeviceId) {
        self.links.remove(device);
        if let Some(peer) = self.peers.get_mut(device) {
            peer.is_connected = false;
        }
    }

    /// Drops every link, e.g. when the adapter turns off.
    pub fn clear_links(&mut self) {
        self.links.clear();
        for peer in self.peers.values_mut() {
            peer.is_connected = false;
        }
    }

    /// The peer id currently bound to a device, if any.
    pub fn peer_binding(&self, device: &DeviceId) -> Option<PeerId> {
        self.peers.get(device).and_then(|peer| peer.peer_id)
    }

    pub fn peer_info(&self, device: &DeviceId) -> Option<PeerInfo> {
        self.peers.get(device).cloned()
    }

    /// Binds an announced identity to the device it arrived from.
    pub fn bind_peer(&mut self, device: &DeviceId, peer_id: PeerId, nickname: Option<String>) {
        if let Some(peer) = self.peers.get_mut(device) {
            peer.peer_id = Some(peer_id);
            if nickname.is_some() {
                peer.nickname = nickname.clone();
            }
        }
        if let Some(link) = self.links.get_mut(device) {
            link.peer_id = Some(peer_id);
        }
    }

    /// Prunes peers unseen for five minutes that are not connected.
    pub fn prune_stale(&mut self, now: Instant) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, peer| {
            peer.is_connected || now.duration_since(peer.last_seen) <= STALE_PEER_TIMEOUT
        });
        before - self.peers.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_linked(&self, device: &DeviceId) -> bool {
        self.links.contains_key(device)
    }

    pub fn link_mtu(&self, device: &DeviceId) -> usize {
        self.links
            .get(device)
            .map(|link| link.mtu)
            .unwrap_or(DEFAULT_LINK_MTU)
    }

    pub fn link_peer(&self, device: &DeviceId) -> Option<PeerId> {
        self.links.get(device).and_then(|link| link.peer_id)
    }

    /// Snapshot of current links as `(device, mtu)` pairs.
    pub fn links(&self) -> Vec<(DeviceId, usize)> {
        self.links
            .iter()
            .map(|(device, link)| (device.clone(), link.mtu))
            .collect()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.device.cmp(&b.device));
        peers
    }
}
