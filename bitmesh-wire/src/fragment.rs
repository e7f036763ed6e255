//! Splitting and reassembling frames around the link MTU.
//!
//! Radio links carry small datagrams; encoded frames regularly exceed them.
//! Oversized frames are cut into chunks, each prefixed with a 9-byte header
//! `[0xBB][index:u16][total:u16][messageId:u32]` (big-endian). The receiver
//! collects chunks per `(sender, messageId)` slot and re-emits the original
//! frame once every index is present. Slots that stall are evicted after 30
//! seconds of inactivity.

use crate::constants::{
    FRAGMENT_HEADER_SIZE, FRAGMENT_MARKER, MIN_LINK_MTU, REASSEMBLY_TIMEOUT,
};
use crate::error::{WireError, WireResult};
use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// Splits frames that exceed the link MTU into marked chunks.
///
/// Message ids come from a 32-bit counter salted randomly at construction,
/// so two restarts of the same node do not reuse ids within a slot lifetime.
#[derive(Debug)]
pub struct Fragmenter {
    next_id: u32,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fragmenter {
    pub fn new() -> Self {
        Self {
            next_id: rand::thread_rng().gen(),
        }
    }

    /// A fragmenter with a fixed id seed, for deterministic tests.
    pub fn with_seed(seed: u32) -> Self {
        Self { next_id: seed }
    }

    /// Splits `frame` into datagrams that fit `link_mtu`.
    ///
    /// Frames small enough to travel with room for a fragment header are
    /// emitted unchanged as a single datagram.
    pub fn split(&mut self, frame: &[u8], link_mtu: usize) -> WireResult<Vec<Vec<u8>>> {
        if link_mtu < MIN_LINK_MTU {
            return Err(WireError::InvalidMtu);
        }
        if frame.len() <= link_mtu - FRAGMENT_HEADER_SIZE {
            return Ok(vec![frame.to_vec()]);
        }

        let chunk_size = link_mtu - FRAGMENT_HEADER_SIZE;
        let total = frame.len().div_ceil(chunk_size);
        if total > u16::MAX as usize {
            return Err(WireError::MessageTooLarge);
        }

        let message_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let mut datagrams = Vec::with_capacity(total);
        for (index, chunk) in frame.chunks(chunk_size).enumerate() {
            let mut datagram = Vec::with_capacity(FRAGMENT_HEADER_SIZE + chunk.len());
            datagram.push(FRAGMENT_MARKER);
            datagram.extend_from_slice(&(index as u16).to_be_bytes());
            datagram.extend_from_slice(&(total as u16).to_be_bytes());
            datagram.extend_from_slice(&message_id.to_be_bytes());
            datagram.extend_from_slice(chunk);
            datagrams.push(datagram);
        }
        Ok(datagrams)
    }
}

/// Outcome of feeding one inbound datagram to the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// The datagram was not a fragment; process it as a whole frame.
    NotFragment,
    /// The fragment was stored; the message is still incomplete.
    Pending,
    /// The final fragment arrived; here is the reassembled frame.
    Complete(Vec<u8>),
    /// The fragment was invalid (index out of range, empty total) and was
    /// discarded.
    Dropped,
}

#[derive(Debug)]
struct Slot {
    chunks: Vec<Option<Vec<u8>>>,
    received: usize,
    last_activity: Instant,
}

impl Slot {
    fn new(total: usize, now: Instant) -> Self {
        Self {
            chunks: vec![None; total],
            received: 0,
            last_activity: now,
        }
    }
}

/// Collects fragments per `(sender, messageId)` until a frame completes.
///
/// Keyed by whatever identifies the sending link to the caller. Duplicate
/// indexes overwrite idempotently; a fragment arriving after its slot was
/// evicted simply restarts the slot.
#[derive(Debug, Default)]
pub struct Reassembler<K: Eq + Hash + Clone> {
    slots: HashMap<(K, u32), Slot>,
}

impl<K: Eq + Hash + Clone> Reassembler<K> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Feeds one inbound datagram from `sender`.
    pub fn ingest(&mut self, sender: K, datagram: &[u8], now: Instant) -> Ingest {
        if datagram.len() <= FRAGMENT_HEADER_SIZE || datagram[0] != FRAGMENT_MARKER {
            return Ingest::NotFragment;
        }

        let index = u16::from_be_bytes([datagram[1], datagram[2]]) as usize;
        let total = u16::from_be_bytes([datagram[3], datagram[4]]) as usize;
        let message_id = u32::from_be_bytes([datagram[5], datagram[6], datagram[7], datagram[8]]);
        if total == 0 || index >= total {
            return Ingest::Dropped;
        }

        let key = (sender, message_id);
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(total, now));
        if slot.chunks.len() != total {
            // Same message id reused with a different shape: restart.
            *slot = Slot::new(total, now);
        }
        slot.last_activity = now;
        if slot.chunks[index].is_none() {
            slot.received += 1;
        }
        slot.chunks[index] = Some(datagram[FRAGMENT_HEADER_SIZE..].to_vec());

        if slot.received < total {
            return Ingest::Pending;
        }

        let slot = self.slots.remove(&key).expect("slot present");
        let mut frame = Vec::new();
        for chunk in slot.chunks.into_iter().flatten() {
            frame.extend_from_slice(&chunk);
        }
        Ingest::Complete(frame)
    }

    /// Evicts slots idle past the reassembly timeout. Returns the eviction
    /// count so callers can account for the lost frames.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now.duration_since(slot.last_activity) < REASSEMBLY_TIMEOUT);
        before - self.slots.len()
    }

    /// Number of in-flight reassembly slots.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }
}
