//! The flood-relay decision: whether an inbound packet is re-emitted.
//!
//! The engine only plans; the service executes the fan-out so that the
//! arrival link can be excluded and per-link failures stay best-effort.

use bitmesh_wire::packet::Packet;
use bitmesh_wire::PeerId;

#[derive(Debug, Clone, Copy)]
pub struct RelayEngine {
    self_id: PeerId,
}

impl RelayEngine {
    pub fn new(self_id: PeerId) -> Self {
        Self { self_id }
    }

    /// Produces the forwarded copy of `packet`, or `None` when propagation
    /// stops here.
    ///
    /// Callers must have already run the dedup check; duplicates never reach
    /// this point. Rules: never forward our own packets, never forward with
    /// `ttl <= 1`, and decrement `ttl` on the copy. All other fields are
    /// preserved, signature included, since the preimage excludes `ttl`.
    pub fn plan(&self, packet: &Packet) -> Option<Packet> {
        if packet.sender_id == self.self_id {
            return None;
        }
        if packet.ttl <= 1 {
            return None;
        }
        let mut forwarded = packet.clone();
        forwarded.ttl = packet.ttl - 1;
        Some(forwarded)
    }
}
