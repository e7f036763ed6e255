//! The relay-side implementation of the core transport seam: mesh frames
//! ride the relay network as base64-framed signed events.

use crate::client::{RelayPool, RelayState};
use crate::error::RelayResult;
use crate::event::RelayEvent;
use crate::keys::RelayKeys;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitmesh_core::{
    LinkId, MeshError, MeshResult, MeshStatus, PeerEvent, Transport, TransportStatus,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Ephemeral event kind carrying an opaque mesh frame.
pub const FRAME_EVENT_KIND: u32 = 24242;

pub struct RelayTransport {
    pool: RelayPool,
    keys: RelayKeys,
    /// Geohash scopes attached to outgoing frames; empty means unscoped.
    scopes: Vec<String>,
}

impl RelayTransport {
    pub fn new(pool: RelayPool, keys: RelayKeys, scopes: Vec<String>) -> Self {
        Self { pool, keys, scopes }
    }

    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    fn frame_event(&self, frame: &[u8]) -> RelayResult<RelayEvent> {
        let tags: Vec<Vec<String>> = self
            .scopes
            .iter()
            .map(|scope| vec!["g".to_owned(), scope.clone()])
            .collect();
        RelayEvent::sign_new(
            &self.keys,
            now_secs(),
            FRAME_EVENT_KIND,
            tags,
            BASE64.encode(frame),
        )
    }

    /// Recovers the mesh frame from a frame-carrier event.
    pub fn decode_frame(event: &RelayEvent) -> Option<Vec<u8>> {
        if event.kind != FRAME_EVENT_KIND {
            return None;
        }
        BASE64.decode(&event.content).ok()
    }
}

impl Transport for RelayTransport {
    fn broadcast(&self, frame: &[u8]) -> MeshResult<()> {
        let event = self
            .frame_event(frame)
            .map_err(|error| MeshError::LinkWriteFailed(error.to_string()))?;
        self.pool
            .publish(event, None)
            .map_err(|_| MeshError::Disposed)
    }

    fn unicast(&self, link: &LinkId, frame: &[u8]) -> bool {
        let LinkId::Relay(url) = link else {
            return false;
        };
        if self.pool.states().get(url).copied() != Some(RelayState::Connected) {
            return false;
        }
        match self.frame_event(frame) {
            Ok(event) => self.pool.publish(event, Some(vec![url.clone()])).is_ok(),
            Err(_) => false,
        }
    }

    /// Frame-carrier events from every subscription, decoded back to raw
    /// frames and tagged with the relay they arrived through.
    fn inbound(&self) -> mpsc::UnboundedReceiver<(LinkId, Vec<u8>)> {
        let mut events = self.pool.subscribe_events();
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(notification) = events.recv().await {
                let Some(frame) = Self::decode_frame(&notification.event) else {
                    continue;
                };
                if sender
                    .send((LinkId::Relay(notification.relay), frame))
                    .is_err()
                {
                    break;
                }
            }
        });
        receiver
    }

    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let mut states = self.pool.subscribe_states();
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some((url, state)) = states.recv().await {
                let event = match state {
                    RelayState::Connected => PeerEvent::LinkUp(LinkId::Relay(url)),
                    RelayState::Disconnected | RelayState::Error => {
                        PeerEvent::LinkDown(LinkId::Relay(url))
                    }
                    RelayState::Connecting => continue,
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
        });
        receiver
    }

    fn status(&self) -> TransportStatus {
        let states = self.pool.states();
        let connected = states
            .values()
            .filter(|state| **state == RelayState::Connected)
            .count();
        let state = if connected > 0 {
            MeshStatus::Connected
        } else if states
            .values()
            .any(|state| *state == RelayState::Connecting)
        {
            MeshStatus::Connecting
        } else {
            MeshStatus::Idle
        };
        TransportStatus {
            state,
            active_links: connected,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
