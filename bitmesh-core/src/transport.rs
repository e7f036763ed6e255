//! The seam that makes the radio mesh and the relay network interchangeable.
//!
//! Both paths carry opaque encoded frames between links; callers that only
//! need "send bytes to everyone / to one link, receive what arrives" program
//! against [`Transport`] and stay ignorant of which side is underneath.

use crate::adapter::DeviceId;
use crate::connection::PeerInfo;
use crate::error::{MeshError, MeshResult};
use crate::service::{Command, MeshStatus, SharedState};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifies a live link on either transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkId {
    /// A radio link to a nearby device.
    Radio(DeviceId),
    /// A relay connection, identified by its URL.
    Relay(String),
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkId::Radio(device) => write!(f, "radio:{device}"),
            LinkId::Relay(url) => write!(f, "relay:{url}"),
        }
    }
}

/// Link and peer changes observed on a transport.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    LinkUp(LinkId),
    LinkDown(LinkId),
    /// A peer's identity or nickname was learned or refreshed.
    PeerUpdated(PeerInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStatus {
    pub state: MeshStatus,
    pub active_links: usize,
}

/// Uniform send/recv surface over the radio mesh or the relay network.
///
/// `broadcast` is best-effort fan-out; `unicast` reports whether the link was
/// known and the write submitted. `inbound` and `peer_events` each return a
/// fresh, independent subscription stream; the channels close when the
/// transport's backing service goes away.
pub trait Transport: Send + Sync {
    fn broadcast(&self, frame: &[u8]) -> MeshResult<()>;
    fn unicast(&self, link: &LinkId, frame: &[u8]) -> bool;
    /// Reassembled inbound frames, tagged with the link they arrived on.
    fn inbound(&self) -> mpsc::UnboundedReceiver<(LinkId, Vec<u8>)>;
    /// Link lifecycle and peer identity changes.
    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent>;
    fn status(&self) -> TransportStatus;
}

/// The radio-side implementation: a command-channel handle into the mesh
/// service loop, which owns the links and does the fragmenting.
#[derive(Clone)]
pub struct RadioTransport {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
}

impl RadioTransport {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, shared: Arc<SharedState>) -> Self {
        Self { commands, shared }
    }
}

impl Transport for RadioTransport {
    fn broadcast(&self, frame: &[u8]) -> MeshResult<()> {
        self.commands
            .send(Command::RawBroadcast {
                frame: frame.to_vec(),
            })
            .map_err(|_| MeshError::Disposed)
    }

    fn unicast(&self, link: &LinkId, frame: &[u8]) -> bool {
        if !self.shared.links.read().contains(link) {
            return false;
        }
        self.commands
            .send(Command::RawUnicast {
                link: link.clone(),
                frame: frame.to_vec(),
            })
            .is_ok()
    }

    fn inbound(&self) -> mpsc::UnboundedReceiver<(LinkId, Vec<u8>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // If the service is already gone the sender drops here and the
        // receiver reads as closed, which is the contract.
        let _ = self.commands.send(Command::SubscribeInbound { sender });
        receiver
    }

    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::SubscribePeers { sender });
        receiver
    }

    fn status(&self) -> TransportStatus {
        TransportStatus {
            state: *self.shared.status.read(),
            active_links: self.shared.links.read().len(),
        }
    }
}
