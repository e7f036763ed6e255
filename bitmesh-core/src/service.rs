//! The mesh service: composes identity, codec, dedup, connection management,
//! and the relay engine behind a single tokio actor loop.
//!
//! All mutable state lives inside the loop. External callers talk to it
//! through [`MeshHandle`] commands; the radio talks to it through the
//! adapter event channel; timers are arms of the same `select`. The inbound
//! packet stream stays open for the life of the service.

use crate::adapter::{AdapterEvent, AdapterState, DeviceId, LinkEvent, RadioAdapter};
use crate::connection::{ConnectionManager, ConnectionPolicy, PeerInfo};
use crate::dedup::Deduplicator;
use crate::error::{MeshError, MeshResult};
use crate::identity::{self, MeshIdentity};
use crate::limiter::{RateLimiter, RateLimiterConfig};
use crate::metrics::{MeshMetrics, MetricsSnapshot};
use crate::negotiate::{negotiate, FeatureSet, Negotiated};
use crate::relay::RelayEngine;
use crate::transport::{LinkId, PeerEvent, RadioTransport};
use bitmesh_wire::constants::TYPE_ANNOUNCE;
use bitmesh_wire::packet::Packet;
use bitmesh_wire::{Fragmenter, Hello, Ingest, PeerId, Reassembler};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Externally visible service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshStatus {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Error,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Advertised protocol capabilities, sent on every fresh link.
    pub hello: Hello,
    pub connection: ConnectionPolicy,
    pub limiter: RateLimiterConfig,
    pub nickname: String,
    /// Cadence of stale-peer pruning, dedup sweeps, and fragment eviction.
    pub maintenance_interval: std::time::Duration,
    /// Radios cannot scan and connect at once; wait this long after stopping
    /// the scan before connecting.
    pub connect_settle: std::time::Duration,
    pub connect_timeout: std::time::Duration,
    /// How long `start` waits for the adapter to reach a definite state.
    pub start_timeout: std::time::Duration,
    pub announce_ttl: u8,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            hello: Hello::new(2, 1, FeatureSet::MESH_RELAY),
            connection: ConnectionPolicy::default(),
            limiter: RateLimiterConfig::default(),
            nickname: "anon".to_owned(),
            maintenance_interval: std::time::Duration::from_secs(10),
            connect_settle: std::time::Duration::from_millis(200),
            connect_timeout: std::time::Duration::from_secs(30),
            start_timeout: std::time::Duration::from_secs(5),
            announce_ttl: 3,
        }
    }
}

/// A decoded, deduplicated packet delivered to the application.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub link: LinkId,
    pub packet: Packet,
}

pub(crate) enum Command {
    Broadcast {
        packet_type: u8,
        payload: Vec<u8>,
        ttl: u8,
        reply: oneshot::Sender<MeshResult<()>>,
    },
    Unicast {
        device: DeviceId,
        packet_type: u8,
        payload: Vec<u8>,
        ttl: u8,
        reply: oneshot::Sender<MeshResult<()>>,
    },
    RawBroadcast {
        frame: Vec<u8>,
    },
    RawUnicast {
        link: LinkId,
        frame: Vec<u8>,
    },
    SubscribeInbound {
        sender: mpsc::UnboundedSender<(LinkId, Vec<u8>)>,
    },
    SubscribePeers {
        sender: mpsc::UnboundedSender<PeerEvent>,
    },
    RegisterPeerKey {
        peer: PeerId,
        key: [u8; 32],
    },
    SetNickname {
        nickname: String,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerInfo>>,
    },
    Status {
        reply: oneshot::Sender<MeshStatus>,
    },
    Metrics {
        reply: oneshot::Sender<MetricsSnapshot>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// State the loop exposes read-only to transport handles.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub links: RwLock<HashSet<LinkId>>,
    pub status: RwLock<MeshStatus>,
}

/// Cloneable handle for talking to a running mesh service.
#[derive(Clone)]
pub struct MeshHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
}

impl MeshHandle {
    pub async fn broadcast(&self, packet_type: u8, payload: Vec<u8>, ttl: u8) -> MeshResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Broadcast {
                packet_type,
                payload,
                ttl,
                reply,
            })
            .map_err(|_| MeshError::Disposed)?;
        rx.await.map_err(|_| MeshError::Disposed)?
    }

    pub async fn unicast_to(
        &self,
        device: DeviceId,
        packet_type: u8,
        payload: Vec<u8>,
        ttl: u8,
    ) -> MeshResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Unicast {
                device,
                packet_type,
                payload,
                ttl,
                reply,
            })
            .map_err(|_| MeshError::Disposed)?;
        rx.await.map_err(|_| MeshError::Disposed)?
    }

    pub async fn peers(&self) -> MeshResult<Vec<PeerInfo>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Peers { reply })
            .map_err(|_| MeshError::Disposed)?;
        rx.await.map_err(|_| MeshError::Disposed)
    }

    pub async fn status(&self) -> MeshResult<MeshStatus> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Status { reply })
            .map_err(|_| MeshError::Disposed)?;
        rx.await.map_err(|_| MeshError::Disposed)
    }

    pub async fn metrics(&self) -> MeshResult<MetricsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Metrics { reply })
            .map_err(|_| MeshError::Disposed)?;
        rx.await.map_err(|_| MeshError::Disposed)
    }

    /// Pre-seeds a peer-id → public-key binding, e.g. from a QR exchange.
    pub fn register_peer_key(&self, peer: PeerId, key: [u8; 32]) {
        let _ = self.commands.send(Command::RegisterPeerKey { peer, key });
    }

    /// Changes the nickname and re-announces it to the mesh.
    pub fn set_nickname(&self, nickname: impl Into<String>) {
        let _ = self.commands.send(Command::SetNickname {
            nickname: nickname.into(),
        });
    }

    /// Stops the service: cancels pending connects, stops the scan, drops
    /// every link. Idempotent.
    pub async fn stop(&self) -> MeshResult<()> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    /// A [`crate::Transport`] view over this service's radio links.
    pub fn transport(&self) -> RadioTransport {
        RadioTransport::new(self.commands.clone(), self.shared.clone())
    }
}

pub struct MeshService;

impl MeshService {
    /// Brings up the mesh: waits for the adapter to report a definite state,
    /// starts scanning, and spawns the service loop.
    ///
    /// Fails with `Timeout` when the adapter stays in an unknown state past
    /// the configured start timeout, and with `AdapterOff` when it reports
    /// off.
    pub async fn start(
        config: MeshConfig,
        identity: MeshIdentity,
        adapter: Arc<dyn RadioAdapter>,
        mut adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    ) -> MeshResult<(MeshHandle, mpsc::UnboundedReceiver<InboundPacket>)> {
        let deadline = tokio::time::Instant::now() + config.start_timeout;
        let mut state = adapter.state();
        while state == AdapterState::Unknown {
            match tokio::time::timeout_at(deadline, adapter_events.recv()).await {
                Err(_) => return Err(MeshError::Timeout("adapter state")),
                Ok(None) => return Err(MeshError::Disposed),
                Ok(Some(AdapterEvent::StateChanged(next))) => state = next,
                Ok(Some(_)) => {}
            }
        }
        if state == AdapterState::Off {
            return Err(MeshError::AdapterOff);
        }
        adapter.start_scan()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());
        *shared.status.write() = MeshStatus::Scanning;

        let self_id = identity.peer_id();
        let service = ServiceLoop {
            nickname: config.nickname.clone(),
            manager: ConnectionManager::new(config.connection.clone()),
            limiter: RateLimiter::new(config.limiter.clone()),
            config,
            identity,
            adapter,
            dedup: Deduplicator::default(),
            reassembler: Reassembler::new(),
            fragmenter: Fragmenter::new(),
            relay: RelayEngine::new(self_id),
            metrics: Arc::new(MeshMetrics::default()),
            peer_keys: HashMap::new(),
            negotiated: HashMap::new(),
            inbound_tx,
            inbound_taps: Vec::new(),
            peer_taps: Vec::new(),
            shared: shared.clone(),
            status: MeshStatus::Scanning,
            connect: None,
        };
        tokio::spawn(service.run(command_rx, adapter_events));

        Ok((
            MeshHandle {
                commands: command_tx,
                shared,
            },
            inbound_rx,
        ))
    }
}

enum ConnectPhase {
    /// Scan stopped; waiting out the settle delay before connecting.
    Settling {
        device: DeviceId,
        at: tokio::time::Instant,
    },
    /// `connect` issued; waiting for the adapter's verdict.
    Waiting {
        device: DeviceId,
        deadline: tokio::time::Instant,
    },
}

struct ServiceLoop {
    config: MeshConfig,
    identity: MeshIdentity,
    adapter: Arc<dyn RadioAdapter>,
    manager: ConnectionManager,
    dedup: Deduplicator,
    reassembler: Reassembler<LinkId>,
    fragmenter: Fragmenter,
    limiter: RateLimiter,
    relay: RelayEngine,
    metrics: Arc<MeshMetrics>,
    peer_keys: HashMap<PeerId, [u8; 32]>,
    negotiated: HashMap<LinkId, Negotiated>,
    inbound_tx: mpsc::UnboundedSender<InboundPacket>,
    inbound_taps: Vec<mpsc::UnboundedSender<(LinkId, Vec<u8>)>>,
    peer_taps: Vec<mpsc::UnboundedSender<PeerEvent>>,
    shared: Arc<SharedState>,
    status: MeshStatus,
    nickname: String,
    connect: Option<ConnectPhase>,
}

impl ServiceLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<AdapterEvent>,
    ) {
        let mut maintenance = tokio::time::interval(self.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let connect_deadline = match &self.connect {
                Some(ConnectPhase::Settling { at, .. }) => Some(*at),
                Some(ConnectPhase::Waiting { deadline, .. }) => Some(*deadline),
                None => None,
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        // Every handle dropped; wind down.
                        self.shutdown();
                        break;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_adapter_event(event),
                    None => {
                        warn!("adapter event stream closed");
                        self.set_status(MeshStatus::Error);
                        break;
                    }
                },
                _ = maintenance.tick() => self.maintenance(),
                _ = wait_until(connect_deadline) => self.connect_phase_due(),
            }
        }
    }

    fn self_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    fn set_status(&mut self, status: MeshStatus) {
        if self.status != status {
            debug!(?status, "mesh status");
        }
        self.status = status;
        *self.shared.status.write() = status;
    }

    /// Returns true when the loop should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Broadcast {
                packet_type,
                payload,
                ttl,
                reply,
            } => {
                let _ = reply.send(self.do_broadcast(packet_type, payload, ttl));
            }
            Command::Unicast {
                device,
                packet_type,
                payload,
                ttl,
                reply,
            } => {
                let _ = reply.send(self.do_unicast(device, packet_type, payload, ttl));
            }
            Command::RawBroadcast { frame } => {
                for (device, mtu) in self.manager.links() {
                    self.write_frame(&device, &frame, mtu);
                }
            }
            Command::RawUnicast { link, frame } => {
                if let LinkId::Radio(device) = link {
                    let mtu = self.manager.link_mtu(&device);
                    self.write_frame(&device, &frame, mtu);
                }
            }
            Command::SubscribeInbound { sender } => {
                self.inbound_taps.push(sender);
            }
            Command::SubscribePeers { sender } => {
                self.peer_taps.push(sender);
            }
            Command::RegisterPeerKey { peer, key } => {
                self.peer_keys.insert(peer, key);
            }
            Command::SetNickname { nickname } => {
                self.nickname = nickname;
                self.send_announce(None);
            }
            Command::Peers { reply } => {
                let _ = reply.send(self.manager.peers());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status);
            }
            Command::Metrics { reply } => {
                let _ = reply.send(self.metrics.snapshot());
            }
            Command::Stop { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn shutdown(&mut self) {
        self.connect = None;
        self.adapter.stop_scan();
        self.adapter.disconnect_all();
        self.manager.clear_links();
        self.shared.links.write().clear();
        self.set_status(MeshStatus::Stopped);
    }

    fn do_broadcast(&mut self, packet_type: u8, payload: Vec<u8>, ttl: u8) -> MeshResult<()> {
        let channel = format!("type:{packet_type}");
        if !self.limiter.try_consume(&channel, Instant::now()) {
            MeshMetrics::incr(&self.metrics.rate_limited);
            return Err(MeshError::RateLimited(channel));
        }
        let mut packet =
            Packet::broadcast(packet_type, self.self_id(), payload, ttl, now_ms());
        self.sign_packet(&mut packet)?;
        self.fan_out(&packet, None, false);
        Ok(())
    }

    fn do_unicast(
        &mut self,
        device: DeviceId,
        packet_type: u8,
        payload: Vec<u8>,
        ttl: u8,
    ) -> MeshResult<()> {
        if !self.manager.is_linked(&device) {
            return Err(MeshError::LinkUnavailable(device.to_string()));
        }
        let channel = format!("type:{packet_type}");
        if !self.limiter.try_consume(&channel, Instant::now()) {
            MeshMetrics::incr(&self.metrics.rate_limited);
            return Err(MeshError::RateLimited(channel));
        }
        let mut packet = match self.manager.link_peer(&device) {
            Some(recipient) => Packet::unicast(
                packet_type,
                self.self_id(),
                recipient,
                payload,
                ttl,
                now_ms(),
            ),
            None => Packet::broadcast(packet_type, self.self_id(), payload, ttl, now_ms()),
        };
        self.sign_packet(&mut packet)?;
        let frame = packet.encode(true)?;
        let mtu = self.manager.link_mtu(&device);
        self.write_frame(&device, &frame, mtu);
        Ok(())
    }

    fn sign_packet(&self, packet: &mut Packet) -> MeshResult<()> {
        let preimage = packet.signing_bytes()?;
        packet.signature = Some(self.identity.sign(&preimage));
        Ok(())
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::StateChanged(AdapterState::On) => {
                if self.status == MeshStatus::Error && self.adapter.start_scan().is_ok() {
                    self.set_status(MeshStatus::Scanning);
                }
            }
            AdapterEvent::StateChanged(_) => {
                warn!("adapter lost, demoting to error state");
                self.connect = None;
                self.manager.clear_links();
                self.shared.links.write().clear();
                self.set_status(MeshStatus::Error);
            }
            AdapterEvent::ScanResult { device, rssi } => {
                self.manager.observe_scan(device, rssi, Instant::now());
                self.maybe_connect();
            }
            AdapterEvent::Connection { device, event } => self.handle_link_event(device, event),
            AdapterEvent::Data { device, data } => {
                self.handle_datagram(LinkId::Radio(device), &data)
            }
        }
    }

    fn maybe_connect(&mut self) {
        if self.connect.is_some()
            || matches!(self.status, MeshStatus::Error | MeshStatus::Stopped)
        {
            return;
        }
        if let Some((device, rssi)) = self.manager.best_candidate(Instant::now()) {
            debug!(%device, rssi, "admitting connect attempt");
            self.adapter.stop_scan();
            self.set_status(MeshStatus::Connecting);
            self.connect = Some(ConnectPhase::Settling {
                device,
                at: tokio::time::Instant::now() + self.config.connect_settle,
            });
        }
    }

    fn connect_phase_due(&mut self) {
        match self.connect.take() {
            Some(ConnectPhase::Settling { device, .. }) => {
                self.adapter.connect(&device);
                self.connect = Some(ConnectPhase::Waiting {
                    device,
                    deadline: tokio::time::Instant::now() + self.config.connect_timeout,
                });
            }
            Some(ConnectPhase::Waiting { device, .. }) => {
                debug!(%device, "connect attempt timed out");
                self.manager.record_failure(&device, Instant::now());
                self.adapter.disconnect(&device);
                self.finish_attempt();
            }
            None => {}
        }
    }

    fn attempt_device(&self) -> Option<&DeviceId> {
        match &self.connect {
            Some(ConnectPhase::Settling { device, .. })
            | Some(ConnectPhase::Waiting { device, .. }) => Some(device),
            None => None,
        }
    }

    /// A connect attempt ended, successfully or not: the scan always
    /// restarts.
    fn finish_attempt(&mut self) {
        self.connect = None;
        if matches!(self.status, MeshStatus::Error | MeshStatus::Stopped) {
            return;
        }
        if let Err(error) = self.adapter.start_scan() {
            debug!(%error, "scan restart failed");
        }
        if self.manager.link_count() > 0 {
            self.set_status(MeshStatus::Connected);
        } else {
            self.set_status(MeshStatus::Scanning);
        }
    }

    fn handle_link_event(&mut self, device: DeviceId, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                // GATT setup continues inside the adapter; wait for Ready.
            }
            LinkEvent::Ready { mtu } => {
                self.manager.record_success(&device, mtu, Instant::now());
                self.shared
                    .links
                    .write()
                    .insert(LinkId::Radio(device.clone()));
                self.emit_peer_event(PeerEvent::LinkUp(LinkId::Radio(device.clone())));
                let hello = self.config.hello.encode();
                self.write_frame(&device, &hello, mtu);
                self.send_announce(Some(&device));
                if self.attempt_device() == Some(&device) || self.connect.is_none() {
                    self.finish_attempt();
                }
            }
            LinkEvent::Failed | LinkEvent::Timeout => {
                self.manager.record_failure(&device, Instant::now());
                if self.attempt_device() == Some(&device) {
                    self.finish_attempt();
                }
            }
            LinkEvent::Disconnected => {
                self.manager.record_disconnect(&device);
                let link = LinkId::Radio(device);
                self.shared.links.write().remove(&link);
                self.negotiated.remove(&link);
                self.emit_peer_event(PeerEvent::LinkDown(link.clone()));
                if self.manager.link_count() == 0 && self.status == MeshStatus::Connected {
                    self.set_status(MeshStatus::Scanning);
                    if let Err(error) = self.adapter.start_scan() {
                        debug!(%error, "scan restart failed");
                    }
                }
            }
        }
    }

    fn handle_datagram(&mut self, link: LinkId, data: &[u8]) {
        if Hello::matches(data) {
            if let Ok(theirs) = Hello::decode(data) {
                match negotiate(&self.config.hello, &theirs) {
                    Ok(negotiated) => {
                        debug!(%link, ?negotiated, "negotiated link protocol");
                        self.negotiated.insert(link, negotiated);
                    }
                    Err(error) => {
                        warn!(%link, %error, "incompatible peer, dropping link");
                        if let LinkId::Radio(device) = &link {
                            self.adapter.disconnect(device);
                        }
                    }
                }
            }
            return;
        }

        match self.reassembler.ingest(link.clone(), data, Instant::now()) {
            Ingest::NotFragment => {
                self.tap_inbound(&link, data);
                self.handle_frame(link, data)
            }
            Ingest::Complete(frame) => {
                self.tap_inbound(&link, &frame);
                self.handle_frame(link, &frame)
            }
            Ingest::Pending | Ingest::Dropped => {}
        }
    }

    /// Feeds a reassembled frame to every transport-level inbound
    /// subscriber, dropping subscribers that went away.
    fn tap_inbound(&mut self, link: &LinkId, frame: &[u8]) {
        self.inbound_taps
            .retain(|tap| tap.send((link.clone(), frame.to_vec())).is_ok());
    }

    fn emit_peer_event(&mut self, event: PeerEvent) {
        self.peer_taps.retain(|tap| tap.send(event.clone()).is_ok());
    }

    fn handle_frame(&mut self, link: LinkId, frame: &[u8]) {
        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(error) => {
                debug!(%link, %error, "dropping malformed frame");
                MeshMetrics::incr(&self.metrics.malformed_frames);
                return;
            }
        };
        MeshMetrics::incr(&self.metrics.packets_received);

        // Our own traffic echoed back through the mesh.
        if packet.sender_id == self.self_id() {
            return;
        }
        if self
            .dedup
            .is_duplicate(&packet.message_key(), Instant::now())
        {
            MeshMetrics::incr(&self.metrics.duplicates_dropped);
            return;
        }

        if packet.packet_type == TYPE_ANNOUNCE {
            if !self.handle_announce(&link, &packet) {
                return;
            }
        } else if !self.verify_inbound(&packet) {
            return;
        }

        let for_us = packet
            .recipient_id
            .map_or(true, |recipient| recipient == self.self_id());
        if for_us {
            let _ = self.inbound_tx.send(InboundPacket {
                link: link.clone(),
                packet: packet.clone(),
            });
        }

        if let Some(forwarded) = self.relay.plan(&packet) {
            self.fan_out(&forwarded, Some(&link), true);
            MeshMetrics::incr(&self.metrics.packets_relayed);
        }
    }

    /// Signature check for packets whose sender has a known key. Unsigned
    /// packets, or signed ones from unknown senders, pass through: the mesh
    /// is open and verification tightens as announcements spread.
    fn verify_inbound(&self, packet: &Packet) -> bool {
        let (Some(signature), Some(key)) = (
            packet.signature.as_ref(),
            self.peer_keys.get(&packet.sender_id),
        ) else {
            return true;
        };
        let Ok(preimage) = packet.signing_bytes() else {
            return false;
        };
        if identity::verify(&preimage, signature, key).is_err() {
            debug!(sender = %packet.sender_id, "signature verification failed");
            MeshMetrics::incr(&self.metrics.signature_failures);
            return false;
        }
        true
    }

    /// Validates an announce and records the peer-id → key binding.
    fn handle_announce(&mut self, link: &LinkId, packet: &Packet) -> bool {
        let Some((public_key, nickname)) = decode_announce(&packet.payload) else {
            MeshMetrics::incr(&self.metrics.malformed_frames);
            return false;
        };
        if PeerId::from_slice(&public_key[..8]) != packet.sender_id {
            debug!(sender = %packet.sender_id, "announce key does not match sender id");
            MeshMetrics::incr(&self.metrics.signature_failures);
            return false;
        }
        let Some(signature) = &packet.signature else {
            debug!(sender = %packet.sender_id, "unsigned announce dropped");
            MeshMetrics::incr(&self.metrics.signature_failures);
            return false;
        };
        let Ok(preimage) = packet.signing_bytes() else {
            return false;
        };
        if identity::verify(&preimage, signature, &public_key).is_err() {
            MeshMetrics::incr(&self.metrics.signature_failures);
            return false;
        }

        self.peer_keys.insert(packet.sender_id, public_key);
        if let LinkId::Radio(device) = link {
            // Only the directly-connected peer owns the device binding; a
            // relayed announce from a third peer must not steal it.
            let current = self.manager.peer_binding(device);
            if current.is_none() || current == Some(packet.sender_id) {
                self.manager
                    .bind_peer(device, packet.sender_id, Some(nickname));
                if let Some(info) = self.manager.peer_info(device) {
                    self.emit_peer_event(PeerEvent::PeerUpdated(info));
                }
            }
        }
        true
    }

    fn send_announce(&mut self, only_to: Option<&DeviceId>) {
        let mut payload = Vec::with_capacity(32 + self.nickname.len());
        payload.extend_from_slice(&self.identity.public_key_bytes());
        payload.extend_from_slice(self.nickname.as_bytes());
        let mut packet = Packet::broadcast(
            TYPE_ANNOUNCE,
            self.self_id(),
            payload,
            self.config.announce_ttl,
            now_ms(),
        );
        if self.sign_packet(&mut packet).is_err() {
            return;
        }
        match only_to {
            Some(device) => {
                let frame = match packet.encode(true) {
                    Ok(frame) => frame,
                    Err(_) => return,
                };
                let mtu = self.manager.link_mtu(device);
                self.write_frame(device, &frame, mtu);
            }
            None => self.fan_out(&packet, None, false),
        }
    }

    /// Best-effort fan-out to every link except `exclude`. Relayed traffic
    /// additionally skips links whose negotiated features opted out of mesh
    /// relaying.
    fn fan_out(&mut self, packet: &Packet, exclude: Option<&LinkId>, relaying: bool) {
        let frame = match packet.encode(true) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "failed to encode outbound frame");
                return;
            }
        };
        for (device, mtu) in self.manager.links() {
            let link = LinkId::Radio(device.clone());
            if Some(&link) == exclude {
                continue;
            }
            if relaying {
                if let Some(negotiated) = self.negotiated.get(&link) {
                    if !negotiated.features.contains(FeatureSet::MESH_RELAY) {
                        continue;
                    }
                }
            }
            self.write_frame(&device, &frame, mtu);
        }
    }

    /// Fragments `frame` for the link MTU and writes each datagram. Failures
    /// are silent by policy, but counted.
    fn write_frame(&mut self, device: &DeviceId, frame: &[u8], mtu: usize) {
        let datagrams = match self.fragmenter.split(frame, mtu) {
            Ok(datagrams) => datagrams,
            Err(error) => {
                debug!(%device, %error, "cannot fragment frame for link");
                MeshMetrics::incr(&self.metrics.link_write_failures);
                return;
            }
        };
        for datagram in datagrams {
            if let Err(error) = self.adapter.write(device, &datagram) {
                debug!(%device, %error, "link write failed");
                MeshMetrics::incr(&self.metrics.link_write_failures);
            }
        }
    }

    fn maintenance(&mut self) {
        let now = Instant::now();
        let expired = self.reassembler.sweep(now);
        if expired > 0 {
            self.metrics
                .fragments_expired
                .fetch_add(expired as u64, std::sync::atomic::Ordering::Relaxed);
        }
        self.dedup.sweep(now);
        self.manager.prune_stale(now);

        // Re-arm the scan; radios quietly stop scanning on their own.
        if !matches!(self.status, MeshStatus::Error | MeshStatus::Stopped)
            && self.connect.is_none()
        {
            if let Err(error) = self.adapter.start_scan() {
                debug!(%error, "scan re-arm failed");
            }
            self.maybe_connect();
        }
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Announce payload: `[public key:32][nickname utf-8]`.
fn decode_announce(payload: &[u8]) -> Option<([u8; 32], String)> {
    if payload.len() < 32 {
        return None;
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[..32]);
    let nickname = String::from_utf8(payload[32..].to_vec()).ok()?;
    Some((key, nickname))
}
