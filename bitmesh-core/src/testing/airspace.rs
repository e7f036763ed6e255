//! A virtual radio medium connecting in-process mesh nodes.
//!
//! Each node joins under a device id and gets an adapter whose writes are
//! routed to the target node's event channel as `Data` events. Delivery only
//! happens along explicitly wired edges, so tests can build line, star, or
//! partitioned topologies.

use crate::adapter::{AdapterEvent, AdapterState, DeviceId, RadioAdapter};
use crate::error::MeshResult;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct VirtualAirspace {
    nodes: Mutex<HashMap<DeviceId, mpsc::UnboundedSender<AdapterEvent>>>,
    edges: Mutex<HashSet<(DeviceId, DeviceId)>>,
}

impl VirtualAirspace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a node and returns its adapter, a sender for scripting
    /// extra events (scan results, connection events), and the receiver to
    /// hand to `MeshService::start`.
    pub fn join(
        self: &Arc<Self>,
        device: impl Into<DeviceId>,
    ) -> (
        Arc<AirspaceAdapter>,
        mpsc::UnboundedSender<AdapterEvent>,
        mpsc::UnboundedReceiver<AdapterEvent>,
    ) {
        let device = device.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.lock().insert(device.clone(), tx.clone());
        let adapter = Arc::new(AirspaceAdapter {
            airspace: Arc::clone(self),
            local: device,
        });
        (adapter, tx, rx)
    }

    /// Wires a bidirectional radio edge between two devices.
    pub fn link(&self, a: impl Into<DeviceId>, b: impl Into<DeviceId>) {
        let (a, b) = (a.into(), b.into());
        let mut edges = self.edges.lock();
        edges.insert((a.clone(), b.clone()));
        edges.insert((b, a));
    }

    fn deliver(&self, from: &DeviceId, to: &DeviceId, data: &[u8]) {
        if !self.edges.lock().contains(&(from.clone(), to.clone())) {
            return;
        }
        if let Some(node) = self.nodes.lock().get(to) {
            let _ = node.send(AdapterEvent::Data {
                device: from.clone(),
                data: data.to_vec(),
            });
        }
    }
}

/// The per-node adapter: writes go out over wired edges, control calls are
/// accepted silently.
pub struct AirspaceAdapter {
    airspace: Arc<VirtualAirspace>,
    local: DeviceId,
}

impl AirspaceAdapter {
    pub fn device(&self) -> &DeviceId {
        &self.local
    }
}

impl RadioAdapter for AirspaceAdapter {
    fn state(&self) -> AdapterState {
        AdapterState::On
    }

    fn start_scan(&self) -> MeshResult<()> {
        Ok(())
    }

    fn stop_scan(&self) {}

    fn connect(&self, _device: &DeviceId) {}

    fn disconnect(&self, _device: &DeviceId) {}

    fn disconnect_all(&self) {}

    fn write(&self, device: &DeviceId, data: &[u8]) -> MeshResult<()> {
        self.airspace.deliver(&self.local, device, data);
        Ok(())
    }
}
