//! The host-supplied radio contract.
//!
//! The core never touches platform radio APIs. The host hands it an object
//! implementing [`RadioAdapter`] plus a channel of [`AdapterEvent`]s; every
//! call is non-blocking and every completion arrives as an event.

use crate::error::MeshResult;

/// Platform-assigned identifier for a nearby device.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    On,
    Off,
    Unknown,
}

/// Lifecycle of a single outbound connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The low-level connection is up; GATT setup still in progress.
    Connected,
    /// Service discovery and notifications are done; the link carries data.
    /// `mtu` is the negotiated link MTU (the adapter targets 512 and falls
    /// back when the radio refuses).
    Ready { mtu: usize },
    Disconnected,
    Failed,
    Timeout,
}

/// Everything the radio reports back to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    StateChanged(AdapterState),
    ScanResult { device: DeviceId, rssi: i16 },
    Connection { device: DeviceId, event: LinkEvent },
    Data { device: DeviceId, data: Vec<u8> },
}

/// Operations the core invokes on the host radio.
///
/// `write` is fire-and-forget ("write without response"); delivery failures
/// surface, if at all, as a later `Disconnected` event.
pub trait RadioAdapter: Send + Sync {
    fn state(&self) -> AdapterState;
    fn start_scan(&self) -> MeshResult<()>;
    fn stop_scan(&self);
    fn connect(&self, device: &DeviceId);
    fn disconnect(&self, device: &DeviceId);
    fn disconnect_all(&self);
    fn write(&self, device: &DeviceId, data: &[u8]) -> MeshResult<()>;
}
