//! A radio adapter that records every call and emits scripted events.

use crate::adapter::{AdapterState, DeviceId, RadioAdapter};
use crate::error::{MeshError, MeshResult};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DisconnectAll,
    Write(DeviceId, Vec<u8>),
}

/// Records the core's calls; the test injects events through the channel it
/// handed to `MeshService::start`.
#[derive(Debug)]
pub struct MockAdapter {
    state: RwLock<AdapterState>,
    calls: Mutex<Vec<AdapterCall>>,
    fail_writes: RwLock<bool>,
}

impl MockAdapter {
    pub fn new(state: AdapterState) -> Self {
        Self {
            state: RwLock::new(state),
            calls: Mutex::new(Vec::new()),
            fail_writes: RwLock::new(false),
        }
    }

    pub fn set_state(&self, state: AdapterState) {
        *self.state.write() = state;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write() = fail;
    }

    /// Drains the recorded call log.
    pub fn take_calls(&self) -> Vec<AdapterCall> {
        std::mem::take(&mut self.calls.lock())
    }

    /// Writes observed so far, without draining.
    pub fn writes(&self) -> Vec<(DeviceId, Vec<u8>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                AdapterCall::Write(device, data) => Some((device.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: AdapterCall) {
        self.calls.lock().push(call);
    }
}

impl RadioAdapter for MockAdapter {
    fn state(&self) -> AdapterState {
        *self.state.read()
    }

    fn start_scan(&self) -> MeshResult<()> {
        self.record(AdapterCall::StartScan);
        match *self.state.read() {
            AdapterState::On => Ok(()),
            _ => Err(MeshError::AdapterOff),
        }
    }

    fn stop_scan(&self) {
        self.record(AdapterCall::StopScan);
    }

    fn connect(&self, device: &DeviceId) {
        self.record(AdapterCall::Connect(device.clone()));
    }

    fn disconnect(&self, device: &DeviceId) {
        self.record(AdapterCall::Disconnect(device.clone()));
    }

    fn disconnect_all(&self) {
        self.record(AdapterCall::DisconnectAll);
    }

    fn write(&self, device: &DeviceId, data: &[u8]) -> MeshResult<()> {
        self.record(AdapterCall::Write(device.clone(), data.to_vec()));
        if *self.fail_writes.read() {
            return Err(MeshError::LinkWriteFailed(device.to_string()));
        }
        Ok(())
    }
}
