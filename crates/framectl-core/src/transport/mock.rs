//! Mock USB bus and transport for testing.
//!
//! A `MockBus` holds a set of attached devices. Registering a mode switch
//! makes the storage-mode device drop off the bus when it receives the switch
//! request and the display-mode device appear a configurable number of polls
//! later, mimicking re-enumeration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{TransportError, UsbBus, UsbTransport};
use crate::protocol::ControlRequest;
use crate::protocol::request::MODE_SWITCH;

/// Device id pair.
pub type DeviceId = (u16, u16);

#[derive(Debug, Clone, Copy)]
struct PendingDevice {
    id: DeviceId,
    polls_remaining: usize,
}

#[derive(Debug, Clone, Copy)]
struct ModeSwitch {
    display_pid: u16,
    appear_after_polls: usize,
}

#[derive(Debug, Default)]
struct BusState {
    present: Vec<DeviceId>,
    pending: Vec<PendingDevice>,
    switches: HashMap<DeviceId, ModeSwitch>,
    /// Canned control responses by request code.
    responses: HashMap<u8, Vec<u8>>,
    /// Control requests that fail with `ControlFailed`.
    control_failures: HashMap<u8, String>,
    /// Control requests that end with a bus fault instead of a disconnect.
    control_faults: Vec<u8>,
    /// Fail every bulk write after this many have succeeded.
    fail_bulk_after: Option<usize>,
    open_attempts: Vec<DeviceId>,
    control_log: Vec<(DeviceId, ControlRequest)>,
    bulk_log: Vec<(DeviceId, u8, Vec<u8>)>,
    configured: Vec<DeviceId>,
}

/// Mock bus for unit testing acquisition and upload logic.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a device.
    pub fn attach(&self, vid: u16, pid: u16) {
        let mut state = self.lock();
        if !state.present.contains(&(vid, pid)) {
            state.present.push((vid, pid));
        }
    }

    /// Detach a device.
    pub fn detach(&self, vid: u16, pid: u16) {
        self.lock().present.retain(|id| *id != (vid, pid));
    }

    /// Make `vid:storage_pid` re-enumerate as `vid:display_pid` when it
    /// receives the mode switch request.
    pub fn register_mode_switch(
        &self,
        vid: u16,
        storage_pid: u16,
        display_pid: u16,
        appear_after_polls: usize,
    ) {
        self.lock().switches.insert(
            (vid, storage_pid),
            ModeSwitch {
                display_pid,
                appear_after_polls,
            },
        );
    }

    /// Queue a response for a control request code.
    pub fn set_response(&self, request: u8, data: &[u8]) {
        self.lock().responses.insert(request, data.to_vec());
    }

    /// Make a control request code fail with a non-disconnect error.
    pub fn fail_control(&self, request: u8, message: &str) {
        self.lock()
            .control_failures
            .insert(request, message.to_string());
    }

    /// Make a control request code end with `TransportError::Fault`.
    ///
    /// For a registered mode switch the device still re-enumerates; only the
    /// error seen by the caller changes.
    pub fn fault_control(&self, request: u8) {
        let mut state = self.lock();
        if !state.control_faults.contains(&request) {
            state.control_faults.push(request);
        }
    }

    /// Let `count` bulk writes succeed, then fail the rest.
    pub fn fail_bulk_after(&self, count: usize) {
        self.lock().fail_bulk_after = Some(count);
    }

    pub fn is_present(&self, vid: u16, pid: u16) -> bool {
        self.lock().present.contains(&(vid, pid))
    }

    pub fn is_configured(&self, vid: u16, pid: u16) -> bool {
        self.lock().configured.contains(&(vid, pid))
    }

    /// Every `open` call, in order.
    pub fn open_attempts(&self) -> Vec<DeviceId> {
        self.lock().open_attempts.clone()
    }

    /// Every control request issued, in order.
    pub fn control_log(&self) -> Vec<(DeviceId, ControlRequest)> {
        self.lock().control_log.clone()
    }

    /// Every successful bulk write as `(endpoint, data)`, in order.
    pub fn bulk_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.lock()
            .bulk_log
            .iter()
            .map(|(_, ep, data)| (*ep, data.clone()))
            .collect()
    }

    /// Concatenation of all bulk data written.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock()
            .bulk_log
            .iter()
            .flat_map(|(_, _, data)| data.iter().copied())
            .collect()
    }

    pub fn clear_logs(&self) {
        let mut state = self.lock();
        state.open_attempts.clear();
        state.control_log.clear();
        state.bulk_log.clear();
    }

    /// Advance re-enumeration by one poll.
    fn tick(state: &mut BusState) {
        let mut still_pending = Vec::new();
        for mut pending in state.pending.drain(..) {
            if pending.polls_remaining == 0 {
                if !state.present.contains(&pending.id) {
                    state.present.push(pending.id);
                }
            } else {
                pending.polls_remaining -= 1;
                still_pending.push(pending);
            }
        }
        state.pending = still_pending;
    }
}

impl UsbBus for MockBus {
    type Transport = MockTransport;

    fn open(&self, vid: u16, pid: u16) -> Result<Option<MockTransport>, TransportError> {
        let mut state = self.lock();
        Self::tick(&mut state);
        state.open_attempts.push((vid, pid));

        if !state.present.contains(&(vid, pid)) {
            return Ok(None);
        }
        Ok(Some(MockTransport {
            bus: self.clone(),
            vid,
            pid,
        }))
    }
}

/// Handle to one device on a `MockBus`.
#[derive(Debug, Clone)]
pub struct MockTransport {
    bus: MockBus,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    /// A lone device on its own bus, already attached.
    pub fn new(vid: u16, pid: u16) -> Self {
        let bus = MockBus::new();
        bus.attach(vid, pid);
        Self { bus, vid, pid }
    }

    /// The bus this device lives on.
    pub fn bus(&self) -> &MockBus {
        &self.bus
    }

    fn id(&self) -> DeviceId {
        (self.vid, self.pid)
    }
}

impl UsbTransport for MockTransport {
    fn control_in(&self, request: &ControlRequest) -> Result<Vec<u8>, TransportError> {
        let id = self.id();
        let mut state = self.bus.lock();
        if !state.present.contains(&id) {
            return Err(TransportError::Disconnected);
        }
        state.control_log.push((id, *request));

        if let Some(message) = state.control_failures.get(&request.request) {
            return Err(TransportError::ControlFailed {
                request: request.to_string(),
                message: message.clone(),
            });
        }

        let fault = state.control_faults.contains(&request.request).then(|| {
            TransportError::Fault {
                request: request.to_string(),
                message: "protocol error".into(),
            }
        });

        if *request == MODE_SWITCH
            && let Some(switch) = state.switches.get(&id).copied()
        {
            state.present.retain(|d| *d != id);
            state.pending.push(PendingDevice {
                id: (self.vid, switch.display_pid),
                polls_remaining: switch.appear_after_polls,
            });
            return Err(fault.unwrap_or(TransportError::Disconnected));
        }
        if let Some(fault) = fault {
            return Err(fault);
        }

        let response = state
            .responses
            .get(&request.request)
            .cloned()
            .unwrap_or_else(|| vec![0u8; request.length as usize]);
        Ok(response)
    }

    fn bulk_write(&self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
        let id = self.id();
        let mut state = self.bus.lock();
        if !state.present.contains(&id) {
            return Err(TransportError::Disconnected);
        }
        if !state.configured.contains(&id) {
            return Err(TransportError::NotConfigured);
        }
        if let Some(limit) = state.fail_bulk_after
            && state.bulk_log.len() >= limit
        {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        state.bulk_log.push((id, endpoint, data.to_vec()));
        Ok(data.len())
    }

    fn set_configuration(&mut self) -> Result<(), TransportError> {
        let id = self.id();
        let mut state = self.bus.lock();
        if !state.present.contains(&id) {
            return Err(TransportError::Disconnected);
        }
        if !state.configured.contains(&id) {
            state.configured.push(id);
        }
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
