//! Device acquisition and the storage -> display mode switch.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use super::change_phase;
use crate::events::{FrameEvent, FrameObserver, UsbMode};
use crate::models::{ModelEntry, ModelRegistry};
use crate::protocol::request::MODE_SWITCH;
use crate::session::SessionError;
use crate::state::machine::{DevicePhase, SessionState};
use crate::transport::{UsbBus, UsbTransport};

/// Timing of the wait for re-enumeration after a mode switch.
#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    pub poll_interval: Duration,
    pub reenumerate_timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            reenumerate_timeout: Duration::from_secs(5),
        }
    }
}

/// Ask a storage-mode frame to reboot into display mode.
///
/// The frame reboots while the request is in flight, so the transfer either
/// sees the device vanish or is cut off with a bus fault. Both mean the
/// switch worked. Any other failure is returned.
#[instrument(skip(transport), fields(pid = %format!("{:04X}", transport.product_id())))]
pub fn switch_to_display<T: UsbTransport>(transport: &T) -> Result<()> {
    match transport.control_in(&MODE_SWITCH) {
        Ok(response) => {
            debug!(len = response.len(), "Mode switch answered without disconnect");
            Ok(())
        }
        Err(e) if e.is_reset_signal() => {
            debug!(error = %e, "Device dropped off after mode switch");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Poll for the display-mode device until it shows up or the timeout passes.
fn wait_for_display<B: UsbBus>(
    bus: &B,
    vid: u16,
    pid: u16,
    options: &AcquireOptions,
) -> Result<Option<B::Transport>> {
    let start = Instant::now();
    let mut poll_count = 0u64;

    loop {
        thread::sleep(options.poll_interval);
        poll_count += 1;

        if let Some(transport) = bus.open(vid, pid)? {
            debug!(polls = poll_count, "Display device appeared");
            return Ok(Some(transport));
        }
        if start.elapsed() >= options.reenumerate_timeout {
            return Ok(None);
        }
    }
}

/// Find the first supported frame, switching it to display mode if needed.
///
/// Entries are tried in registry order. For each, a storage-mode device is
/// switched and then reopened under its display id; otherwise an
/// already-switched display-mode device is opened directly. The winner is
/// configured before it is returned.
#[instrument(skip_all)]
pub fn acquire_display_device<B: UsbBus, O: FrameObserver + ?Sized>(
    bus: &B,
    registry: &ModelRegistry,
    options: &AcquireOptions,
    observer: &O,
    state: &mut SessionState,
) -> Result<(ModelEntry, B::Transport)> {
    let vid = registry.vendor_id();

    for entry in registry.entries() {
        let device = match bus.open(vid, entry.storage_product_id)? {
            Some(storage) => {
                observer.on_event(&FrameEvent::DeviceFound {
                    model: entry.name,
                    mode: UsbMode::Storage,
                    vid,
                    pid: entry.storage_product_id,
                });
                change_phase(state, observer, DevicePhase::StorageMode);

                observer.on_event(&FrameEvent::ModeSwitchIssued { model: entry.name });
                switch_to_display(&storage)?;
                drop(storage);
                change_phase(state, observer, DevicePhase::Switching);

                let display = wait_for_display(bus, vid, entry.display_product_id, options)?;
                if display.is_none() {
                    warn!(
                        model = entry.name,
                        timeout_ms = options.reenumerate_timeout.as_millis() as u64,
                        "Device did not come back in display mode"
                    );
                    change_phase(state, observer, DevicePhase::Searching);
                }
                display
            }
            None => bus.open(vid, entry.display_product_id)?,
        };

        if let Some(mut transport) = device {
            observer.on_event(&FrameEvent::DeviceFound {
                model: entry.name,
                mode: UsbMode::Display,
                vid,
                pid: entry.display_product_id,
            });
            transport.set_configuration()?;
            change_phase(state, observer, DevicePhase::DisplayMode);
            info!(model = entry.name, geometry = %entry.geometry, "Device ready");
            return Ok((*entry, transport));
        }
    }

    Err(SessionError::NoSupportedDevice.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::models::{BUILTIN_MODELS, ModelKind};
    use crate::protocol::constants::SAMSUNG_VENDOR_ID;
    use crate::transport::{MockBus, MockTransport, TransportError};

    const VID: u16 = SAMSUNG_VENDOR_ID;

    fn fast() -> AcquireOptions {
        AcquireOptions {
            poll_interval: Duration::ZERO,
            reenumerate_timeout: Duration::from_millis(20),
        }
    }

    fn acquire(bus: &MockBus) -> Result<(ModelEntry, MockTransport)> {
        let mut state = SessionState::new();
        acquire_display_device(
            bus,
            &ModelRegistry::builtin(),
            &fast(),
            &NullObserver,
            &mut state,
        )
    }

    #[test]
    fn test_no_devices() {
        let bus = MockBus::new();
        let err = acquire(&bus).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NoSupportedDevice)
        ));
        assert_eq!(err.to_string(), "No supported devices found");
        // Both ids of every entry were tried, in table order.
        assert_eq!(bus.open_attempts().len(), BUILTIN_MODELS.len() * 2);
        assert_eq!(bus.open_attempts()[0], (VID, 0x200A));
        assert_eq!(bus.open_attempts()[1], (VID, 0x200B));
    }

    #[test]
    fn test_storage_device_is_switched() {
        let bus = MockBus::new();
        bus.attach(VID, 0x2012);
        bus.register_mode_switch(VID, 0x2012, 0x2013, 2);

        let mut state = SessionState::new();
        let (model, transport) = acquire_display_device(
            &bus,
            &ModelRegistry::builtin(),
            &fast(),
            &NullObserver,
            &mut state,
        )
        .unwrap();

        assert_eq!(model.kind, ModelKind::Spf85H);
        assert_eq!(transport.product_id(), 0x2013);
        assert!(bus.is_configured(VID, 0x2013));
        assert_eq!(state.phase, DevicePhase::DisplayMode);

        let controls = bus.control_log();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0], ((VID, 0x2012), MODE_SWITCH));
    }

    #[test]
    fn test_already_in_display_mode() {
        let bus = MockBus::new();
        bus.attach(VID, 0x200F);

        let (model, transport) = acquire(&bus).unwrap();
        assert_eq!(model.kind, ModelKind::Spf75H);
        assert_eq!(transport.product_id(), 0x200F);
        assert!(bus.control_log().is_empty());
    }

    #[test]
    fn test_first_entry_in_table_order_wins() {
        let bus = MockBus::new();
        bus.attach(VID, 0x2036); // SPF-107H
        bus.attach(VID, 0x200D); // SPF-83H

        let (model, _) = acquire(&bus).unwrap();
        assert_eq!(model.kind, ModelKind::Spf83H);
    }

    #[test]
    fn test_switch_without_reenumeration_moves_on() {
        let bus = MockBus::new();
        // SPF-72H in storage mode never comes back.
        bus.attach(VID, 0x200A);
        bus.register_mode_switch(VID, 0x200A, 0x200B, usize::MAX);
        bus.attach(VID, 0x2028); // SPF-107H (old firmware)

        let (model, _) = acquire(&bus).unwrap();
        assert_eq!(model.kind, ModelKind::Spf107HOld);
    }

    #[test]
    fn test_switch_answered_without_disconnect_is_fine() {
        let bus = MockBus::new();
        bus.attach(VID, 0x200A);
        bus.attach(VID, 0x200B);

        let (model, _) = acquire(&bus).unwrap();
        assert_eq!(model.kind, ModelKind::Spf72H);
        assert_eq!(bus.control_log().len(), 1);
    }

    #[test]
    fn test_unexpected_switch_failure_propagates() {
        let bus = MockBus::new();
        bus.attach(VID, 0x200A);
        bus.fail_control(0x06, "pipe error");

        let err = acquire(&bus).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::ControlFailed { .. })
        ));
    }

    #[test]
    fn test_switch_cut_off_by_bus_fault_still_reaches_display() {
        let bus = MockBus::new();
        bus.attach(VID, 0x200A);
        bus.register_mode_switch(VID, 0x200A, 0x200B, 1);
        bus.fault_control(0x06);

        let mut state = SessionState::new();
        let (model, transport) = acquire_display_device(
            &bus,
            &ModelRegistry::builtin(),
            &fast(),
            &NullObserver,
            &mut state,
        )
        .unwrap();
        assert_eq!(model.kind, ModelKind::Spf72H);
        assert_eq!(transport.product_id(), 0x200B);
        assert_eq!(state.phase, DevicePhase::DisplayMode);
    }

    #[test]
    fn test_switch_to_display_swallows_reset_signals_only() {
        let mock = MockTransport::new(VID, 0x200A);
        mock.bus().register_mode_switch(VID, 0x200A, 0x200B, 0);
        assert!(switch_to_display(&mock).is_ok());

        let mock = MockTransport::new(VID, 0x200A);
        mock.bus().fault_control(0x06);
        assert!(switch_to_display(&mock).is_ok());

        let mock = MockTransport::new(VID, 0x200A);
        mock.bus().fail_control(0x06, "stall");
        assert!(switch_to_display(&mock).is_err());
    }
}
