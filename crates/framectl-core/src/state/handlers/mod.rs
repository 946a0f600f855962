//! Phase handlers - the work done in each device phase.
//!
//! This module is split into submodules by phase:
//! - `mode_switch`: find a frame and bring it into display mode
//! - `setup`: arm a display-mode frame for image reception
//! - `transfer`: stream a framed image in blocks and chunks

mod mode_switch;
mod setup;
mod transfer;

use crate::events::{FrameEvent, FrameObserver, LogLevel};
use crate::models::ModelEntry;
use crate::state::machine::{DevicePhase, SessionState};
use crate::transport::UsbTransport;

pub use mode_switch::{AcquireOptions, acquire_display_device, switch_to_display};
pub use setup::{arm_device, response_matches};
pub use transfer::transmit;

/// Move `state` to `next` and report the change to `observer`.
pub(crate) fn change_phase<O: FrameObserver + ?Sized>(
    state: &mut SessionState,
    observer: &O,
    next: DevicePhase,
) {
    let from = state.phase;
    state.goto_phase(next);
    if from != next {
        observer.on_event(&FrameEvent::PhaseChanged { from, to: next });
    }
}

/// Handler context for an open display-mode device.
pub struct HandlerContext<'a, T: UsbTransport, O: FrameObserver + ?Sized> {
    pub transport: &'a T,
    pub observer: &'a O,
    pub state: &'a mut SessionState,
    pub model: &'a ModelEntry,
}

impl<'a, T: UsbTransport, O: FrameObserver + ?Sized> HandlerContext<'a, T, O> {
    pub(crate) fn emit(&self, event: FrameEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn goto_phase(&mut self, next: DevicePhase) {
        change_phase(&mut *self.state, self.observer, next);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(FrameEvent::Log {
            level,
            message: message.into(),
        });
    }
}
