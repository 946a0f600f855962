//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to subscribe to controller events
//! without tight coupling to the core logic.

use std::fmt;

use crate::state::DevicePhase;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// USB identity a frame was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbMode {
    Storage,
    Display,
}

impl fmt::Display for UsbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbMode::Storage => write!(f, "storage"),
            UsbMode::Display => write!(f, "display"),
        }
    }
}

/// Events emitted by a controller session.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A supported frame was found.
    DeviceFound {
        model: &'static str,
        mode: UsbMode,
        vid: u16,
        pid: u16,
    },
    /// Mode switch request sent; the device is rebooting.
    ModeSwitchIssued { model: &'static str },
    /// Phase changed.
    PhaseChanged { from: DevicePhase, to: DevicePhase },
    /// Setup response differed from the expected bytes.
    ResponseMismatch {
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    /// One block of the current image has been written.
    Progress { block: usize, total_blocks: usize },
    /// Whole image written.
    TransferComplete { payload_len: usize, blocks: usize },
    /// Log message.
    Log { level: LogLevel, message: String },
}

/// Observer trait for receiving controller events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FrameObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &FrameEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FrameObserver for NullObserver {
    fn on_event(&self, _event: &FrameEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FrameObserver for TracingObserver {
    fn on_event(&self, event: &FrameEvent) {
        match event {
            FrameEvent::DeviceFound {
                model,
                mode,
                vid,
                pid,
            } => {
                tracing::info!(
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    "Found {} in {} mode",
                    model,
                    mode
                );
            }
            FrameEvent::ModeSwitchIssued { model } => {
                tracing::info!(model = %model, "Setting device to display mode");
            }
            FrameEvent::PhaseChanged { from, to } => {
                tracing::trace!(from = %from, to = %to, "Phase changed");
            }
            FrameEvent::ResponseMismatch { expected, actual } => {
                tracing::debug!("Expected {:02X?} but got {:02X?}", expected, actual);
            }
            FrameEvent::Progress {
                block,
                total_blocks,
            } => {
                tracing::debug!(block = block, total = total_blocks, "Block written");
            }
            FrameEvent::TransferComplete {
                payload_len,
                blocks,
            } => {
                tracing::info!(bytes = payload_len, blocks = blocks, "Image sent");
            }
            FrameEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
