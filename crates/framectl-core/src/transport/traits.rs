//! USB Transport layer abstraction.
//!
//! Defines the `UsbBus` and `UsbTransport` traits for USB communication,
//! allowing different implementations (nusb, mock, etc.).

use crate::protocol::ControlRequest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationFailed(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to set configuration: {0}")]
    ConfigurationFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Device is not configured")]
    NotConfigured,

    #[error("Control transfer failed ({request}): {message}")]
    ControlFailed { request: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Short write on endpoint 0x{endpoint:02X}: {written} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        written: usize,
        expected: usize,
    },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The transfer ended with a bus-level error (EPROTO, EILSEQ, ETIME).
    #[error("Transfer fault ({request}): {message}")]
    Fault { request: String, message: String },
}

impl TransportError {
    /// True when the device went away underneath the transfer.
    ///
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }

    /// True for the errors a frame produces when it reboots in the middle of
    /// a request: the device vanishing, or the transfer being cut off on
    /// the wire.
    pub fn is_reset_signal(&self) -> bool {
        matches!(self, TransportError::Disconnected | TransportError::Fault { .. })
    }
}

/// Abstract handle to one open USB device.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
pub trait UsbTransport: Send + Sync {
    /// Issue a device-recipient IN control transfer and return the response.
    fn control_in(&self, request: &ControlRequest) -> Result<Vec<u8>, TransportError>;

    /// Write one buffer to a bulk OUT endpoint as a single transfer.
    fn bulk_write(&self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError>;

    /// Select the device's first configuration and claim its interface.
    fn set_configuration(&mut self) -> Result<(), TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

/// Something that can look up and open devices by VID/PID.
pub trait UsbBus {
    type Transport: UsbTransport;

    /// Open the first device matching `vid:pid`.
    ///
    /// Returns `Ok(None)` when no such device is attached.
    fn open(&self, vid: u16, pid: u16) -> Result<Option<Self::Transport>, TransportError>;
}
