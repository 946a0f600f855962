//! nusb-based USB transport implementation.

use nusb::transfer::{Bulk, ControlIn, ControlType, Out, Recipient, TransferError};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbBus, UsbTransport};
use crate::protocol::{ControlRequest, RequestKind};

const DISPLAY_INTERFACE: u8 = 0;

/// Host USB bus accessed through nusb.
#[derive(Debug, Clone)]
pub struct NusbBus {
    control_timeout: Duration,
}

impl NusbBus {
    pub fn new(control_timeout: Duration) -> Self {
        Self { control_timeout }
    }
}

impl Default for NusbBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl UsbBus for NusbBus {
    type Transport = NusbTransport;

    #[instrument(level = "debug", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    fn open(&self, vid: u16, pid: u16) -> Result<Option<NusbTransport>, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid);

        let Some(device_info) = device_info else {
            debug!("No matching device");
            return Ok(None);
        };

        debug!(
            product = device_info.product_string().unwrap_or("unknown"),
            "Opening device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(Some(NusbTransport {
            device,
            interface: None,
            vid,
            pid,
            control_timeout: self.control_timeout,
        }))
    }
}

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
    /// Claimed once the device has been configured.
    interface: Option<Interface>,
    vid: u16,
    pid: u16,
    control_timeout: Duration,
}

fn map_transfer_error(
    err: TransferError,
    request: &ControlRequest,
    timeout: Duration,
) -> TransportError {
    match err {
        TransferError::Disconnected => TransportError::Disconnected,
        TransferError::Cancelled => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        TransferError::Fault => TransportError::Fault {
            request: request.to_string(),
            message: err.to_string(),
        },
        other => TransportError::ControlFailed {
            request: request.to_string(),
            message: other.to_string(),
        },
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self), fields(request = %request))]
    fn control_in(&self, request: &ControlRequest) -> Result<Vec<u8>, TransportError> {
        let control_type = match request.kind {
            RequestKind::Standard => ControlType::Standard,
            RequestKind::Vendor => ControlType::Vendor,
        };

        let data = self
            .device
            .control_in(
                ControlIn {
                    control_type,
                    recipient: Recipient::Device,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    length: request.length,
                },
                self.control_timeout,
            )
            .wait()
            .map_err(|e| map_transfer_error(e, request, self.control_timeout))?;

        debug!(bytes_read = data.len(), "Control transfer complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(endpoint = %format!("0x{:02X}", endpoint), len = data.len()))]
    fn bulk_write(&self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
        let interface = self
            .interface
            .as_ref()
            .ok_or(TransportError::NotConfigured)?;

        let ep = interface
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        // Buffer sized to the chunk so each call becomes exactly one transfer.
        let mut writer = ep.writer(data.len().max(1));
        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(vid = %format!("{:04X}", self.vid), pid = %format!("{:04X}", self.pid)))]
    fn set_configuration(&mut self) -> Result<(), TransportError> {
        let config_value = self
            .device
            .configurations()
            .next()
            .map(|c| c.configuration_value())
            .unwrap_or(1);

        self.device
            .set_configuration(config_value)
            .wait()
            .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))?;

        let interface = self
            .device
            .detach_and_claim_interface(DISPLAY_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: DISPLAY_INTERFACE,
                message: e.to_string(),
            })?;

        info!(configuration = config_value, "Device configured");
        self.interface = Some(interface);
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
