//! Control transfer requests issued to the frame.
//!
//! Every request the frame understands is an IN transfer addressed to the
//! device, so only the request type (standard or vendor) varies.

use std::fmt;

use super::constants::*;

/// bmRequestType "type" bits for the requests we send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Vendor,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Standard => write!(f, "standard"),
            RequestKind::Vendor => write!(f, "vendor"),
        }
    }
}

/// A device-recipient IN control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: RequestKind,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// Expected response length (wLength).
    pub length: u16,
}

impl ControlRequest {
    pub const fn standard(request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            kind: RequestKind::Standard,
            request,
            value,
            index,
            length,
        }
    }

    pub const fn vendor(request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            kind: RequestKind::Vendor,
            request,
            value,
            index,
            length,
        }
    }

    /// Raw bmRequestType byte (direction IN, recipient device).
    pub fn request_type(&self) -> u8 {
        let type_bits = match self.kind {
            RequestKind::Standard => 0x00,
            RequestKind::Vendor => 0x40,
        };
        0x80 | type_bits
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} req=0x{:02X} value=0x{:04X} index=0x{:04X} len={}",
            self.kind, self.request, self.value, self.index, self.length
        )
    }
}

/// Reboots a storage-mode frame into display mode.
pub const MODE_SWITCH: ControlRequest = ControlRequest::standard(
    REQ_GET_DESCRIPTOR,
    MODE_SWITCH_VALUE,
    MODE_SWITCH_INDEX,
    MODE_SWITCH_LENGTH,
);

/// Setup request for most models.
pub const SETUP_STANDARD: ControlRequest = ControlRequest::vendor(REQ_SETUP_STANDARD, 0, 0, 1);

/// Setup request for the SPF-75H.
pub const SETUP_SPF75H: ControlRequest = ControlRequest::vendor(REQ_SETUP_SPF75H, 0, 0, 2);

/// Setup request for old firmware revisions.
pub const SETUP_FALLBACK: ControlRequest = ControlRequest::vendor(REQ_SETUP_FALLBACK, 0, 0, 1);

/// String descriptor read the SPF-75H needs before accepting image data.
pub const UPLOAD_PRELUDE: ControlRequest = ControlRequest::standard(
    REQ_GET_DESCRIPTOR,
    STRING_DESCRIPTOR_VALUE,
    LANGID_EN_US,
    STRING_DESCRIPTOR_LENGTH,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_byte() {
        assert_eq!(MODE_SWITCH.request_type(), 0x80);
        assert_eq!(SETUP_STANDARD.request_type(), 0xC0);
    }

    #[test]
    fn test_mode_switch_values() {
        assert_eq!(MODE_SWITCH.request, 0x06);
        assert_eq!(MODE_SWITCH.value, 0xFE);
        assert_eq!(MODE_SWITCH.index, 0xFE);
        assert_eq!(MODE_SWITCH.length, 254);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(
            UPLOAD_PRELUDE.to_string(),
            "standard req=0x06 value=0x0301 index=0x0409 len=255"
        );
    }
}
