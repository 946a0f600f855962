//! Protocol constants for the Samsung SPF photo frame upload protocol.
//!
//! The vendor never documented the protocol; these values come from
//! captures of the vendor software on the wire.

// ============================================================================
// Device Identification
// ============================================================================

/// Samsung Electronics Vendor ID
pub const SAMSUNG_VENDOR_ID: u16 = 0x04E8;

// ============================================================================
// Control Requests
// ============================================================================

/// GET_DESCRIPTOR, abused by the frame firmware as the "switch to display
/// mode" trigger when sent with the values below.
pub const REQ_GET_DESCRIPTOR: u8 = 0x06;
pub const MODE_SWITCH_VALUE: u16 = 0x00FE;
pub const MODE_SWITCH_INDEX: u16 = 0x00FE;
pub const MODE_SWITCH_LENGTH: u16 = 254;

/// Vendor setup requests (display mode).
pub const REQ_SETUP_SPF75H: u8 = 0x01;
pub const REQ_SETUP_FALLBACK: u8 = 0x02;
pub const REQ_SETUP_STANDARD: u8 = 0x04;

/// String descriptor #1, language 0x0409 (en-US).
pub const STRING_DESCRIPTOR_VALUE: u16 = 0x0301;
pub const LANGID_EN_US: u16 = 0x0409;
pub const STRING_DESCRIPTOR_LENGTH: u16 = 255;

// ============================================================================
// Setup Responses
// ============================================================================

pub const SETUP_RESPONSE_STANDARD: &[u8] = &[0x03];
pub const SETUP_RESPONSE_SPF75H: &[u8] = &[0x09, 0x04];
pub const SETUP_RESPONSE_FALLBACK: &[u8] = &[0x46];

// ============================================================================
// Image Frame
// ============================================================================

/// Leading magic of every uploaded image.
pub const FRAME_MAGIC: [u8; 4] = [0xA5, 0x5A, 0x09, 0x04];

/// Fixed trailer following the length field.
pub const FRAME_TRAILER: [u8; 4] = [0x46, 0x00, 0x00, 0x00];

/// Header size: magic + u32 length + trailer.
pub const FRAME_HEADER_SIZE: usize = 12;

// ============================================================================
// Bulk Transfer Geometry
// ============================================================================

/// Bulk OUT endpoint used for image data.
pub const BULK_OUT_ENDPOINT: u8 = 0x02;

/// Buffer block size (128 KB). The last block is zero padded to this size.
pub const BLOCK_SIZE: usize = 0x20000;

/// Size of a single bulk write (16 KB).
pub const CHUNK_SIZE: usize = 0x4000;

/// Number of bulk writes per block.
pub const CHUNKS_PER_BLOCK: usize = BLOCK_SIZE / CHUNK_SIZE;

const _: () = assert!(BLOCK_SIZE % CHUNK_SIZE == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_whole_number_of_chunks() {
        assert_eq!(CHUNKS_PER_BLOCK, 8);
        assert_eq!(CHUNKS_PER_BLOCK * CHUNK_SIZE, BLOCK_SIZE);
    }

    #[test]
    fn test_header_size_matches_parts() {
        assert_eq!(
            FRAME_HEADER_SIZE,
            FRAME_MAGIC.len() + 4 + FRAME_TRAILER.len()
        );
    }
}
