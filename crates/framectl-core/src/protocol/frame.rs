//! Image frame envelope.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use thiserror::Error;

use super::constants::{FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_TRAILER};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Payload too large: {len} bytes does not fit a 32-bit length")]
    PayloadTooLarge { len: usize },
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Invalid magic: {0:02X?}")]
    InvalidMagic([u8; 4]),
    #[error("Invalid trailer: {0:02X?}")]
    InvalidTrailer([u8; 4]),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame header (12 bytes).
///
/// `A5 5A 09 04` | payload length (u32 LE) | `46 00 00 00`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload byte count, header excluded.
    pub length: u32,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn for_payload(payload: &[u8]) -> Result<Self, FrameError> {
        let length = u32::try_from(payload.len())
            .map_err(|_| FrameError::PayloadTooLarge { len: payload.len() })?;
        Ok(Self { length })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[..4].copy_from_slice(&FRAME_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.length);
        buf[8..].copy_from_slice(&FRAME_TRAILER);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != FRAME_MAGIC {
            return Err(FrameError::InvalidMagic(magic));
        }

        let length = cursor.read_u32::<LittleEndian>()?;

        let mut trailer = [0u8; 4];
        cursor.read_exact(&mut trailer)?;
        if trailer != FRAME_TRAILER {
            return Err(FrameError::InvalidTrailer(trailer));
        }

        Ok(Self { length })
    }
}

/// Wrap `payload` in the frame envelope.
///
/// The payload is not inspected; the device expects a JPEG but any bytes are
/// passed through.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header = FrameHeader::for_payload(payload)?;
    let mut out = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split a framed stream back into header and payload.
///
/// Bytes beyond the declared length (block padding) are ignored.
pub fn unframe(data: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    let header = FrameHeader::from_bytes(data)?;
    let end = FrameHeader::SIZE + header.length as usize;
    if data.len() < end {
        return Err(FrameError::BufferTooSmall {
            expected: end,
            actual: data.len(),
        });
    }
    Ok((header, &data[FrameHeader::SIZE..end]))
}
