//! Block and chunk splitting for framed images.
//!
//! The frame firmware reads image data in 128 KB buffers. The host therefore
//! sends the framed stream as whole blocks, zero padding the final one, and
//! writes each block as eight 16 KB bulk transfers.

use std::borrow::Cow;

use crate::protocol::constants::{BLOCK_SIZE, CHUNK_SIZE, CHUNKS_PER_BLOCK};

/// Iterator over fixed-size blocks of a framed stream.
///
/// Full blocks borrow from the input; the final short block is copied and
/// zero padded.
#[derive(Debug)]
pub struct BlockIterator<'a> {
    data: &'a [u8],
    offset: usize,
    current_block: usize,
}

impl<'a> BlockIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            current_block: 0,
        }
    }

    /// Total number of blocks (including the padded one).
    pub fn total(&self) -> usize {
        self.data.len().div_ceil(BLOCK_SIZE)
    }

    /// Index of the next block to be returned.
    pub fn current(&self) -> usize {
        self.current_block
    }
}

impl<'a> Iterator for BlockIterator<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let block = if remaining >= BLOCK_SIZE {
            Cow::Borrowed(&self.data[self.offset..self.offset + BLOCK_SIZE])
        } else {
            let mut padded = Vec::with_capacity(BLOCK_SIZE);
            padded.extend_from_slice(&self.data[self.offset..]);
            padded.resize(BLOCK_SIZE, 0);
            Cow::Owned(padded)
        };

        self.offset += BLOCK_SIZE.min(remaining);
        self.current_block += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total() - self.current_block;
        (left, Some(left))
    }
}

impl ExactSizeIterator for BlockIterator<'_> {}

/// Split one block into bulk-transfer chunks.
pub fn chunks(block: &[u8]) -> std::slice::ChunksExact<'_, u8> {
    block.chunks_exact(CHUNK_SIZE)
}

/// Sizes of an upload, computed up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Framed stream length (header + payload).
    pub stream_len: usize,
    pub blocks: usize,
    pub chunks: usize,
    /// Zero bytes appended to the final block.
    pub padding: usize,
}

impl TransferPlan {
    pub fn for_stream(stream_len: usize) -> Self {
        let blocks = stream_len.div_ceil(BLOCK_SIZE);
        Self {
            stream_len,
            blocks,
            chunks: blocks * CHUNKS_PER_BLOCK,
            padding: blocks * BLOCK_SIZE - stream_len,
        }
    }

    /// Bytes put on the wire.
    pub fn wire_len(&self) -> usize {
        self.blocks * BLOCK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn test_small_stream_single_padded_block() {
        let framed = frame(&[0xFF; 10]).unwrap();
        let blocks: Vec<_> = BlockIterator::new(&framed).collect();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), BLOCK_SIZE);
        assert_eq!(&blocks[0][..22], &framed[..]);
        assert!(blocks[0][22..].iter().all(|&b| b == 0));
        assert_eq!(chunks(&blocks[0]).count(), 8);

        let plan = TransferPlan::for_stream(framed.len());
        assert_eq!(plan.blocks, 1);
        assert_eq!(plan.chunks, 8);
        assert_eq!(plan.padding, 131_050);
    }

    #[test]
    fn test_exact_multiple_has_no_extra_block() {
        let data = pattern(BLOCK_SIZE * 2);
        let iter = BlockIterator::new(&data);
        assert_eq!(iter.total(), 2);

        let blocks: Vec<_> = iter.collect();
        assert!(blocks.iter().all(|b| matches!(b, Cow::Borrowed(_))));
        assert_eq!(TransferPlan::for_stream(data.len()).padding, 0);
    }

    #[test]
    fn test_every_block_is_full_and_splits_into_eight_chunks() {
        for len in [
            1,
            CHUNK_SIZE - 1,
            CHUNK_SIZE,
            BLOCK_SIZE - 1,
            BLOCK_SIZE + 1,
            3 * BLOCK_SIZE + 17,
        ] {
            let data = pattern(len);
            for block in BlockIterator::new(&data) {
                assert_eq!(block.len(), BLOCK_SIZE, "len {}", len);
                let sizes: Vec<_> = chunks(&block).map(|c| c.len()).collect();
                assert_eq!(sizes, vec![CHUNK_SIZE; CHUNKS_PER_BLOCK], "len {}", len);
                assert!(chunks(&block).remainder().is_empty());
            }
        }
    }

    #[test]
    fn test_reassembly_reproduces_stream() {
        for len in [12, 5000, BLOCK_SIZE, BLOCK_SIZE + 12, 2 * BLOCK_SIZE + CHUNK_SIZE + 5] {
            let data = pattern(len);
            let mut wire = Vec::new();
            for block in BlockIterator::new(&data) {
                for chunk in chunks(&block) {
                    wire.extend_from_slice(chunk);
                }
            }

            let plan = TransferPlan::for_stream(len);
            assert_eq!(wire.len(), plan.wire_len());
            assert_eq!(&wire[..len], &data[..]);
            assert!(wire[len..].iter().all(|&b| b == 0));
            assert_eq!(wire.len() - len, plan.padding);
        }
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let iter = BlockIterator::new(&[]);
        assert_eq!(iter.len(), 0);
        assert_eq!(TransferPlan::for_stream(0).blocks, 0);
    }

    #[test]
    fn test_short_stream_terminates_after_one_block() {
        let mut iter = BlockIterator::new(&[1, 2, 3]);
        assert_eq!(iter.total(), 1);
        assert_eq!(iter.next().map(|b| b.len()), Some(BLOCK_SIZE));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_block_progress_tracking() {
        let data = pattern(BLOCK_SIZE + 1);
        let mut iter = BlockIterator::new(&data);
        assert_eq!(iter.current(), 0);
        iter.next();
        assert_eq!(iter.current(), 1);
        assert_eq!(iter.len(), 1);
    }
}
