//! Image upload over the bulk OUT endpoint.

use anyhow::Result;
use tracing::{debug, instrument, trace};

use super::HandlerContext;
use crate::events::{FrameEvent, FrameObserver, LogLevel};
use crate::payload::{BlockIterator, TransferPlan, chunks};
use crate::protocol::constants::{BULK_OUT_ENDPOINT, FRAME_HEADER_SIZE};
use crate::state::machine::DevicePhase;
use crate::transport::{TransportError, UsbTransport};

/// Write one chunk, treating a short write as a failure.
fn write_chunk<T: UsbTransport>(transport: &T, chunk: &[u8]) -> Result<(), TransportError> {
    let written = transport.bulk_write(BULK_OUT_ENDPOINT, chunk)?;
    if written != chunk.len() {
        return Err(TransportError::ShortWrite {
            endpoint: BULK_OUT_ENDPOINT,
            written,
            expected: chunk.len(),
        });
    }
    Ok(())
}

fn write_blocks<T: UsbTransport, O: FrameObserver + ?Sized>(
    ctx: &HandlerContext<'_, T, O>,
    framed: &[u8],
) -> Result<TransferPlan> {
    if let Some(prelude) = ctx.model.kind.upload_prelude() {
        let response = ctx.transport.control_in(&prelude)?;
        trace!(len = response.len(), "Upload prelude answered");
    }

    let plan = TransferPlan::for_stream(framed.len());
    let blocks = BlockIterator::new(framed);
    let total_blocks = blocks.total();

    for (index, block) in blocks.enumerate() {
        for chunk in chunks(&block) {
            write_chunk(ctx.transport, chunk)?;
        }
        ctx.emit(FrameEvent::Progress {
            block: index + 1,
            total_blocks,
        });
    }

    Ok(plan)
}

/// Stream a framed image to an armed device.
///
/// The stream goes out in zero-padded 128 KB blocks, each written as eight
/// 16 KB bulk transfers. The session is back in `Armed` afterwards whether
/// or not the upload succeeded.
#[instrument(skip_all, fields(len = framed.len()))]
pub fn transmit<T: UsbTransport, O: FrameObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
    framed: &[u8],
) -> Result<TransferPlan> {
    ctx.goto_phase(DevicePhase::Transferring);
    let result = write_blocks(ctx, framed);
    ctx.goto_phase(DevicePhase::Armed);

    let plan = result?;
    let payload_len = plan.stream_len.saturating_sub(FRAME_HEADER_SIZE);
    ctx.state.images_sent += 1;
    ctx.state.bytes_sent += payload_len as u64;

    debug!(
        blocks = plan.blocks,
        chunks = plan.chunks,
        padding = plan.padding,
        "Upload finished"
    );
    ctx.emit(FrameEvent::TransferComplete {
        payload_len,
        blocks: plan.blocks,
    });
    ctx.log(
        LogLevel::Trace,
        format!("{} bytes on the wire", plan.wire_len()),
    );
    Ok(plan)
}
