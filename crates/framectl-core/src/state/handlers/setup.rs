//! Setup handshake that arms a display-mode frame.

use anyhow::Result;
use tracing::{info, warn};

use super::HandlerContext;
use crate::events::{FrameEvent, FrameObserver, LogLevel};
use crate::state::machine::DevicePhase;
use crate::transport::UsbTransport;

/// Compare a setup response against what the model normally answers.
pub fn response_matches(actual: &[u8], expected: &[u8]) -> bool {
    actual == expected
}

/// Issue the model's setup request.
///
/// A response that differs from the expected bytes is reported but does not
/// stop the session; frames in the field answer inconsistently and still
/// accept images. Returns whether the response matched.
pub fn arm_device<T: UsbTransport, O: FrameObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<bool> {
    let handshake = ctx.model.kind.setup_handshake();
    info!(model = ctx.model.name, request = %handshake.request, "Sending setup command");

    let response = ctx.transport.control_in(&handshake.request)?;
    let verified = response_matches(&response, handshake.expected);
    if !verified {
        warn!(
            model = ctx.model.name,
            "Setup response mismatch: expected {:02X?}, got {:02X?}",
            handshake.expected,
            response
        );
        ctx.emit(FrameEvent::ResponseMismatch {
            expected: handshake.expected.to_vec(),
            actual: response,
        });
    } else {
        ctx.log(LogLevel::Debug, "Setup response verified");
    }

    ctx.state.setup_verified = Some(verified);
    if ctx.state.phase != DevicePhase::Armed {
        ctx.goto_phase(DevicePhase::Armed);
    }
    Ok(verified)
}
