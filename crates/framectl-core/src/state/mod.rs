//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{AcquireOptions, HandlerContext, acquire_display_device, arm_device, transmit};
pub use machine::{DevicePhase, SessionState};
