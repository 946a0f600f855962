//! Protocol module - SPF upload protocol definitions.

pub mod constants;
pub mod frame;
pub mod request;

pub use constants::*;
pub use frame::{FrameError, FrameHeader, frame, unframe};
pub use request::{ControlRequest, RequestKind};
