//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockBus, MockTransport};
pub use nusb::{NusbBus, NusbTransport};
pub use traits::{TransportError, UsbBus, UsbTransport};
