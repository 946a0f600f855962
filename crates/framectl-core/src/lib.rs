//! framectl-core: host-side driver for Samsung SPF USB photo frames.
//!
//! A frame first shows up as a USB mass-storage device. This crate switches
//! it into its vendor "display" mode, runs the per-model setup handshake and
//! uploads JPEG images wrapped in the frame's 12-byte header.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Models**: Supported frames, their product ids and geometry
//! - **Protocol**: Constants, control requests, image framing
//! - **Payload**: Block padding and chunk splitting
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **State**: Device phases and the mode switch / setup / transfer handlers
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//! - **Slideshow**: Directory slideshow with image fitting
//!
//! # Example
//!
//! ```no_run
//! use framectl_core::session::{ControllerSession, SessionConfig};
//!
//! let mut session = ControllerSession::connect(&SessionConfig::default())?;
//! println!("{}", session.geometry());
//! session.send_image_file("photo.jpg")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod events;
pub mod models;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod slideshow;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use events::{FrameEvent, FrameObserver, LogLevel, NullObserver, TracingObserver, UsbMode};
pub use models::{Geometry, ModelEntry, ModelKind, ModelRegistry, RegistryError};
pub use payload::{BlockIterator, TransferPlan};
pub use protocol::{FrameError, FrameHeader, frame, unframe};
pub use session::{ControllerSession, SessionConfig, SessionError, TransferReport};
pub use slideshow::{Slideshow, SlideshowSummary, fit_to_geometry, prepare_image};
pub use state::{DevicePhase, SessionState};
pub use transport::{
    MockBus, MockTransport, NusbBus, NusbTransport, TransportError, UsbBus, UsbTransport,
};
