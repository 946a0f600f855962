//! Controller session - high-level orchestrator for one photo frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::events::{FrameEvent, FrameObserver, LogLevel, TracingObserver};
use crate::models::{Geometry, ModelEntry, ModelRegistry};
use crate::protocol::constants::SAMSUNG_VENDOR_ID;
use crate::protocol::frame;
use crate::state::handlers::{
    AcquireOptions, HandlerContext, acquire_display_device, arm_device, transmit,
};
use crate::state::machine::{DevicePhase, SessionState};
use crate::transport::{NusbBus, NusbTransport, UsbBus, UsbTransport};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No supported devices found")]
    NoSupportedDevice,
    #[error("Device is not ready for images (phase: {0})")]
    NotArmed(DevicePhase),
    #[error("No decodable images in {}", .0.display())]
    NoImages(PathBuf),
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Configuration for a controller session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Poll period while waiting for the display-mode device, in ms.
    pub poll_interval_ms: u64,
    /// How long to wait for the display-mode device after a mode switch, in ms.
    pub reenumerate_timeout_ms: u64,
    /// Timeout applied to every control transfer, in ms.
    pub control_timeout_ms: u64,
    /// Vendor id used for all device lookups.
    pub vendor_id: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            reenumerate_timeout_ms: 5000,
            control_timeout_ms: 5000,
            vendor_id: SAMSUNG_VENDOR_ID,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reenumerate_timeout: Duration::from_millis(self.reenumerate_timeout_ms),
        }
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    /// The built-in model table under the configured vendor id.
    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::builtin_with_vendor(self.vendor_id)
    }
}

/// Sizes of one completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Image bytes, before framing.
    pub payload_len: usize,
    /// Header plus payload.
    pub framed_len: usize,
    pub blocks: usize,
    pub chunks: usize,
    /// Zero bytes appended to fill the last block.
    pub padding: usize,
}

/// An acquired frame plus the state needed to drive it.
pub struct ControllerSession<T: UsbTransport, O: FrameObserver = TracingObserver> {
    transport: T,
    model: ModelEntry,
    observer: Arc<O>,
    state: SessionState,
}

impl ControllerSession<NusbTransport, TracingObserver> {
    /// Find a frame on the host bus, switch it to display mode and arm it.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let bus = NusbBus::new(config.control_timeout());
        Self::connect_on(&bus, config, Arc::new(TracingObserver))
    }
}

impl<T: UsbTransport, O: FrameObserver> ControllerSession<T, O> {
    /// Find a frame on `bus` and bring it into display mode without arming it.
    #[instrument(skip_all)]
    pub fn acquire<B: UsbBus<Transport = T>>(
        bus: &B,
        config: &SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self> {
        let registry = config.registry();
        let mut state = SessionState::new();
        let (model, transport) = acquire_display_device(
            bus,
            &registry,
            &config.acquire_options(),
            observer.as_ref(),
            &mut state,
        )?;

        Ok(Self {
            transport,
            model,
            observer,
            state,
        })
    }

    /// Acquire and arm in one step.
    pub fn connect_on<B: UsbBus<Transport = T>>(
        bus: &B,
        config: &SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self> {
        let mut session = Self::acquire(bus, config, observer)?;
        session.arm()?;
        Ok(session)
    }

    /// Run the model's setup handshake. Returns whether the response matched.
    pub fn arm(&mut self) -> Result<bool> {
        let mut ctx = HandlerContext {
            transport: &self.transport,
            observer: self.observer.as_ref(),
            state: &mut self.state,
            model: &self.model,
        };
        arm_device(&mut ctx)
    }

    /// Frame `payload` and upload it.
    ///
    /// On failure the session stays armed; the caller may send the whole
    /// image again.
    #[instrument(skip(self, payload), fields(model = self.model.name, len = payload.len()))]
    pub fn send_image(&mut self, payload: &[u8]) -> Result<TransferReport> {
        if !self.state.is_armed() {
            return Err(SessionError::NotArmed(self.state.phase).into());
        }

        let framed = frame(payload)?;
        info!(bytes = payload.len(), "Sending image");

        let mut ctx = HandlerContext {
            transport: &self.transport,
            observer: self.observer.as_ref(),
            state: &mut self.state,
            model: &self.model,
        };
        let plan = transmit(&mut ctx, &framed)?;

        Ok(TransferReport {
            payload_len: payload.len(),
            framed_len: plan.stream_len,
            blocks: plan.blocks,
            chunks: plan.chunks,
            padding: plan.padding,
        })
    }

    /// Read a file and send its bytes unchanged.
    pub fn send_image_file<P: AsRef<Path>>(&mut self, path: P) -> Result<TransferReport> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        self.observer.on_event(&FrameEvent::Log {
            level: LogLevel::Debug,
            message: format!("Loaded {} ({} bytes)", path.display(), data.len()),
        });
        self.send_image(&data)
    }

    pub fn geometry(&self) -> Geometry {
        self.model.geometry
    }

    pub fn model(&self) -> &ModelEntry {
        &self.model
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::events::testing::RecordingObserver;
    use crate::models::ModelKind;
    use crate::protocol::constants::{BLOCK_SIZE, CHUNK_SIZE};
    use crate::protocol::request::{MODE_SWITCH, SETUP_STANDARD};
    use crate::transport::{MockBus, MockTransport, TransportError};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 0,
            reenumerate_timeout_ms: 20,
            ..Default::default()
        }
    }

    fn connect(bus: &MockBus) -> Result<ControllerSession<MockTransport, NullObserver>> {
        ControllerSession::connect_on(bus, &fast_config(), Arc::new(NullObserver))
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("framectl-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_connect_switches_and_arms() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x2033);
        bus.register_mode_switch(0x04E8, 0x2033, 0x2034, 1);
        bus.set_response(0x04, &[0x03]);

        let session = connect(&bus).unwrap();
        assert_eq!(session.model().kind, ModelKind::Spf87H);
        assert_eq!(session.geometry(), Geometry::new(800, 480));
        assert!(session.state().is_armed());
        assert_eq!(session.state().setup_verified, Some(true));

        let requests: Vec<_> = bus.control_log().into_iter().map(|(_, r)| r).collect();
        assert_eq!(requests, vec![MODE_SWITCH, SETUP_STANDARD]);
    }

    #[test]
    fn test_every_phase_transition_is_reported() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x2033);
        bus.register_mode_switch(0x04E8, 0x2033, 0x2034, 1);
        bus.set_response(0x04, &[0x03]);

        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            ControllerSession::connect_on(&bus, &fast_config(), Arc::clone(&observer)).unwrap();
        session.send_image(b"jpeg").unwrap();

        let phases: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FrameEvent::PhaseChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                (DevicePhase::Searching, DevicePhase::StorageMode),
                (DevicePhase::StorageMode, DevicePhase::Switching),
                (DevicePhase::Switching, DevicePhase::DisplayMode),
                (DevicePhase::DisplayMode, DevicePhase::Armed),
                (DevicePhase::Armed, DevicePhase::Transferring),
                (DevicePhase::Transferring, DevicePhase::Armed),
            ]
        );
    }

    #[test]
    fn test_connect_without_devices() {
        let bus = MockBus::new();
        let err = connect(&bus).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NoSupportedDevice)
        ));
    }

    #[test]
    fn test_send_small_image() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x2034);
        let mut session = connect(&bus).unwrap();

        let report = session.send_image(&[0xFF; 10]).unwrap();
        assert_eq!(
            report,
            TransferReport {
                payload_len: 10,
                framed_len: 22,
                blocks: 1,
                chunks: 8,
                padding: 131_050,
            }
        );

        let writes = bus.bulk_writes();
        assert_eq!(writes.len(), 8);
        assert!(writes.iter().all(|(ep, d)| *ep == 0x02 && d.len() == CHUNK_SIZE));
        let wire = bus.written_bytes();
        assert_eq!(
            &wire[..12],
            &[0xA5, 0x5A, 0x09, 0x04, 0x0A, 0x00, 0x00, 0x00, 0x46, 0x00, 0x00, 0x00]
        );
        assert_eq!(&wire[12..22], &[0xFF; 10]);
        assert_eq!(wire.len(), BLOCK_SIZE);
    }

    #[test]
    fn test_send_requires_armed_device() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x200B);
        let mut session: ControllerSession<MockTransport, NullObserver> =
            ControllerSession::acquire(&bus, &fast_config(), Arc::new(NullObserver)).unwrap();

        let err = session.send_image(b"jpeg").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NotArmed(DevicePhase::DisplayMode))
        ));
        assert!(bus.bulk_writes().is_empty());

        session.arm().unwrap();
        assert!(session.send_image(b"jpeg").is_ok());
    }

    #[test]
    fn test_failed_send_can_be_retried() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x200D);
        let mut session = connect(&bus).unwrap();

        bus.fail_bulk_after(2);
        let err = session.send_image(&[0u8; 100]).unwrap_err();
        assert!(err.downcast_ref::<TransportError>().is_some());
        assert!(session.state().is_armed());

        bus.fail_bulk_after(usize::MAX);
        bus.clear_logs();
        session.send_image(&[0u8; 100]).unwrap();
        assert_eq!(bus.bulk_writes().len(), 8);
        assert_eq!(session.state().images_sent, 1);
    }

    #[test]
    fn test_send_image_file() {
        let bus = MockBus::new();
        bus.attach(0x04E8, 0x200B);
        let mut session = connect(&bus).unwrap();

        let path = temp_path("image.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF\xE0fake").unwrap();
        let report = session.send_image_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(report.payload_len, 8);
        assert_eq!(&bus.written_bytes()[12..20], b"\xFF\xD8\xFF\xE0fake");
        assert!(session.send_image_file(temp_path("missing.jpg")).is_err());
    }

    #[test]
    fn test_vendor_id_override() {
        let bus = MockBus::new();
        bus.attach(0x1234, 0x200B);
        let config = SessionConfig {
            vendor_id: 0x1234,
            ..fast_config()
        };
        let session: ControllerSession<MockTransport, NullObserver> =
            ControllerSession::connect_on(&bus, &config, Arc::new(NullObserver)).unwrap();
        assert_eq!(session.transport().vendor_id(), 0x1234);
    }

    #[test]
    fn test_config_defaults_and_partial_toml() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.reenumerate_timeout_ms, 5000);
        assert_eq!(config.vendor_id, 0x04E8);

        let partial: SessionConfig = toml::from_str("reenumerate_timeout_ms = 8000").unwrap();
        assert_eq!(partial.reenumerate_timeout_ms, 8000);
        assert_eq!(partial.poll_interval_ms, 100);
    }

    #[test]
    fn test_config_file_save_and_load() {
        let path = temp_path("config.toml");
        let config = SessionConfig {
            poll_interval_ms: 250,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
