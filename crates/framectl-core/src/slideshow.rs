//! Directory slideshow.
//!
//! Every file in a directory is decoded, fitted into the frame's geometry on
//! a black canvas, encoded as JPEG and sent in name order, with a pause
//! between images. Encoded images are cached by file name so later rounds
//! skip the decode and resize.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::events::FrameObserver;
use crate::models::Geometry;
use crate::session::{ControllerSession, SessionError};
use crate::transport::UsbTransport;

pub const JPEG_QUALITY: u8 = 90;

const SLEEP_STEP: Duration = Duration::from_millis(100);

/// Scale `image` to fit inside `geometry`, keeping its aspect ratio, and
/// center it on a black canvas of exactly that size.
pub fn fit_to_geometry(image: &DynamicImage, geometry: Geometry) -> RgbImage {
    let scaled = image
        .resize(geometry.width, geometry.height, FilterType::Lanczos3)
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(geometry.width, geometry.height, Rgb([0, 0, 0]));
    let x = (geometry.width - scaled.width()) / 2;
    let y = (geometry.height - scaled.height()) / 2;
    imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, SessionError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf)
}

/// Decode arbitrary image bytes and produce a frame-ready JPEG.
pub fn prepare_image(data: &[u8], geometry: Geometry) -> Result<Vec<u8>, SessionError> {
    let decoded = image::load_from_memory(data)?;
    encode_jpeg(&fit_to_geometry(&decoded, geometry))
}

/// What a slideshow run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlideshowSummary {
    /// Rounds that went through the whole directory.
    pub rounds: usize,
    pub images_sent: usize,
    /// The stop flag ended the run.
    pub interrupted: bool,
}

pub struct Slideshow {
    dir: PathBuf,
    geometry: Geometry,
    interval: Duration,
    rounds: Option<usize>,
    stop: Arc<AtomicBool>,
    cache: HashMap<String, Vec<u8>>,
}

impl Slideshow {
    pub fn new<P: Into<PathBuf>>(dir: P, geometry: Geometry, stop: Arc<AtomicBool>) -> Self {
        Self {
            dir: dir.into(),
            geometry,
            interval: Duration::from_secs(5),
            rounds: None,
            stop,
            cache: HashMap::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after `rounds` passes over the directory. `None` runs until stopped.
    pub fn with_rounds(mut self, rounds: Option<usize>) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Regular files in the directory, sorted by name.
    pub fn list_images(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read directory {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Frame-ready bytes for `path`, or `None` if it is not a decodable image.
    pub fn prepare(&mut self, path: &Path) -> Result<Option<Vec<u8>>> {
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(bytes) = self.cache.get(&key) {
            debug!(file = %key, "Using cached image");
            return Ok(Some(bytes.clone()));
        }

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        match prepare_image(&data, self.geometry) {
            Ok(bytes) => {
                debug!(file = %key, jpeg_len = bytes.len(), "Image prepared");
                self.cache.insert(key, bytes.clone());
                Ok(Some(bytes))
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping file");
                Ok(None)
            }
        }
    }

    /// Sleep for the interval, waking early if the stop flag is set.
    fn pause(&self) {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(SLEEP_STEP.min(deadline - now));
        }
    }

    /// Show the directory on `session` until the round limit or the stop flag.
    ///
    /// The stop flag is only looked at between images, so an image that has
    /// started uploading is always sent completely.
    pub fn run<T: UsbTransport, O: FrameObserver>(
        &mut self,
        session: &mut ControllerSession<T, O>,
    ) -> Result<SlideshowSummary> {
        let mut summary = SlideshowSummary::default();
        info!(dir = %self.dir.display(), geometry = %self.geometry, "Starting slideshow");

        while self.rounds.is_none_or(|limit| summary.rounds < limit) {
            let mut shown = 0;
            for path in self.list_images()? {
                if self.stopped() {
                    summary.interrupted = true;
                    return Ok(summary);
                }
                let Some(bytes) = self.prepare(&path)? else {
                    continue;
                };

                info!(file = %path.display(), "Showing image");
                session.send_image(&bytes)?;
                summary.images_sent += 1;
                shown += 1;
                self.pause();
            }

            if shown == 0 {
                if self.stopped() {
                    summary.interrupted = true;
                    return Ok(summary);
                }
                return Err(SessionError::NoImages(self.dir.clone()).into());
            }
            summary.rounds += 1;
        }

        summary.interrupted = self.stopped();
        Ok(summary)
    }
}
