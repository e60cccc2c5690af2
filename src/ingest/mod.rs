//! Detection sources.
//!
//! Neural-network inference and video capture live outside this crate. This
//! module defines the boundary the control loop pulls from, plus two
//! sources that need no camera:
//! - `stub://...` synthetic target (testing, bench runs)
//! - JSON-lines replay from a local file or `-` (stdin), e.g. detections
//!   piped from an external inference process
//!
//! Sources apply the detection threshold the way the external detector
//! does: anything below it is never reported.

pub mod replay;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::detect::FrameDetections;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

pub const DEFAULT_NETWORK: &str = "ssd-mobilenet-v2";
pub const DEFAULT_OVERLAY: &str = "box,labels,conf";
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;
pub const DEFAULT_FRAME_WIDTH: u32 = 1280;
pub const DEFAULT_FRAME_HEIGHT: u32 = 720;
pub const DEFAULT_TARGET_FPS: u32 = 10;

/// Why a frame could not be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// This frame is lost; the loop skips the tick and carries on.
    Skipped(String),
    /// The source cannot continue; the loop stops.
    Fatal(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Skipped(reason) => write!(f, "frame skipped: {}", reason),
            CaptureError::Fatal(reason) => write!(f, "capture failed: {}", reason),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Per-frame producer of detections.
pub trait DetectionSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &'static str;

    /// Block until the next frame's detections are available.
    ///
    /// `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<FrameDetections>, CaptureError>;

    /// Frames produced so far.
    fn frames_captured(&self) -> u64;
}

impl<T: DetectionSource + ?Sized> DetectionSource for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>, CaptureError> {
        (**self).next_frame()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }
}

/// Settings shared by every source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSettings {
    /// `stub://...`, `-` for stdin, or a local JSON-lines file.
    pub uri: String,
    pub width: u32,
    pub height: u32,
    /// Pacing for sources that are not naturally rate-limited; 0 disables it.
    pub target_fps: u32,
    /// Minimum confidence for a detection to be reported at all.
    pub detection_threshold: f32,
    /// Model identifier for the external detector.
    pub network: String,
    /// Overlay flags for the external renderer.
    pub overlay: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: "stub://target".to_string(),
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            network: DEFAULT_NETWORK.to_string(),
            overlay: DEFAULT_OVERLAY.to_string(),
        }
    }
}

/// Open the source named by `settings.uri`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn DetectionSource>> {
    let uri = settings.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("input uri must not be empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if uri == "-" {
        return Ok(Box::new(ReplaySource::stdin(settings.clone())));
    }
    if uri.contains("://") {
        return Err(anyhow!(
            "input '{}' needs the external inference pipeline; pipe its detections in with '-'",
            uri
        ));
    }
    Ok(Box::new(ReplaySource::open(settings.clone())?))
}

/// Sleeps out the remainder of a frame period.
pub(crate) struct FramePacer {
    period: Option<std::time::Duration>,
    next_deadline: Option<std::time::Instant>,
}

impl FramePacer {
    pub(crate) fn new(target_fps: u32) -> Self {
        let period = (target_fps > 0)
            .then(|| std::time::Duration::from_secs_f64(1.0 / f64::from(target_fps)));
        Self {
            period,
            next_deadline: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        let Some(period) = self.period else {
            return;
        };
        let now = std::time::Instant::now();
        if let Some(deadline) = self.next_deadline {
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        let base = self.next_deadline.map_or(now, |deadline| deadline.max(now));
        self.next_deadline = Some(base + period);
    }
}
