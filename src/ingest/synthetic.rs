//! Synthetic detection source (`stub://`).
//!
//! Simulates a single object wandering across the frame:
//! - horizontal sweep around the image center with per-frame jitter
//! - box grows as the object "approaches", then resets
//! - short dropouts where nothing is detected
//! - a small low-confidence distractor that the threshold usually removes

use rand::Rng;

use super::{CaptureError, DetectionSource, FramePacer, SourceSettings};
use crate::detect::{BoundingBox, Detection, FrameDetections};

/// Frames per full left-right-left sweep.
const SWEEP_FRAMES: u64 = 120;
/// Every `DROPOUT_EVERY` frames the target disappears for `DROPOUT_LEN`.
const DROPOUT_EVERY: u64 = 90;
const DROPOUT_LEN: u64 = 6;
const JITTER_PX: f32 = 8.0;
const TARGET_CLASS: u32 = 1;
const DISTRACTOR_CLASS: u32 = 44;

pub struct SyntheticSource {
    settings: SourceSettings,
    pacer: FramePacer,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        log::info!(
            "SyntheticSource: {} ({}x{}, network={}, threshold={:.2})",
            settings.uri,
            settings.width,
            settings.height,
            settings.network,
            settings.detection_threshold
        );
        Self {
            pacer: FramePacer::new(settings.target_fps),
            settings,
            frame_count: 0,
        }
    }

    fn generate(&self, rng: &mut impl Rng) -> FrameDetections {
        let n = self.frame_count;
        if n % DROPOUT_EVERY < DROPOUT_LEN {
            return FrameDetections::empty();
        }

        let width = self.settings.width as f32;
        let height = self.settings.height as f32;
        let phase = (n % SWEEP_FRAMES) as f32 / SWEEP_FRAMES as f32 * std::f32::consts::TAU;
        let cx = width / 2.0 + phase.sin() * width * 0.35 + rng.gen_range(-JITTER_PX..=JITTER_PX);
        let cy = height / 2.0 + rng.gen_range(-JITTER_PX..=JITTER_PX);

        // Approach: box side grows from 10% to 60% of the frame height.
        let progress = (n % (SWEEP_FRAMES * 3)) as f32 / (SWEEP_FRAMES * 3) as f32;
        let half = height * (0.05 + 0.25 * progress);
        let target = Detection::new(
            TARGET_CLASS,
            rng.gen_range(0.55..0.99),
            clamp_box(cx - half, cy - half, cx + half, cy + half, width, height),
        );

        let distractor = Detection::new(
            DISTRACTOR_CLASS,
            rng.gen_range(0.2..0.6),
            BoundingBox::new(width * 0.05, height * 0.05, width * 0.12, height * 0.15),
        );

        FrameDetections::new(vec![distractor, target])
    }
}

fn clamp_box(left: f32, top: f32, right: f32, bottom: f32, width: f32, height: f32) -> BoundingBox {
    BoundingBox::new(
        left.clamp(0.0, width),
        top.clamp(0.0, height),
        right.clamp(0.0, width),
        bottom.clamp(0.0, height),
    )
}

impl DetectionSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>, CaptureError> {
        self.pacer.wait();
        let mut frame = self.generate(&mut rand::thread_rng());
        self.frame_count += 1;
        frame.retain_confident(self.settings.detection_threshold);
        Ok(Some(frame))
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
