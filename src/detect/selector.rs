use super::result::{Detection, FrameDetections, TrackedTarget};

/// Reduce a frame's detections to at most one control target.
///
/// Picks the detection with the largest area. Equal areas keep the first one
/// seen so that two identical boxes do not make the target flicker between
/// frames. Returns `None` for an empty frame.
pub fn select_target(frame: &FrameDetections) -> Option<TrackedTarget> {
    let mut best: Option<&Detection> = None;
    for det in frame {
        match best {
            Some(current) if det.area <= current.area => {}
            _ => best = Some(det),
        }
    }
    best.map(TrackedTarget::from)
}
