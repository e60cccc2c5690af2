mod result;
mod selector;

pub use result::{BoundingBox, Detection, FrameDetections, Point, TrackedTarget};
pub use selector::select_target;
