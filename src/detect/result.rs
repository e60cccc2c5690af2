/// Axis-aligned box in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2.0,
            y: (self.top + self.bottom) / 2.0,
        }
    }

    /// Width × height; inverted boxes have zero area.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One object reported by the inference collaborator for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    /// Detector confidence (0..1).
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub center: Point,
    pub area: f32,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            center: bbox.center(),
            area: bbox.area(),
            bbox,
        }
    }
}

/// All detections for a single captured frame.
///
/// Created once per capture cycle and consumed synchronously by the control
/// loop. Order carries no meaning beyond tie-breaking in target selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// Drop detections below the detector's reporting threshold.
    pub fn retain_confident(&mut self, threshold: f32) {
        self.detections.retain(|det| det.confidence >= threshold);
    }
}

impl From<Vec<Detection>> for FrameDetections {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

impl<'a> IntoIterator for &'a FrameDetections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The single detection chosen as this frame's control target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedTarget {
    pub x: f32,
    pub y: f32,
    pub area: f32,
    /// Carried for telemetry only; never gates a command.
    pub confidence: f32,
}

impl From<&Detection> for TrackedTarget {
    fn from(det: &Detection) -> Self {
        Self {
            x: det.center.x,
            y: det.center.y,
            area: det.area,
            confidence: det.confidence,
        }
    }
}
