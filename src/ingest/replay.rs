//! JSON-lines detection replay.
//!
//! One line per frame. A line is either an array of detections or an object
//! with a `detections` array:
//!
//! ```text
//! [{"class_id":1,"confidence":0.97,"left":50,"top":75,"right":1279,"bottom":719}]
//! {"detections":[]}
//! ```
//!
//! Blank lines are ignored. A line that does not parse loses that frame
//! only. End of input ends the stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use super::{CaptureError, DetectionSource, FramePacer, SourceSettings};
use crate::detect::{BoundingBox, Detection, FrameDetections};

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    #[serde(default)]
    class_id: u32,
    confidence: f32,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FrameRecord {
    Bare(Vec<DetectionRecord>),
    Wrapped { detections: Vec<DetectionRecord> },
}

impl FrameRecord {
    fn into_frame(self) -> FrameDetections {
        let records = match self {
            FrameRecord::Bare(records) => records,
            FrameRecord::Wrapped { detections } => detections,
        };
        records
            .into_iter()
            .map(|r| {
                Detection::new(
                    r.class_id,
                    r.confidence,
                    BoundingBox::new(r.left, r.top, r.right, r.bottom),
                )
            })
            .collect::<Vec<_>>()
            .into()
    }
}

/// Parse one replay line into a frame.
pub fn parse_frame_line(line: &str) -> Result<FrameDetections> {
    let record: FrameRecord =
        serde_json::from_str(line).map_err(|e| anyhow!("invalid detection record: {}", e))?;
    Ok(record.into_frame())
}

pub struct ReplaySource {
    settings: SourceSettings,
    reader: Box<dyn BufRead + Send>,
    pacer: FramePacer,
    frame_count: u64,
    line_number: u64,
}

impl ReplaySource {
    /// Replay from a local file named by `settings.uri`.
    pub fn open(settings: SourceSettings) -> Result<Self> {
        let file = File::open(&settings.uri)
            .with_context(|| format!("failed to open detection replay {}", settings.uri))?;
        log::info!("ReplaySource: reading {}", settings.uri);
        Ok(Self::from_reader(settings, BufReader::new(file)))
    }

    /// Replay from standard input.
    pub fn stdin(settings: SourceSettings) -> Self {
        log::info!("ReplaySource: reading stdin");
        Self::from_reader(settings, BufReader::new(io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(settings: SourceSettings, reader: R) -> Self {
        Self {
            pacer: FramePacer::new(settings.target_fps),
            settings,
            reader: Box::new(reader),
            frame_count: 0,
            line_number: 0,
        }
    }
}

impl DetectionSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>, CaptureError> {
        let mut raw = Vec::new();
        loop {
            raw.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| CaptureError::Fatal(format!("replay read failed: {}", e)))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            if !raw.iter().all(u8::is_ascii_whitespace) {
                break;
            }
        }

        self.pacer.wait();
        self.frame_count += 1;
        // The bad line is already consumed, so only this frame is lost.
        let line = std::str::from_utf8(&raw).map_err(|_| {
            CaptureError::Skipped(format!("line {}: invalid UTF-8", self.line_number))
        })?;
        let mut frame = parse_frame_line(line.trim())
            .map_err(|e| CaptureError::Skipped(format!("line {}: {}", self.line_number, e)))?;
        frame.retain_confident(self.settings.detection_threshold);
        Ok(Some(frame))
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(input: &str) -> ReplaySource {
        let settings = SourceSettings {
            target_fps: 0,
            ..SourceSettings::default()
        };
        ReplaySource::from_reader(settings, Cursor::new(input.to_string()))
    }

    #[test]
    fn replays_both_line_shapes_until_eof() {
        let mut src = source(concat!(
            r#"[{"class_id":1,"confidence":0.97,"left":50,"top":75,"right":1279,"bottom":719}]"#,
            "\n\n",
            r#"{"detections":[]}"#,
            "\n"
        ));
        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 1);
        let det = first.iter().next().unwrap();
        assert_eq!(det.class_id, 1);
        assert_eq!(det.center.x, 664.5);

        let second = src.next_frame().unwrap().unwrap();
        assert!(second.is_empty());

        assert_eq!(src.next_frame().unwrap(), None);
        assert_eq!(src.frames_captured(), 2);
    }

    #[test]
    fn malformed_line_skips_only_that_frame() {
        let mut src = source("not json\n[]\n");
        assert!(matches!(src.next_frame(), Err(CaptureError::Skipped(_))));
        assert_eq!(src.next_frame().unwrap(), Some(FrameDetections::empty()));
    }

    #[test]
    fn invalid_utf8_line_skips_only_that_frame() {
        let settings = SourceSettings {
            target_fps: 0,
            ..SourceSettings::default()
        };
        let mut input = b"[]\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"[]\n");
        let mut src = ReplaySource::from_reader(settings, Cursor::new(input));

        assert_eq!(src.next_frame().unwrap(), Some(FrameDetections::empty()));
        match src.next_frame() {
            Err(CaptureError::Skipped(reason)) => assert_eq!(reason, "line 2: invalid UTF-8"),
            other => panic!("expected a skipped frame, got {:?}", other),
        }
        assert_eq!(src.next_frame().unwrap(), Some(FrameDetections::empty()));
        assert_eq!(src.next_frame().unwrap(), None);
    }

    #[test]
    fn read_errors_are_fatal() {
        struct Broken;

        impl std::io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
            }
        }

        let settings = SourceSettings {
            target_fps: 0,
            ..SourceSettings::default()
        };
        let mut src = ReplaySource::from_reader(settings, BufReader::new(Broken));
        assert!(matches!(src.next_frame(), Err(CaptureError::Fatal(_))));
    }

    #[test]
    fn below_threshold_detections_are_dropped() {
        let mut src = source(concat!(
            r#"[{"confidence":0.2,"left":0,"top":0,"right":10,"bottom":10},"#,
            r#"{"confidence":0.8,"left":0,"top":0,"right":5,"bottom":5}]"#,
            "\n"
        ));
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.iter().next().unwrap().area, 25.0);
    }
}
