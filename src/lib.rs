//! Dogbot target follower.
//!
//! Turns a stream of noisy, possibly empty per-frame object detections into
//! a small set of debounced motion commands and delivers them to a remote
//! actuator process over a TCP link that survives disconnects.
//!
//! # Data flow
//!
//! ```text
//! DetectionSource → FrameDetections → select_target → CommandPolicy → CommandSink
//!  (external)                          (largest box)   (dwell/debounce)  (TransportClient)
//! ```
//!
//! # Module Structure
//!
//! - `detect`: detection value types and target selection
//! - `policy`: command state machine with dead-zone and dwell time
//! - `transport`: line-delimited TCP client with heartbeat and reconnect
//! - `ingest`: capture-facing source boundary (synthetic, JSON-lines replay)
//! - `control`: the loop tying the above together
//! - `area_log`: per-run diagnostic log
//! - `config`: layered daemon configuration

pub mod area_log;
pub mod config;
pub mod control;
pub mod detect;
pub mod ingest;
pub mod policy;
pub mod transport;

pub use area_log::AreaLog;
pub use control::{ControlLoop, LoopOptions, LoopStats, StepOutcome};
pub use detect::{select_target, BoundingBox, Detection, FrameDetections, Point, TrackedTarget};
pub use ingest::{open_source, CaptureError, DetectionSource, SourceSettings};
pub use policy::{Command, CommandPolicy, ControlState, Decision, PolicyConfig, TurnPolarity};
pub use transport::{CommandSink, TransportClient, TransportConfig, TransportError};
