//! The perception-to-actuation loop.
//!
//! One iteration per captured frame, strictly in capture order:
//! 1. Pull the frame's detections from the source
//! 2. Reduce them to at most one target
//! 3. Optionally report the target (`detected,...`) and log its area
//! 4. Run the command policy
//! 5. Hand any resulting line to the sink
//!
//! Delivery is best effort. A failed send is counted and logged; it is never
//! retried, because the next tick's decision supersedes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::area_log::AreaLog;
use crate::detect::select_target;
use crate::ingest::{CaptureError, DetectionSource};
use crate::policy::{CommandPolicy, Decision};
use crate::transport::{detected_line, CommandSink};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

pub struct LoopOptions {
    /// Send a `detected,...` line for every frame with a target.
    pub report_detections: bool,
    pub area_log: Option<AreaLog>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            report_detections: true,
            area_log: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Processed(Decision),
    /// The source lost this frame.
    Skipped,
    EndOfStream,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub targets: u64,
    pub skipped: u64,
    /// Decisions that produced a command or `undetected`.
    pub commands_emitted: u64,
    pub lines_sent: u64,
    pub send_failures: u64,
}

pub struct ControlLoop<S, K> {
    source: S,
    sink: K,
    policy: CommandPolicy,
    options: LoopOptions,
    stats: LoopStats,
}

impl<S: DetectionSource, K: CommandSink> ControlLoop<S, K> {
    pub fn new(source: S, sink: K, policy: CommandPolicy, options: LoopOptions) -> Self {
        Self {
            source,
            sink,
            policy,
            options,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run one iteration. Only a fatal capture error is returned as `Err`.
    pub fn step(&mut self, now: Instant) -> Result<StepOutcome> {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(StepOutcome::EndOfStream),
            Err(CaptureError::Skipped(reason)) => {
                log::warn!("{}: frame skipped: {}", self.source.name(), reason);
                self.stats.skipped += 1;
                return Ok(StepOutcome::Skipped);
            }
            Err(err @ CaptureError::Fatal(_)) => return Err(err.into()),
        };
        self.stats.frames += 1;
        log::debug!("detected {} objects in frame", frame.len());

        let target = select_target(&frame);
        if let Some(target) = &target {
            self.stats.targets += 1;
            if frame.len() == 1 && target.area > 0.0 {
                if let Some(area_log) = self.options.area_log.as_mut() {
                    if let Err(err) = area_log.record(target.area, target.confidence) {
                        log::warn!("area log write failed: {:#}", err);
                    }
                }
            }
            if self.options.report_detections {
                let line = detected_line(target, self.policy.offsets(target));
                self.deliver(&line);
            }
        }

        let decision = self.policy.tick(target.as_ref(), now);
        if decision.is_emitted() {
            self.stats.commands_emitted += 1;
        }
        if let Some(line) = decision.wire(self.policy.config().turn_polarity) {
            log::debug!("decision {:?} -> {}", decision, line);
            self.deliver(line);
        }
        Ok(StepOutcome::Processed(decision))
    }

    /// Iterate until the stream ends, capture fails fatally, or `running`
    /// is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> Result<LoopStats> {
        log::info!("control loop started (source={})", self.source.name());
        let mut last_stats_log = Instant::now();
        while running.load(Ordering::SeqCst) {
            if self.step(Instant::now())? == StepOutcome::EndOfStream {
                log::info!("{} stream ended", self.source.name());
                break;
            }
            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                self.log_stats();
                last_stats_log = Instant::now();
            }
        }
        self.log_stats();
        Ok(self.stats.clone())
    }

    fn deliver(&mut self, line: &str) {
        match self.sink.send(line) {
            Ok(()) => self.stats.lines_sent += 1,
            Err(err) => {
                self.stats.send_failures += 1;
                log::warn!("dropped '{}': {}", line, err);
            }
        }
    }

    fn log_stats(&self) {
        log::info!(
            "frames={} captured={} targets={} skipped={} emitted={} sent={} send_failures={}",
            self.stats.frames,
            self.source.frames_captured(),
            self.stats.targets,
            self.stats.skipped,
            self.stats.commands_emitted,
            self.stats.lines_sent,
            self.stats.send_failures
        );
    }
}
