//! Command policy: positional error → debounced motion command.
//!
//! The policy classifies the tracked target's horizontal offset from the image
//! center into a candidate command and only acts on a candidate after it has
//! persisted for a full dwell window. Repeats of the same command are spaced
//! at least one dwell window apart. Absence of a target is reported
//! immediately on every tick.

use std::time::{Duration, Instant};

use crate::detect::{Point, TrackedTarget};

pub const DEFAULT_ERROR_BAND: f32 = 150.0;
pub const DEFAULT_DWELL: Duration = Duration::from_millis(200);
/// Area above which a centered target is considered close enough to grab.
pub const REFERENCE_GRAB_AREA: f32 = 180_000.0;

pub const UNDETECTED_TOKEN: &str = "undetected";

/// Outbound command alphabet. `Idle` is the resting state and is never sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Idle,
    TurnRight,
    TurnLeft,
    Heading,
    HeadingTarget,
    Grab,
}

impl Command {
    pub fn wire_token(self, polarity: TurnPolarity) -> Option<&'static str> {
        match (self, polarity) {
            (Command::Idle, _) => None,
            (Command::TurnRight, TurnPolarity::Standard) => Some("r_ccw"),
            (Command::TurnRight, TurnPolarity::Inverted) => Some("r_cw"),
            (Command::TurnLeft, TurnPolarity::Standard) => Some("r_cw"),
            (Command::TurnLeft, TurnPolarity::Inverted) => Some("r_ccw"),
            (Command::Heading, _) => Some("heading"),
            (Command::HeadingTarget, _) => Some("heading_target"),
            (Command::Grab, _) => Some("grab"),
        }
    }
}

/// Mapping of turn commands onto the actuator's rotation tokens.
///
/// `Standard`: target left of center (`TurnRight`) sends `r_ccw`.
/// `Inverted`: the opposite wiring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolarity {
    #[default]
    Standard,
    Inverted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyConfig {
    /// Half-width of the centered dead-zone, in pixels.
    pub error_band: f32,
    /// Minimum persistence before acting, and minimum spacing between repeats.
    pub dwell: Duration,
    /// Enables the advance-then-grasp split of the heading class.
    pub grab_area: Option<f32>,
    pub turn_polarity: TurnPolarity,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            error_band: DEFAULT_ERROR_BAND,
            dwell: DEFAULT_DWELL,
            grab_area: None,
            turn_polarity: TurnPolarity::Standard,
        }
    }
}

/// Mutable per-run state, owned by the policy (and so by the control loop).
#[derive(Clone, Debug)]
pub struct ControlState {
    pub previous_command: Command,
    pub last_transition: Option<Instant>,
    pub image_center: Point,
}

impl ControlState {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            previous_command: Command::Idle,
            last_transition: None,
            image_center: Point {
                x: frame_width as f32 / 2.0,
                y: frame_height as f32 / 2.0,
            },
        }
    }
}

/// Outcome of one policy tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// No target this frame; always sent.
    Undetected,
    /// Candidate persisted through the dwell window; send it.
    Emit(Command),
    /// Candidate differs from the previous one; dwell window restarted.
    Settling(Command),
    /// Same candidate, dwell window not yet elapsed.
    Holding(Command),
}

impl Decision {
    /// Line to put on the wire for this tick, if any.
    pub fn wire(self, polarity: TurnPolarity) -> Option<&'static str> {
        match self {
            Decision::Undetected => Some(UNDETECTED_TOKEN),
            Decision::Emit(cmd) => cmd.wire_token(polarity),
            Decision::Settling(_) | Decision::Holding(_) => None,
        }
    }

    pub fn is_emitted(self) -> bool {
        matches!(self, Decision::Undetected | Decision::Emit(_))
    }
}

/// Horizontal and vertical offset of a target from the image center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Offsets {
    pub pan: f32,
    pub tilt: f32,
}

pub struct CommandPolicy {
    config: PolicyConfig,
    state: ControlState,
}

impl CommandPolicy {
    pub fn new(config: PolicyConfig, state: ControlState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn offsets(&self, target: &TrackedTarget) -> Offsets {
        Offsets {
            pan: target.x - self.state.image_center.x,
            tilt: target.y - self.state.image_center.y,
        }
    }

    /// Candidate command for a target, ignoring timing.
    ///
    /// The dead-zone boundary is inclusive on the heading side.
    pub fn classify(&self, target: &TrackedTarget) -> Command {
        let pan = self.offsets(target).pan;
        if pan < -self.config.error_band {
            Command::TurnRight
        } else if pan > self.config.error_band {
            Command::TurnLeft
        } else {
            match self.config.grab_area {
                Some(limit) if target.area >= limit => Command::Grab,
                Some(_) => Command::HeadingTarget,
                None => Command::Heading,
            }
        }
    }

    pub fn tick(&mut self, target: Option<&TrackedTarget>, now: Instant) -> Decision {
        let Some(target) = target else {
            self.state.previous_command = Command::Idle;
            self.state.last_transition = Some(now);
            return Decision::Undetected;
        };

        let candidate = self.classify(target);
        if candidate != self.state.previous_command {
            self.state.previous_command = candidate;
            self.state.last_transition = Some(now);
            return Decision::Settling(candidate);
        }

        let settled = match self.state.last_transition {
            Some(since) => now.saturating_duration_since(since) >= self.config.dwell,
            None => true,
        };
        if settled {
            self.state.last_transition = Some(now);
            Decision::Emit(candidate)
        } else {
            Decision::Holding(candidate)
        }
    }
}
