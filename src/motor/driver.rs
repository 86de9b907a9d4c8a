// Driver sink for the motor core
//
// The bridge hardware (PWM expander registers, direction pins) lives behind
// BridgeDriver. The core only ever sets a duty cycle with a direction or an
// electrical stop mode.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dc_motor::{Direction, StopMode};

/// Output side of one motor bridge
///
/// Calls are assumed to take effect before the next tick.
pub trait BridgeDriver {
    /// Drive the motor with the duty cycle in the given direction
    fn set_duty_and_direction(&mut self, duty: u8, direction: Direction);

    /// Put the motor terminals into a stop state (shorted or floating)
    fn set_electrical_mode(&mut self, mode: StopMode);
}

/// What the bridge of one motor is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Forward,
    Backward,
    Brake,
    Release,
}

impl From<Direction> for DriveMode {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => DriveMode::Forward,
            Direction::Backward => DriveMode::Backward,
        }
    }
}

impl From<StopMode> for DriveMode {
    fn from(mode: StopMode) -> Self {
        match mode {
            StopMode::Brake => DriveMode::Brake,
            StopMode::Release => DriveMode::Release,
        }
    }
}

/// Last output written to one bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorActuation {
    pub duty: u8,
    pub mode: DriveMode,
}

impl Default for MotorActuation {
    fn default() -> Self {
        Self {
            duty: 0,
            mode: DriveMode::Brake,
        }
    }
}

/// Driver sink that keeps the last actuation, for publishing it to the
/// process that owns the bridge hardware (and for tests)
#[derive(Debug, Clone, Default)]
pub struct ActuationRecorder {
    name: &'static str,
    actuation: MotorActuation,
    writes: usize,
}

impl ActuationRecorder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// The actuation the bridge should currently apply
    pub fn actuation(&self) -> MotorActuation {
        self.actuation
    }

    /// Number of writes since creation
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl BridgeDriver for ActuationRecorder {
    fn set_duty_and_direction(&mut self, duty: u8, direction: Direction) {
        if self.actuation.duty != duty || self.actuation.mode != direction.into() {
            debug!("{} motor: duty={} direction={:?}", self.name, duty, direction);
        }
        self.actuation = MotorActuation {
            duty,
            mode: direction.into(),
        };
        self.writes += 1;
    }

    fn set_electrical_mode(&mut self, mode: StopMode) {
        debug!("{} motor: {:?}", self.name, mode);
        self.actuation = MotorActuation {
            duty: 0,
            mode: mode.into(),
        };
        self.writes += 1;
    }
}
