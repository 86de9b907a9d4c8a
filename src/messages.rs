// Message types exchanged by the runtime

use serde::{Deserialize, Serialize};

use crate::motor::{
    BridgeDriver, Direction, Millis, Motor, MotorActuation, RampState, StopMode, TurnDirection,
};

/// Command from teleop/scripts -> runtime
///
/// JSON is tagged by `cmd`, e.g. `{"cmd":"go_distance","distance_mm":-300}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CarCommand {
    /// Ramp up to drive speed
    Start { direction: Direction },
    /// Ramp up to an explicit speed, or the requested drive speed if none is given
    RampUp {
        direction: Direction,
        #[serde(default)]
        speed: Option<u8>,
    },
    RampDown,
    /// Hard stop, configured stop mode if none is given
    Stop {
        #[serde(default)]
        mode: Option<StopMode>,
    },
    /// Unramped speed, the sign selects the direction
    SetSpeed { speed: i16 },
    /// Distance-limited move, the sign selects the direction
    GoDistance {
        distance_mm: i32,
        #[serde(default)]
        speed: Option<u8>,
    },
    /// Positive degrees turn left
    Rotate {
        degrees: i32,
        #[serde(default)]
        turn: TurnDirection,
    },
    SetDriveSpeed { speed: u8 },
    /// Positive values slow the right motor relative to the left one
    ChangeCompensation { right: i8 },
    SetStopMode { mode: StopMode },
    SaveCalibration,
}

// Actuation output from runtime -> bridge hardware
// Has default values because every loop publishes one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CarActuation {
    pub left: MotorActuation,
    pub right: MotorActuation,
}

/// Snapshot of one motor for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorState {
    pub ramp_state: RampState,
    pub direction: Direction,
    pub requested_speed: u8,
    pub compensated_speed: u8,
    pub compensation: u8,
    pub drive_speed: u8,
    pub distance_deadline: Option<Millis>,
}

impl<D: BridgeDriver> From<&Motor<D>> for MotorState {
    fn from(motor: &Motor<D>) -> Self {
        Self {
            ramp_state: motor.ramp_state(),
            direction: motor.direction(),
            requested_speed: motor.requested_speed(),
            compensated_speed: motor.compensated_speed(),
            compensation: motor.compensation(),
            drive_speed: motor.drive_speed(),
            distance_deadline: motor.distance_deadline(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarState {
    /// Milliseconds since runtime start
    pub time_ms: Millis,
    pub left: MotorState,
    pub right: MotorState,
    /// A distance move finished in this loop
    pub distance_reached: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
