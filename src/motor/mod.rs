// Motor control core for PWM driven DC motors without position feedback
//
// Provides:
// - Duty cycle <-> voltage conversion and the derived ramp constants
// - Per-motor state with ramped start / stop (ramp state machine)
// - Distance to run time estimation for fixed distance moves
// - Ramp-down synchronization of two motors
// - Differential drive turn geometry

mod dc_motor;
mod distance;
pub mod driver;
pub mod kinematics;
mod ramp;
mod sync;
pub mod voltage;

pub use dc_motor::{Direction, Millis, Motor, RampState, StopMode, TickResult};
pub use distance::estimate_duration_millis;
pub use driver::{ActuationRecorder, BridgeDriver, DriveMode, MotorActuation};
pub use kinematics::{TurnDirection, WheelDistances, turn_wheel_distances};
pub use voltage::RampProfile;
