// Per-motor state and command surface
//
// One Motor per physical motor. Speeds are duty cycle values (0..=255).
// The ramp engine, distance estimator and ramp-down synchronizer extend
// Motor in their own modules.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::driver::BridgeDriver;
use super::voltage::RampProfile;
use crate::calibration::Calibration;

/// Monotonic time in milliseconds
pub type Millis = u64;

/// Rotation sense of a motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Electrical state of the motor terminals at speed 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Terminals shorted
    #[default]
    Brake,
    /// Terminals floating
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampState {
    #[default]
    Stopped,
    Starting,
    RampingUp,
    Driving,
    RampingDown,
}

/// Result of one control tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickResult {
    /// Motor expects further ticks
    pub still_running: bool,
    /// A distance-limited move completed in this tick
    pub distance_reached: bool,
}

/// A PWM driven DC motor without position feedback
pub struct Motor<D> {
    pub(super) driver: D,
    pub(super) profile: RampProfile,

    pub(super) requested_speed: u8,
    // Subtracted from requested_speed to match the paired motor
    pub(super) compensation: u8,
    // What is sent to the driver. Stopped iff 0.
    pub(super) compensated_speed: u8,
    pub(super) direction: Direction,
    pub(super) stop_mode: StopMode,
    // Calibrated cruising speed for fixed distance moves
    pub(super) drive_speed: u8,

    pub(super) ramp_state: RampState,
    // Ramp target of the current move, compensation already subtracted
    pub(super) requested_drive_speed: u8,
    pub(super) next_ramp_tick: Millis,
    pub(super) ramp_down_delta: u8,
    pub(super) ramp_down_synchronized: bool,

    pub(super) distance_deadline: Option<Millis>,
    // Zero length move, reported as reached on the next tick
    pub(super) distance_reached_pending: bool,
    pub(super) millis_per_cm: u8,
}

impl<D: BridgeDriver> Motor<D> {
    pub fn new(driver: D, profile: RampProfile) -> Self {
        Self {
            driver,
            profile,
            requested_speed: 0,
            compensation: 0,
            compensated_speed: 0,
            direction: Direction::Forward,
            stop_mode: StopMode::Brake,
            drive_speed: profile.default_drive_speed,
            ramp_state: RampState::Stopped,
            requested_drive_speed: profile.default_drive_speed,
            next_ramp_tick: 0,
            ramp_down_delta: profile.ramp_down_delta,
            ramp_down_synchronized: false,
            distance_deadline: None,
            distance_reached_pending: false,
            millis_per_cm: profile.default_millis_per_cm,
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.apply_calibration(calibration);
        self
    }

    // === Calibration ===

    /// Load drive speed and compensation. A drive speed of 0 is invalid and
    /// replaced by the default drive speed. Returns true if a value changed.
    pub fn apply_calibration(&mut self, calibration: Calibration) -> bool {
        let drive_speed = if calibration.drive_speed == 0 {
            self.profile.default_drive_speed
        } else {
            calibration.drive_speed
        };
        let changed = self.set_drive_speed(drive_speed);
        self.set_compensation(calibration.compensation) || changed
    }

    pub fn calibration(&self) -> Calibration {
        Calibration {
            drive_speed: self.drive_speed,
            compensation: self.compensation,
        }
    }

    /// Restore default drive speed, distance factor and zero compensation
    pub fn set_defaults_for_fixed_distance_driving(&mut self) -> bool {
        let changed = self.set_drive_speed(self.profile.default_drive_speed);
        let changed = self.set_millis_per_cm(self.profile.default_millis_per_cm) || changed;
        self.set_compensation(0) || changed
    }

    pub fn set_drive_speed(&mut self, drive_speed: u8) -> bool {
        if self.drive_speed == drive_speed {
            return false;
        }
        self.drive_speed = drive_speed;
        true
    }

    /// Set drive speed and, if the motor currently cruises at drive speed,
    /// apply the new speed at once
    pub fn update_drive_speed(&mut self, drive_speed: u8) -> bool {
        let cruising = self.ramp_state == RampState::Driving
            && self.requested_drive_speed == self.drive_speed.saturating_sub(self.compensation);
        if !self.set_drive_speed(drive_speed) {
            return false;
        }
        if cruising {
            let target = self.drive_speed.saturating_sub(self.compensation);
            self.requested_drive_speed = target;
            if target == 0 {
                self.stop(self.stop_mode);
            } else {
                self.apply_speed(target);
            }
        }
        true
    }

    /// Change compensation. A running motor at constant speed picks it up at once.
    pub fn set_compensation(&mut self, compensation: u8) -> bool {
        if self.compensation == compensation {
            return false;
        }
        self.compensation = compensation;
        if self.ramp_state == RampState::Driving {
            let speed = self.requested_speed.saturating_sub(compensation);
            if speed == 0 {
                self.stop(self.stop_mode);
            } else {
                self.requested_drive_speed = speed;
                self.set_compensated(speed);
                self.driver.set_duty_and_direction(speed, self.direction);
            }
        }
        true
    }

    pub fn set_millis_per_cm(&mut self, millis_per_cm: u8) -> bool {
        if self.millis_per_cm == millis_per_cm {
            return false;
        }
        self.millis_per_cm = millis_per_cm;
        true
    }

    /// Mode applied at speed 0. Applied at once if the motor is stopped.
    pub fn set_stop_mode(&mut self, mode: StopMode) -> bool {
        if self.stop_mode == mode {
            return false;
        }
        self.stop_mode = mode;
        if self.is_stopped() {
            self.driver.set_electrical_mode(mode);
        }
        true
    }

    // === Direct speed commands (no ramp) ===

    /// Set speed at once, keeping the direction. 0 stops the motor.
    pub fn set_requested_speed(&mut self, speed: u8) {
        let compensated = speed.saturating_sub(self.compensation);
        if compensated == 0 {
            if !self.is_stopped() {
                self.stop(self.stop_mode);
            }
            return;
        }
        self.requested_speed = speed;
        self.compensated_speed = compensated;
        self.requested_drive_speed = compensated;
        self.ramp_state = RampState::Driving;
        self.driver.set_duty_and_direction(compensated, self.direction);
    }

    /// Set speed and direction at once. A running motor is stopped before
    /// its direction is reversed.
    pub fn set_speed_and_direction(&mut self, speed: u8, direction: Direction) {
        self.check_and_handle_direction_change(direction);
        self.set_requested_speed(speed);
    }

    /// Signed speed, the sign selects the direction
    pub fn set_speed_signed(&mut self, speed: i16) {
        let direction = if speed < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let magnitude = speed.unsigned_abs().min(u8::MAX as u16) as u8;
        self.set_speed_and_direction(magnitude, direction);
    }

    /// Change the direction of rotation. A running motor is stopped first
    /// and then ramped up again in the new direction.
    /// Returns true if the motor had to be stopped.
    pub fn set_direction(&mut self, direction: Direction, now: Millis) -> bool {
        if direction == self.direction {
            return false;
        }
        if self.is_stopped() {
            self.direction = direction;
            return false;
        }
        let target = self.requested_drive_speed;
        self.stop(self.stop_mode);
        self.direction = direction;
        self.begin_ramp_up(target, now);
        true
    }

    /// Stop at once, regardless of any ramp or distance deadline
    pub fn stop(&mut self, mode: StopMode) {
        if !self.is_stopped() {
            info!("Stopping motor ({:?})", mode);
        }
        self.requested_speed = 0;
        self.compensated_speed = 0;
        self.ramp_state = RampState::Stopped;
        self.distance_deadline = None;
        self.distance_reached_pending = false;
        self.ramp_down_delta = self.profile.ramp_down_delta;
        self.ramp_down_synchronized = false;
        self.driver.set_electrical_mode(mode);
    }

    /// Stop using the configured stop mode
    pub fn stop_default(&mut self) {
        self.stop(self.stop_mode);
    }

    // === Internal helpers ===

    /// Stops a motor running in the other direction, so the bridge is never
    /// reversed under load. Returns true if the motor had to be stopped.
    pub(super) fn check_and_handle_direction_change(&mut self, direction: Direction) -> bool {
        if direction == self.direction {
            return false;
        }
        let was_running = !self.is_stopped();
        if was_running {
            debug!(
                "Direction change {:?} -> {:?}, stopping first",
                self.direction, direction
            );
            self.stop(self.stop_mode);
        }
        self.direction = direction;
        was_running
    }

    /// Set compensated speed and keep requested speed consistent with it
    pub(super) fn set_compensated(&mut self, speed: u8) {
        self.compensated_speed = speed;
        self.requested_speed = speed.saturating_add(self.compensation);
    }

    /// Set compensated speed and write it to the driver
    pub(super) fn apply_speed(&mut self, speed: u8) {
        self.set_compensated(speed);
        self.driver.set_duty_and_direction(speed, self.direction);
    }

    // === Accessors ===

    pub fn is_stopped(&self) -> bool {
        self.compensated_speed == 0
    }

    pub fn requested_speed(&self) -> u8 {
        self.requested_speed
    }

    pub fn compensation(&self) -> u8 {
        self.compensation
    }

    /// Compensation that is actually in effect, never more than the requested speed
    pub fn effective_compensation(&self) -> u8 {
        self.compensation.min(self.requested_speed)
    }

    pub fn compensated_speed(&self) -> u8 {
        self.compensated_speed
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stop_mode(&self) -> StopMode {
        self.stop_mode
    }

    pub fn drive_speed(&self) -> u8 {
        self.drive_speed
    }

    pub fn ramp_state(&self) -> RampState {
        self.ramp_state
    }

    pub fn requested_drive_speed(&self) -> u8 {
        self.requested_drive_speed
    }

    pub fn next_ramp_tick(&self) -> Millis {
        self.next_ramp_tick
    }

    pub fn distance_deadline(&self) -> Option<Millis> {
        self.distance_deadline
    }

    pub fn millis_per_cm(&self) -> u8 {
        self.millis_per_cm
    }

    pub fn profile(&self) -> &RampProfile {
        &self.profile
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::driver::DriveMode;
    use crate::motor::testing::test_motor;

    #[test]
    fn test_new_motor_is_stopped() {
        let motor = test_motor();
        assert!(motor.is_stopped());
        assert_eq!(motor.ramp_state(), RampState::Stopped);
        assert_eq!(motor.drive_speed(), 80);
        assert_eq!(motor.distance_deadline(), None);
    }

    #[test]
    fn test_compensation_is_subtracted() {
        let mut motor = test_motor();
        motor.set_compensation(10);
        motor.set_requested_speed(100);
        assert_eq!(motor.requested_speed(), 100);
        assert_eq!(motor.compensated_speed(), 90);
        assert_eq!(motor.ramp_state(), RampState::Driving);
        assert_eq!(motor.driver().actuation().duty, 90);
    }

    #[test]
    fn test_compensation_clamped_to_requested_speed() {
        let mut motor = test_motor();
        motor.set_compensation(50);
        motor.set_requested_speed(30);
        // Nothing left to drive with
        assert!(motor.is_stopped());
        assert_eq!(motor.ramp_state(), RampState::Stopped);

        motor.set_requested_speed(60);
        assert_eq!(motor.compensated_speed(), 10);
        assert_eq!(motor.effective_compensation(), 50);
    }

    #[test]
    fn test_compensation_change_while_driving() {
        let mut motor = test_motor();
        motor.set_requested_speed(100);
        assert!(motor.set_compensation(4));
        assert_eq!(motor.compensated_speed(), 96);
        assert_eq!(motor.requested_speed(), 100);
        assert!(!motor.set_compensation(4));
    }

    #[test]
    fn test_zero_speed_stops() {
        let mut motor = test_motor();
        motor.set_requested_speed(100);
        motor.set_requested_speed(0);
        assert!(motor.is_stopped());
        assert_eq!(motor.ramp_state(), RampState::Stopped);
        assert_eq!(motor.driver().actuation().mode, DriveMode::Brake);
    }

    #[test]
    fn test_signed_speed_selects_direction() {
        let mut motor = test_motor();
        motor.set_speed_signed(-120);
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.compensated_speed(), 120);

        // Magnitude is clamped to the duty range
        motor.set_speed_signed(1000);
        assert_eq!(motor.direction(), Direction::Forward);
        assert_eq!(motor.compensated_speed(), 255);
    }

    #[test]
    fn test_direction_change_stops_running_motor() {
        let mut motor = test_motor();
        motor.set_speed_and_direction(100, Direction::Forward);
        let writes_before = motor.driver().writes();

        motor.set_speed_and_direction(100, Direction::Backward);
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.compensated_speed(), 100);
        // One brake write in between, then the new speed
        assert_eq!(motor.driver().writes(), writes_before + 2);
    }

    #[test]
    fn test_set_direction_restarts_ramp() {
        let mut motor = test_motor();
        motor.set_requested_speed(100);
        assert!(motor.set_direction(Direction::Backward, 1000));
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.ramp_state(), RampState::Starting);
        assert_eq!(motor.compensated_speed(), 20);

        // Stopped motor just remembers the direction
        let mut stopped = test_motor();
        assert!(!stopped.set_direction(Direction::Backward, 0));
        assert!(stopped.is_stopped());
        assert_eq!(stopped.direction(), Direction::Backward);
    }

    #[test]
    fn test_stop_mode_applied_when_stopped() {
        let mut motor = test_motor();
        assert!(motor.set_stop_mode(StopMode::Release));
        assert_eq!(motor.driver().actuation().mode, DriveMode::Release);
        assert!(!motor.set_stop_mode(StopMode::Release));

        motor.set_requested_speed(90);
        motor.stop_default();
        assert_eq!(motor.driver().actuation().mode, DriveMode::Release);
        motor.stop(StopMode::Brake);
        assert_eq!(motor.driver().actuation().mode, DriveMode::Brake);
        // Explicit mode does not replace the configured one
        assert_eq!(motor.stop_mode(), StopMode::Release);
    }

    #[test]
    fn test_calibration_round_trip_and_invalid_drive_speed() {
        let mut motor = test_motor();
        let changed = motor.apply_calibration(Calibration {
            drive_speed: 120,
            compensation: 6,
        });
        assert!(changed);
        assert_eq!(
            motor.calibration(),
            Calibration {
                drive_speed: 120,
                compensation: 6
            }
        );

        motor.apply_calibration(Calibration {
            drive_speed: 0,
            compensation: 0,
        });
        assert_eq!(motor.drive_speed(), 80);

        motor.set_millis_per_cm(60);
        motor.set_compensation(3);
        assert!(motor.set_defaults_for_fixed_distance_driving());
        assert_eq!(motor.millis_per_cm(), 45);
        assert_eq!(motor.compensation(), 0);
    }

    #[test]
    fn test_update_drive_speed_while_cruising() {
        let mut motor = test_motor();
        motor.set_requested_speed(80);
        assert!(motor.update_drive_speed(100));
        assert_eq!(motor.compensated_speed(), 100);

        // Not cruising at drive speed: only the calibration changes
        motor.set_requested_speed(60);
        assert!(motor.update_drive_speed(110));
        assert_eq!(motor.compensated_speed(), 60);
        assert_eq!(motor.drive_speed(), 110);
    }
}
