// Two-motor car controller
//
// Right motor is the reference, the left motor synchronizes its ramp-down
// against it. Per control cycle the order is:
//   right.tick(now) -> left.synchronize_ramp_down(&right) -> left.tick(now)

use tracing::{debug, info};

use crate::calibration::{self, CalibrationStore, LEFT_MOTOR_SLOT, RIGHT_MOTOR_SLOT};
use crate::motor::{
    BridgeDriver, Direction, Millis, Motor, RampProfile, RampState, StopMode, TickResult,
    TurnDirection, turn_wheel_distances,
};

/// Differential drive car with two PWM motors
pub struct Car<D> {
    right: Motor<D>,
    left: Motor<D>,
}

impl<D: BridgeDriver> Car<D> {
    pub fn new(right_driver: D, left_driver: D, profile: RampProfile) -> Self {
        Self {
            right: Motor::new(right_driver, profile),
            left: Motor::new(left_driver, profile),
        }
    }

    // === Calibration ===

    /// Load both motors from the store. Missing slots keep the current values.
    /// Returns true if a value changed.
    pub fn read_calibration<S: CalibrationStore>(
        &mut self,
        store: &mut S,
    ) -> calibration::Result<bool> {
        let mut changed = false;
        if let Some(calibration) = store.load(LEFT_MOTOR_SLOT)? {
            changed |= self.left.apply_calibration(calibration);
        }
        if let Some(calibration) = store.load(RIGHT_MOTOR_SLOT)? {
            changed |= self.right.apply_calibration(calibration);
        }
        Ok(changed)
    }

    pub fn write_calibration<S: CalibrationStore>(&self, store: &mut S) -> calibration::Result<()> {
        store.store(LEFT_MOTOR_SLOT, self.left.calibration())?;
        store.store(RIGHT_MOTOR_SLOT, self.right.calibration())?;
        Ok(())
    }

    pub fn set_defaults_for_fixed_distance_driving(&mut self) -> bool {
        let changed = self.right.set_defaults_for_fixed_distance_driving();
        self.left.set_defaults_for_fixed_distance_driving() || changed
    }

    /// Set the drive speed of both motors and the compensation of one of them.
    /// Positive compensation slows the right motor, negative the left one.
    pub fn set_values_for_fixed_distance_driving(
        &mut self,
        drive_speed: u8,
        compensation_right: i8,
    ) -> bool {
        let mut changed = self.set_drive_speed(drive_speed);
        let amount = compensation_right.unsigned_abs();
        let (right, left) = if compensation_right >= 0 {
            (amount, 0)
        } else {
            (0, amount)
        };
        changed |= self.right.set_compensation(right);
        changed |= self.left.set_compensation(left);
        changed
    }

    /// Shift the compensation between the motors
    ///
    /// Positive values slow the right motor relative to the left one. The
    /// compensation of the other motor is used up first, so at most one
    /// motor stays compensated.
    pub fn change_speed_compensation(&mut self, delta_right: i8) -> bool {
        let amount = delta_right.unsigned_abs();
        if amount == 0 {
            return false;
        }
        let (relieved, burdened) = if delta_right > 0 {
            (&mut self.left, &mut self.right)
        } else {
            (&mut self.right, &mut self.left)
        };

        let current = relieved.compensation();
        if current >= amount {
            relieved.set_compensation(current - amount);
        } else {
            relieved.set_compensation(0);
            let compensation = burdened.compensation().saturating_add(amount - current);
            burdened.set_compensation(compensation);
        }
        info!(
            "Compensation right={} left={}",
            self.right.compensation(),
            self.left.compensation()
        );
        true
    }

    /// Change the drive speed of both motors, a cruising car picks it up at once
    pub fn set_drive_speed(&mut self, drive_speed: u8) -> bool {
        let changed = self.right.update_drive_speed(drive_speed);
        self.left.update_drive_speed(drive_speed) || changed
    }

    pub fn set_millis_per_cm(&mut self, millis_per_cm: u8) -> bool {
        let changed = self.right.set_millis_per_cm(millis_per_cm);
        self.left.set_millis_per_cm(millis_per_cm) || changed
    }

    pub fn set_stop_mode(&mut self, mode: StopMode) -> bool {
        let changed = self.right.set_stop_mode(mode);
        self.left.set_stop_mode(mode) || changed
    }

    // === Motion commands ===

    /// Stop both motors together before any of them is reversed.
    /// Returns true if the car had to be stopped.
    fn check_and_handle_direction_change(&mut self, direction: Direction) -> bool {
        let reversing = self.right.direction() != direction || self.left.direction() != direction;
        if !reversing || self.is_stopped() {
            return false;
        }
        debug!("Car direction change to {:?}, stopping first", direction);
        self.stop_default();
        true
    }

    /// Ramp both motors up to their drive speed
    pub fn start(&mut self, direction: Direction, now: Millis) {
        self.check_and_handle_direction_change(direction);
        self.right.start(direction, now);
        self.left.start(direction, now);
    }

    /// Ramp both motors up to their requested drive speed
    pub fn start_ramp_up(&mut self, direction: Direction, now: Millis) {
        self.check_and_handle_direction_change(direction);
        self.right.start_ramp_up(direction, now);
        self.left.start_ramp_up(direction, now);
    }

    pub fn start_ramp_up_to(&mut self, speed: u8, direction: Direction, now: Millis) {
        self.check_and_handle_direction_change(direction);
        self.right.start_ramp_up_to(speed, direction, now);
        self.left.start_ramp_up_to(speed, direction, now);
    }

    /// Lower or raise the target of the next ramp up of both motors
    pub fn set_requested_drive_speed(&mut self, speed: u8) {
        self.right.set_requested_drive_speed(speed);
        self.left.set_requested_drive_speed(speed);
    }

    pub fn start_ramp_down(&mut self) {
        self.right.start_ramp_down();
        self.left.start_ramp_down();
    }

    pub fn stop(&mut self, mode: StopMode) {
        self.right.stop(mode);
        self.left.stop(mode);
    }

    pub fn stop_default(&mut self) {
        self.right.stop_default();
        self.left.stop_default();
    }

    /// Set speed of both motors at once, without ramp
    pub fn set_speed_and_direction(&mut self, speed: u8, direction: Direction) {
        self.check_and_handle_direction_change(direction);
        self.right.set_speed_and_direction(speed, direction);
        self.left.set_speed_and_direction(speed, direction);
    }

    /// Signed speed, negative drives backward
    pub fn set_speed_signed(&mut self, speed: i16) {
        let direction = if speed < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let magnitude = speed.unsigned_abs().min(u8::MAX as u16) as u8;
        self.set_speed_and_direction(magnitude, direction);
    }

    /// Drive a signed distance at drive speed
    pub fn start_go_distance_mm(&mut self, distance_mm: i32, now: Millis) {
        let direction = if distance_mm < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        };
        self.check_and_handle_direction_change(direction);
        self.right.start_distance(distance_mm, now);
        self.left.start_distance(distance_mm, now);
    }

    pub fn start_go_distance(
        &mut self,
        speed: u8,
        distance_mm: u32,
        direction: Direction,
        now: Millis,
    ) {
        self.check_and_handle_direction_change(direction);
        self.right.start_distance_with(speed, distance_mm, direction, now);
        self.left.start_distance_with(speed, distance_mm, direction, now);
    }

    /// Turn the car body by `degrees` (positive = left) at drive speed
    ///
    /// Each wheel gets its own distance-limited move. A wheel that does not
    /// take part in the turn is stopped.
    pub fn start_rotate(&mut self, degrees: i32, turn: TurnDirection, now: Millis) {
        let wheels = turn_wheel_distances(degrees, turn);
        info!(
            "Rotate {} degrees {:?}: left={} mm right={} mm",
            degrees, turn, wheels.left_mm, wheels.right_mm
        );
        for (motor, distance_mm) in [
            (&mut self.right, wheels.right_mm),
            (&mut self.left, wheels.left_mm),
        ] {
            let direction = if distance_mm < 0 {
                Direction::Backward
            } else {
                Direction::Forward
            };
            let speed = motor.drive_speed();
            motor.start_distance_with(speed, distance_mm.unsigned_abs(), direction, now);
        }
    }

    /// Advance both motors by one control cycle
    ///
    /// `distance_reached` is set once the last running distance move of the
    /// car completes.
    pub fn update(&mut self, now: Millis) -> TickResult {
        let right = self.right.tick(now);
        self.left.synchronize_ramp_down(&self.right);
        let left = self.left.tick(now);

        let reached = (right.distance_reached || left.distance_reached)
            && !self.is_distance_move_active();
        TickResult {
            still_running: right.still_running || left.still_running,
            distance_reached: reached,
        }
    }

    // === State ===

    pub fn is_stopped(&self) -> bool {
        self.right.is_stopped() && self.left.is_stopped()
    }

    /// Both motors are in `state`
    pub fn is_state(&self, state: RampState) -> bool {
        self.right.ramp_state() == state && self.left.ramp_state() == state
    }

    /// One of the motors is accelerating or decelerating
    pub fn is_state_ramp(&self) -> bool {
        self.right.is_ramping() || self.left.is_ramping()
    }

    pub fn is_distance_move_active(&self) -> bool {
        self.right.is_distance_move_active() || self.left.is_distance_move_active()
    }

    pub fn right(&self) -> &Motor<D> {
        &self.right
    }

    pub fn left(&self) -> &Motor<D> {
        &self.left
    }

    pub fn right_mut(&mut self) -> &mut Motor<D> {
        &mut self.right
    }

    pub fn left_mut(&mut self) -> &mut Motor<D> {
        &mut self.left
    }
}
