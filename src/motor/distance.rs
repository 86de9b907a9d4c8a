// Open loop distance estimation
//
// Without encoder or IMU the only way to drive a distance is to drive for a
// computed time. The model is empirical: it is calibrated with millis_per_cm
// measured at the reference drive speed and drifts with battery voltage and
// surface friction.

use tracing::info;

use super::dc_motor::{Direction, Millis, Motor};
use super::driver::BridgeDriver;
use super::voltage::RampProfile;
use crate::config::MILLIMETER_IN_ONE_CENTIMETER;

/// Estimated run time in milliseconds for a distance at a given speed
///
/// Fractional centimeters are truncated. Distances below one centimeter
/// (and speed 0) give 0, meaning there is nothing to drive.
pub fn estimate_duration_millis(
    distance_mm: u32,
    speed: u8,
    millis_per_cm: u8,
    profile: &RampProfile,
) -> Millis {
    let distance_cm = (distance_mm / MILLIMETER_IN_ONE_CENTIMETER) as u64;
    if distance_cm == 0 || speed == 0 {
        return 0;
    }
    // millis_per_cm holds for the reference speed, scale for the requested one
    let scaled = distance_cm * millis_per_cm as u64 * profile.reference_drive_speed as u64
        / speed as u64;
    profile.motor_start_millis as Millis + scaled
}

impl<D: BridgeDriver> Motor<D> {
    /// Drive a signed distance at drive speed. Negative distances drive backward.
    pub fn start_distance(&mut self, distance_mm: i32, now: Millis) {
        let direction = if distance_mm < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        };
        self.start_distance_with(self.drive_speed, distance_mm.unsigned_abs(), direction, now);
    }

    /// Drive a distance at an explicit speed
    ///
    /// A pending distance move is superseded by the new one. A zero length
    /// move stops the motor and is reported as reached on the next tick.
    pub fn start_distance_with(
        &mut self,
        speed: u8,
        distance_mm: u32,
        direction: Direction,
        now: Millis,
    ) {
        // A completion of the replaced move must not be reported for this one
        self.distance_reached_pending = false;
        let duration = estimate_duration_millis(distance_mm, speed, self.millis_per_cm, &self.profile);
        if duration == 0 || speed.saturating_sub(self.compensation) == 0 {
            self.stop(self.stop_mode);
            self.distance_reached_pending = true;
            return;
        }

        info!(
            "Go {} mm {:?} at speed {}, estimated {} ms",
            distance_mm, direction, speed, duration
        );
        // Ramp first, a direction change stops the motor and clears the deadline
        self.start_ramp_up_to(speed, direction, now);
        self.distance_deadline = Some(now + duration);
    }

    /// True while a distance-limited move is in progress
    pub fn is_distance_move_active(&self) -> bool {
        self.distance_deadline.is_some() || self.distance_reached_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::RampState;
    use crate::motor::testing::{test_motor, test_profile};

    #[test]
    fn test_estimate_at_reference_speed() {
        let profile = test_profile();
        // 20 ms start time + 50 cm * 45 ms
        assert_eq!(estimate_duration_millis(500, 80, 45, &profile), 2270);
        // Fractional centimeters are truncated
        assert_eq!(estimate_duration_millis(509, 80, 45, &profile), 2270);
    }

    #[test]
    fn test_estimate_scales_with_speed() {
        let profile = test_profile();
        // Twice the speed, half the driving time
        assert_eq!(estimate_duration_millis(500, 160, 45, &profile), 20 + 1125);
        assert!(
            estimate_duration_millis(500, 40, 45, &profile)
                > estimate_duration_millis(500, 80, 45, &profile)
        );
    }

    #[test]
    fn test_estimate_below_resolution_is_zero() {
        let profile = test_profile();
        assert_eq!(estimate_duration_millis(9, 80, 45, &profile), 0);
        assert_eq!(estimate_duration_millis(0, 80, 45, &profile), 0);
        assert_eq!(estimate_duration_millis(500, 0, 45, &profile), 0);
    }

    #[test]
    fn test_distance_move_stops_at_deadline() {
        let mut motor = test_motor();
        motor.start_distance(100, 1000);
        // 20 + 10 * 45
        assert_eq!(motor.distance_deadline(), Some(1470));
        assert_eq!(motor.direction(), Direction::Forward);

        let mut now = 1000;
        let mut reached_at = None;
        while now < 2000 {
            now += 20;
            let result = motor.tick(now);
            if result.distance_reached {
                assert!(!result.still_running);
                reached_at = Some(now);
                break;
            }
            assert!(result.still_running);
        }

        assert_eq!(reached_at, Some(1480));
        assert!(motor.is_stopped());
        assert_eq!(motor.distance_deadline(), None);
        assert!(!motor.is_distance_move_active());
    }

    #[test]
    fn test_negative_distance_drives_backward() {
        let mut motor = test_motor();
        motor.start_distance(-250, 0);
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.ramp_state(), RampState::Starting);
        assert_eq!(motor.distance_deadline(), Some(20 + 25 * 45));
    }

    #[test]
    fn test_zero_distance_reached_on_next_tick() {
        let mut motor = test_motor();
        motor.start_distance(0, 0);
        assert!(motor.is_stopped());
        assert!(motor.is_distance_move_active());

        let result = motor.tick(20);
        assert!(result.distance_reached);
        assert!(!result.still_running);
        assert_eq!(motor.compensated_speed(), 0);

        // Reported only once
        assert!(!motor.tick(40).distance_reached);
    }

    #[test]
    fn test_sub_centimeter_distance_is_noop() {
        let mut motor = test_motor();
        motor.start_distance(-7, 0);
        assert!(motor.is_stopped());
        assert!(motor.tick(20).distance_reached);
    }

    #[test]
    fn test_new_distance_supersedes_pending_one() {
        let mut motor = test_motor();
        motor.start_distance(1000, 0);
        motor.tick(20);
        motor.tick(40);
        motor.start_distance(100, 40);
        assert_eq!(motor.distance_deadline(), Some(40 + 470));
        // Motor kept running, no restart from the offset
        assert_eq!(motor.ramp_state(), RampState::RampingUp);
        assert_eq!(motor.compensated_speed(), 44);
    }

    #[test]
    fn test_distance_replacing_zero_move_is_not_reached() {
        let mut motor = test_motor();
        motor.start_distance(0, 0);
        motor.start_distance(500, 0);

        let result = motor.tick(20);
        println!("After replacing zero move: {:?}", result);
        assert!(result.still_running);
        assert!(!result.distance_reached);
        assert_eq!(motor.distance_deadline(), Some(2270));
    }

    #[test]
    fn test_reverse_distance_restarts_from_stop() {
        let mut motor = test_motor();
        motor.start_distance(1000, 0);
        motor.tick(20);
        motor.start_distance(-1000, 20);
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.ramp_state(), RampState::Starting);
        assert_eq!(motor.compensated_speed(), 20);
        assert_eq!(motor.distance_deadline(), Some(20 + 20 + 100 * 45));
    }

    #[test]
    fn test_explicit_speed_distance() {
        let mut motor = test_motor();
        motor.start_distance_with(160, 500, Direction::Forward, 0);
        assert_eq!(motor.requested_drive_speed(), 160);
        assert_eq!(motor.distance_deadline(), Some(1145));
    }
}
