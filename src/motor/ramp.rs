// Ramp state machine
//
// Stopped -> Starting -> RampingUp -> Driving -> RampingDown -> Stopped
//
// tick() is called once per control cycle with a timestamp read once for
// the whole cycle. stop() wins over every state.

use tracing::{debug, info};

use super::dc_motor::{Direction, Millis, Motor, RampState, TickResult};
use super::driver::BridgeDriver;

impl<D: BridgeDriver> Motor<D> {
    /// Ramp up to the calibrated drive speed
    pub fn start(&mut self, direction: Direction, now: Millis) {
        self.start_ramp_up_to(self.drive_speed, direction, now);
    }

    /// Ramp up to the current requested drive speed, which may have been
    /// lowered with set_requested_drive_speed() (e.g. for turns)
    pub fn start_ramp_up(&mut self, direction: Direction, now: Millis) {
        self.check_and_handle_direction_change(direction);
        let target = self.requested_drive_speed;
        if target == 0 {
            self.stop(self.stop_mode);
            return;
        }
        self.begin_ramp_up(target, now);
    }

    /// Ramp up to an explicit speed. Compensation is subtracted from it.
    pub fn start_ramp_up_to(&mut self, speed: u8, direction: Direction, now: Millis) {
        self.check_and_handle_direction_change(direction);
        let target = speed.saturating_sub(self.compensation);
        if target == 0 {
            self.stop(self.stop_mode);
            return;
        }
        self.begin_ramp_up(target, now);
    }

    /// Override the ramp target of the next ramp up, compensation is subtracted
    pub fn set_requested_drive_speed(&mut self, speed: u8) {
        self.requested_drive_speed = speed.saturating_sub(self.compensation);
    }

    /// Begin decelerating. No effect on a stopped motor or one already ramping down.
    pub fn start_ramp_down(&mut self) {
        match self.ramp_state {
            RampState::Starting | RampState::RampingUp | RampState::Driving => {
                debug!("Ramp down from {}", self.compensated_speed);
                self.ramp_state = RampState::RampingDown;
            }
            RampState::Stopped | RampState::RampingDown => {}
        }
    }

    /// Start or retarget a ramp towards a compensated target speed
    pub(super) fn begin_ramp_up(&mut self, target: u8, now: Millis) {
        self.requested_drive_speed = target;
        self.ramp_down_delta = self.profile.ramp_down_delta;
        self.ramp_down_synchronized = false;

        if self.is_stopped() {
            // Never start above the target
            let offset = self.profile.ramp_up_offset.min(target);
            debug!(
                "Start {:?}: offset={} target={}",
                self.direction, offset, target
            );
            self.ramp_state = RampState::Starting;
            self.next_ramp_tick = now + self.profile.ramp_interval_millis as Millis;
            self.apply_speed(offset);
        } else if self.compensated_speed < target {
            // A repeated start must not push the next ramp step back
            if !matches!(self.ramp_state, RampState::Starting | RampState::RampingUp) {
                self.next_ramp_tick = now + self.profile.ramp_interval_millis as Millis;
            }
            self.ramp_state = RampState::RampingUp;
        } else {
            self.ramp_state = RampState::Driving;
            self.apply_speed(target);
        }
    }

    /// Advance ramps and check the distance deadline
    pub fn tick(&mut self, now: Millis) -> TickResult {
        let mut result = TickResult::default();

        if self.distance_reached_pending {
            self.distance_reached_pending = false;
            result.distance_reached = true;
        }

        // States fall through, a transition can be followed by a step in the same tick
        if self.ramp_state == RampState::Starting {
            if self.requested_drive_speed <= self.profile.ramp_up_offset {
                // Target is below the offset, no ramp needed
                self.ramp_state = RampState::Driving;
                self.apply_speed(self.requested_drive_speed);
            } else {
                self.ramp_state = RampState::RampingUp;
            }
        }

        if self.ramp_state == RampState::RampingUp && now >= self.next_ramp_tick {
            self.next_ramp_tick += self.profile.ramp_interval_millis as Millis;
            let target = self.requested_drive_speed;
            let speed = self
                .compensated_speed
                .saturating_add(self.profile.ramp_up_delta);
            if speed >= target {
                debug!("Drive speed {} reached", target);
                self.ramp_state = RampState::Driving;
                self.apply_speed(target);
            } else {
                self.apply_speed(speed);
            }
        }

        if self.ramp_state == RampState::RampingDown && now >= self.next_ramp_tick {
            self.next_ramp_tick = now + self.profile.ramp_interval_millis as Millis;
            let speed = self.compensated_speed.saturating_sub(self.ramp_down_delta);
            if speed == 0 || speed < self.profile.min_stop_speed {
                debug!("Ramp down finished");
                self.stop(self.stop_mode);
            } else {
                self.apply_speed(speed);
            }
        }

        if let Some(deadline) = self.distance_deadline {
            if now >= deadline {
                // Immediate stop to bound the overshoot
                info!("Distance deadline reached");
                self.stop(self.stop_mode);
                result.distance_reached = true;
            }
        }

        result.still_running = !self.is_stopped();
        result
    }

    /// True while accelerating or decelerating
    pub fn is_ramping(&self) -> bool {
        matches!(
            self.ramp_state,
            RampState::Starting | RampState::RampingUp | RampState::RampingDown
        )
    }
}
