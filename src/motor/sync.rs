// Ramp-down synchronization of two motors
//
// The synchronizing motor paces its ramp-down delta so that it reaches
// speed 0 in the same tick as a reference motor. Call order per cycle:
// reference.tick(), follower.synchronize_ramp_down(&reference), follower.tick().

use super::dc_motor::{Motor, RampState};
use super::driver::BridgeDriver;

impl<D: BridgeDriver> Motor<D> {
    /// Number of ramp-down steps until this motor stops, 0 if stopped.
    /// Speeds below the stop threshold stop with the next step.
    pub fn ramp_down_ticks_remaining(&self) -> u32 {
        if self.is_stopped() {
            return 0;
        }
        let threshold = self.profile.min_stop_speed.max(1) as u32;
        let speed = self.compensated_speed as u32;
        if speed < threshold {
            return 1;
        }
        (speed - threshold) / self.ramp_down_delta.max(1) as u32 + 1
    }

    /// Recompute this motor's ramp-down delta from the reference motor
    ///
    /// Without a reference that is ramping down, the motor uses its fixed
    /// delta. Must be called after the reference motor's tick of the same cycle.
    pub fn synchronize_ramp_down<E: BridgeDriver>(&mut self, reference: &Motor<E>) {
        if self.ramp_state != RampState::RampingDown {
            self.ramp_down_delta = self.profile.ramp_down_delta;
            self.ramp_down_synchronized = false;
            return;
        }

        // Steps left for this motor, including the one of this cycle
        let ticks = match reference.ramp_state {
            RampState::RampingDown => reference.ramp_down_ticks_remaining() + 1,
            // Reference stopped in this cycle, stop together
            RampState::Stopped if self.ramp_down_synchronized => 1,
            _ => {
                self.ramp_down_delta = self.profile.ramp_down_delta;
                self.ramp_down_synchronized = false;
                return;
            }
        };

        let threshold = self.profile.min_stop_speed.max(1) as u32;
        let span = (self.compensated_speed as u32 + 1).saturating_sub(threshold).max(1);
        let delta = span.div_ceil(ticks).clamp(1, u8::MAX as u32);
        self.ramp_down_delta = delta as u8;
        self.ramp_down_synchronized = true;
    }

    /// Delta of the next ramp-down step
    pub fn ramp_down_delta(&self) -> u8 {
        self.ramp_down_delta
    }
}
