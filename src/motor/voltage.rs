// Conversion between duty cycle and effective motor voltage
//
// Only used at configuration time to turn the ramp and drive voltages into
// duty cycle values. The control loop works on the derived RampProfile.

use crate::config::{
    BridgeConfig, DEFAULT_DRIVE_MILLIVOLT, DEFAULT_MILLIMETER_PER_SECOND,
    DEFAULT_MOTOR_START_TIME_MILLIS, MAX_SPEED_PWM, MILLIMETER_IN_ONE_CENTIMETER,
    MILLIS_IN_ONE_SECOND, RAMP_DOWN_VOLTAGE_PER_SECOND, RAMP_INTERVAL_MILLIS,
    RAMP_UP_VALUE_OFFSET_MILLIVOLT, RAMP_UP_VOLTAGE_PER_SECOND,
};

const MAX_PWM: u32 = MAX_SPEED_PWM as u32;

/// Estimated motor voltage for a duty cycle, given the usable bridge voltage in volt
pub fn motor_voltage_for_pwm(duty: u8, usable_voltage: f32) -> f32 {
    duty as f32 * usable_voltage / MAX_PWM as f32
}

/// Estimated motor millivolts for a duty cycle
pub fn millivolt_for_pwm(duty: u8, bridge: &BridgeConfig) -> u32 {
    duty as u32 * bridge.output_millivolt() / MAX_PWM
}

/// Duty cycle for a motor voltage, truncated and clamped to the duty range
pub fn pwm_for_millivolt(millivolt: u32, bridge: &BridgeConfig) -> u8 {
    clamp_pwm(millivolt as u64 * MAX_PWM as u64 / bridge.output_millivolt() as u64)
}

/// Duty cycle for a motor voltage, rounded to the nearest value
pub fn pwm_for_millivolt_rounded(millivolt: u32, bridge: &BridgeConfig) -> u8 {
    let output = bridge.output_millivolt() as u64;
    clamp_pwm((millivolt as u64 * MAX_PWM as u64 + output / 2) / output)
}

fn clamp_pwm(value: u64) -> u8 {
    value.min(MAX_PWM as u64) as u8
}

/// Ramp and distance constants of one bridge type, in duty cycle units
///
/// Derived once at startup and then treated as read-only by the motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampProfile {
    /// Time between two ramp steps
    pub ramp_interval_millis: u32,
    /// Speed applied when a ramp up starts
    pub ramp_up_offset: u8,
    /// Speed increase per ramp step
    pub ramp_up_delta: u8,
    /// Speed decrease per ramp step. Braking is faster than accelerating.
    pub ramp_down_delta: u8,
    /// Below this speed a motor can be stopped without a ramp
    pub min_stop_speed: u8,
    /// Drive speed used when no calibration is available
    pub default_drive_speed: u8,
    /// Drive speed the distance calibration was measured at
    pub reference_drive_speed: u8,
    /// Constant part of the distance to time estimation
    pub motor_start_millis: u32,
    pub default_millis_per_cm: u8,
}

impl RampProfile {
    pub fn for_bridge(bridge: &BridgeConfig) -> Self {
        let pwm_for_1_volt = MILLIS_IN_ONE_SECOND * MAX_PWM / bridge.output_millivolt();
        let steps_per_second = MILLIS_IN_ONE_SECOND / RAMP_INTERVAL_MILLIS;
        let default_drive_speed = pwm_for_millivolt_rounded(DEFAULT_DRIVE_MILLIVOLT, bridge);

        Self {
            ramp_interval_millis: RAMP_INTERVAL_MILLIS,
            ramp_up_offset: pwm_for_millivolt(RAMP_UP_VALUE_OFFSET_MILLIVOLT, bridge),
            ramp_up_delta: delta_per_step(pwm_for_1_volt, RAMP_UP_VOLTAGE_PER_SECOND, steps_per_second),
            ramp_down_delta: delta_per_step(
                pwm_for_1_volt,
                RAMP_DOWN_VOLTAGE_PER_SECOND,
                steps_per_second,
            ),
            min_stop_speed: default_drive_speed,
            default_drive_speed,
            reference_drive_speed: default_drive_speed,
            motor_start_millis: DEFAULT_MOTOR_START_TIME_MILLIS,
            default_millis_per_cm: ((MILLIS_IN_ONE_SECOND * MILLIMETER_IN_ONE_CENTIMETER)
                / DEFAULT_MILLIMETER_PER_SECOND) as u8,
        }
    }
}

impl Default for RampProfile {
    fn default() -> Self {
        Self::for_bridge(&BridgeConfig::default())
    }
}

// At least 1, a zero delta would stall the ramp
fn delta_per_step(pwm_for_1_volt: u32, volt_per_second: u32, steps_per_second: u32) -> u8 {
    clamp_pwm((pwm_for_1_volt * volt_per_second / steps_per_second.max(1)) as u64).max(1)
}
