// Loop timing, topics, bridge and ramp configuration
use std::time::Duration;

// Control loop frequency. One loop iteration is one ramp interval.
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog (speed-only moves are ramped down after this)
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_CAR: &str = "pwmcar/cmd"; // commands
pub const TOPIC_RT_MOTORS: &str = "pwmcar/rt/motors"; // actuation
pub const TOPIC_STATE: &str = "pwmcar/state"; // motor / ramp state
pub const TOPIC_HEALTH: &str = "pwmcar/state/health"; // health status

// Calibration file used by the runtime binary
pub const DEFAULT_CALIBRATION_PATH: &str = "calibration.json";

/// Duty cycle range of the bridge
pub const MAX_SPEED_PWM: u8 = 255;

pub const MILLIS_IN_ONE_SECOND: u32 = 1000;
pub const MILLIMETER_IN_ONE_CENTIMETER: u32 = 10;

// Bridge characteristics. 4 x AA rechargeable cells, mosfet bridge without loss.
pub const FULL_BRIDGE_INPUT_MILLIVOLT: u32 = 4800;
pub const FULL_BRIDGE_LOSS_MILLIVOLT: u32 = 0;
// An L298 bridge loses around 2.2 V
pub const L298_BRIDGE_LOSS_MILLIVOLT: u32 = 2200;

/// Drive voltage for the default drive speed. Around 22 cm/s on the reference car.
pub const DEFAULT_DRIVE_MILLIVOLT: u32 = 2000;
pub const DEFAULT_MILLIMETER_PER_SECOND: u32 = 220;

// Constant part of the distance to time formula
pub const DEFAULT_MOTOR_START_TIME_MILLIS: u32 = 20;

// Ramp values
pub const RAMP_INTERVAL_MILLIS: u32 = (MILLIS_IN_ONE_SECOND as u64 / LOOP_HZ) as u32;
pub const RAMP_UP_VOLTAGE_PER_SECOND: u32 = 12;
pub const RAMP_DOWN_VOLTAGE_PER_SECOND: u32 = 14;
// Higher values make the wheels spin on start
pub const RAMP_UP_VALUE_OFFSET_MILLIVOLT: u32 = 2000;

// Differential drive geometry, distance between the two wheel contact points
pub const DEFAULT_TRACK_WIDTH_MILLIMETER: u32 = 140;

/// Electrical characteristics of the full bridge driving the motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub input_millivolt: u32,
    pub loss_millivolt: u32,
}

impl BridgeConfig {
    pub fn new(input_millivolt: u32, loss_millivolt: u32) -> Self {
        Self {
            input_millivolt,
            loss_millivolt,
        }
    }

    /// Effective voltage available for the motor. Never 0, so it is safe as a divisor.
    pub fn output_millivolt(&self) -> u32 {
        self.input_millivolt
            .saturating_sub(self.loss_millivolt)
            .max(1)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(FULL_BRIDGE_INPUT_MILLIVOLT, FULL_BRIDGE_LOSS_MILLIVOLT)
    }
}
