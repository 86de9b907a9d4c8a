// 50 Hz car control loop with watchdog
// One loop iteration is one ramp interval. Commands arrive over zenoh, the
// car is updated once per loop and its actuation and state are published.
// Note: the watchdog ramps down a speed-only move when the commanding side
// goes silent (e.g. teleop crashed while a key was held).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationError, CalibrationStore, JsonCalibrationStore};
use crate::car::Car;
use crate::config::{
    BridgeConfig, CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_CAR, TOPIC_HEALTH, TOPIC_RT_MOTORS, TOPIC_STATE,
};
use crate::messages::{CarActuation, CarCommand, CarState, MotorState, RuntimeHealth};
use crate::motor::{ActuationRecorder, Direction, Millis, RampProfile};

/// Error types for the runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Zenoh error: {0}")]
    Zenoh(zenoh::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),
}

impl From<zenoh::Error> for RuntimeError {
    fn from(e: zenoh::Error) -> Self {
        RuntimeError::Zenoh(e)
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

pub struct Runtime<S> {
    car: Car<ActuationRecorder>,
    store: S,
    cmd_received_at: Option<Millis>,
    health: RuntimeHealth,
}

impl<S: CalibrationStore> Runtime<S> {
    /// Build the car and load its calibration from `store`
    pub fn new(profile: RampProfile, mut store: S) -> Result<Self> {
        let mut car = Car::new(
            ActuationRecorder::new("right"),
            ActuationRecorder::new("left"),
            profile,
        );
        if car.read_calibration(&mut store)? {
            info!(
                "Calibration loaded: left={:?} right={:?}",
                car.left().calibration(),
                car.right().calibration()
            );
        }
        Ok(Self {
            car,
            store,
            cmd_received_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    /// Apply an incoming command
    pub fn on_command(&mut self, cmd: CarCommand, now: Millis) {
        info!("Received command: {:?}", &cmd);
        self.cmd_received_at = Some(now);

        let car = &mut self.car;
        let changed = match cmd {
            CarCommand::Start { direction } => {
                car.start(direction, now);
                false
            }
            CarCommand::RampUp { direction, speed } => {
                match speed {
                    Some(speed) => car.start_ramp_up_to(speed, direction, now),
                    None => car.start_ramp_up(direction, now),
                }
                false
            }
            CarCommand::RampDown => {
                car.start_ramp_down();
                false
            }
            CarCommand::Stop { mode } => {
                match mode {
                    Some(mode) => car.stop(mode),
                    None => car.stop_default(),
                }
                false
            }
            CarCommand::SetSpeed { speed } => {
                car.set_speed_signed(speed);
                false
            }
            CarCommand::GoDistance { distance_mm, speed } => {
                match speed {
                    Some(speed) => {
                        let direction = if distance_mm < 0 {
                            Direction::Backward
                        } else {
                            Direction::Forward
                        };
                        car.start_go_distance(speed, distance_mm.unsigned_abs(), direction, now);
                    }
                    None => car.start_go_distance_mm(distance_mm, now),
                }
                false
            }
            CarCommand::Rotate { degrees, turn } => {
                car.start_rotate(degrees, turn, now);
                false
            }
            CarCommand::SetDriveSpeed { speed } => car.set_drive_speed(speed),
            CarCommand::ChangeCompensation { right } => car.change_speed_compensation(right),
            CarCommand::SetStopMode { mode } => car.set_stop_mode(mode),
            CarCommand::SaveCalibration => {
                // A failed save must not stop the control loop
                if let Err(e) = car.write_calibration(&mut self.store) {
                    warn!("Failed to save calibration: {}", e);
                }
                false
            }
        };

        if changed {
            debug!(
                "Motor values changed: left={:?} right={:?}",
                self.car.left().calibration(),
                self.car.right().calibration()
            );
        }
    }

    /// Ramp down speed-only moves when commands went stale
    fn check_watchdog(&mut self, now: Millis) {
        let cmd_age = self.cmd_received_at.map(|at| now.saturating_sub(at));
        let stale = match cmd_age {
            Some(age) => age > CMD_TIMEOUT.as_millis() as Millis,
            // No command ever received
            None => true,
        };

        if !stale {
            self.health = RuntimeHealth::Ok;
            return;
        }

        let moving = !self.car.is_stopped() && !self.car.is_distance_move_active();
        if self.health != RuntimeHealth::CmdStale && moving {
            match cmd_age {
                Some(age) => warn!("Command stale ({} ms old), ramping down", age),
                None => warn!("No command received, ramping down"),
            }
        }
        self.health = RuntimeHealth::CmdStale;
        if moving {
            self.car.start_ramp_down();
        }
    }

    /// One control cycle: watchdog, car update, outputs
    pub fn step(&mut self, now: Millis) -> (CarActuation, CarState) {
        self.check_watchdog(now);
        let result = self.car.update(now);
        if result.distance_reached {
            info!("Distance reached at {} ms", now);
        }

        let actuation = CarActuation {
            left: self.car.left().driver().actuation(),
            right: self.car.right().driver().actuation(),
        };
        let state = CarState {
            time_ms: now,
            left: MotorState::from(self.car.left()),
            right: MotorState::from(self.car.right()),
            distance_reached: result.distance_reached,
        };
        (actuation, state)
    }

    /// Stop both motors at once and return the final actuation
    pub fn shutdown(&mut self, now: Millis) -> CarActuation {
        info!("Shutting down, stopping motors");
        self.car.stop_default();
        let (actuation, _) = self.step(now);
        actuation
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn car(&self) -> &Car<ActuationRecorder> {
        &self.car
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

pub async fn run(bridge: BridgeConfig, calibration_path: PathBuf) -> Result<()> {
    let profile = RampProfile::for_bridge(&bridge);
    info!(
        "Bridge {} mV - {} mV loss: {:?}",
        bridge.input_millivolt, bridge.loss_millivolt, profile
    );

    let store = JsonCalibrationStore::new(calibration_path);
    info!("Calibration file: {}", store.path().display());
    let mut runtime = Runtime::new(profile, store)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_CAR).await?;
    let pub_actuation = session.declare_publisher(TOPIC_RT_MOTORS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let started = Instant::now();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_CAR);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_RT_MOTORS, TOPIC_STATE, TOPIC_HEALTH
    );

    // One future for the whole run, a signal during the publishes is kept
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                let actuation = runtime.shutdown(started.elapsed().as_millis() as Millis);
                pub_actuation.put(serde_json::to_string(&actuation)?).await?;
                return Ok(());
            }
        }
        // Read the clock once per cycle
        let now = started.elapsed().as_millis() as Millis;

        // 1. Drain all pending commands (non-blocking), in arrival order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<CarCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Watchdog and ramp update
        let (actuation, state) = runtime.step(now);

        // 3. Publish actuation and state
        pub_actuation.put(serde_json::to_string(&actuation)?).await?;
        pub_state.put(serde_json::to_string(&state)?).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Calibration, LEFT_MOTOR_SLOT, MemoryCalibrationStore, RIGHT_MOTOR_SLOT};
    use crate::motor::testing::test_profile;
    use crate::motor::{DriveMode, RampState, TurnDirection};

    fn test_runtime() -> Runtime<MemoryCalibrationStore> {
        Runtime::new(test_profile(), MemoryCalibrationStore::new()).unwrap()
    }

    #[test]
    fn test_stale_until_first_command() {
        let mut runtime = test_runtime();
        let (actuation, state) = runtime.step(0);
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert_eq!(actuation, CarActuation::default());
        assert_eq!(state.left.ramp_state, RampState::Stopped);

        runtime.on_command(CarCommand::RampDown, 20);
        runtime.step(20);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_start_command_ramps_up() {
        let mut runtime = test_runtime();
        runtime.on_command(
            CarCommand::Start {
                direction: Direction::Backward,
            },
            0,
        );
        let (actuation, _) = runtime.step(0);
        assert_eq!(actuation.left.duty, 20);
        assert_eq!(actuation.right.mode, DriveMode::Backward);

        let mut last = actuation;
        for i in 1..=5 {
            runtime.on_command(
                CarCommand::Start {
                    direction: Direction::Backward,
                },
                i * 20,
            );
            let (actuation, state) = runtime.step(i * 20);
            println!("{:?}", state);
            assert!(actuation.right.duty >= last.right.duty);
            last = actuation;
        }
        assert_eq!(last.right.duty, 80);
        assert_eq!(last.left.duty, 80);
    }

    #[test]
    fn test_watchdog_ramps_down_speed_only_move() {
        let mut runtime = test_runtime();
        runtime.on_command(
            CarCommand::Start {
                direction: Direction::Forward,
            },
            0,
        );
        let mut now = 0;
        while now < 240 {
            now += 20;
            runtime.step(now);
        }
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
        assert!(runtime.car().is_state(RampState::Driving));

        // 260 ms without command
        let (actuation, _) = runtime.step(260);
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert_eq!(actuation.right.duty, 66);
        assert!(runtime.car().is_state(RampState::RampingDown));

        for now in [280, 300, 320] {
            runtime.step(now);
        }
        assert!(runtime.car().is_stopped());
        let (actuation, _) = runtime.step(340);
        assert_eq!(actuation.left.mode, DriveMode::Brake);
    }

    #[test]
    fn test_watchdog_keeps_distance_move() {
        let mut runtime = test_runtime();
        runtime.on_command(
            CarCommand::GoDistance {
                distance_mm: 1000,
                speed: None,
            },
            0,
        );
        let mut now = 0;
        while now < 400 {
            now += 20;
            runtime.step(now);
        }
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert!(runtime.car().is_state(RampState::Driving));
        assert_eq!(runtime.car().right().distance_deadline(), Some(20 + 100 * 45));
    }

    #[test]
    fn test_rotate_reports_distance_reached() {
        let mut runtime = test_runtime();
        runtime.on_command(
            CarCommand::Rotate {
                degrees: 90,
                turn: TurnDirection::InPlace,
            },
            0,
        );
        let mut reached = Vec::new();
        for i in 1..=40 {
            let (_, state) = runtime.step(i * 20);
            if state.distance_reached {
                reached.push(state.time_ms);
            }
        }
        assert_eq!(reached, vec![520]);
    }

    #[test]
    fn test_shutdown_stops_running_car() {
        let mut runtime = test_runtime();
        runtime.on_command(
            CarCommand::GoDistance {
                distance_mm: 1000,
                speed: None,
            },
            0,
        );
        for i in 1..=5 {
            runtime.step(i * 20);
        }
        assert!(!runtime.car().is_stopped());

        let actuation = runtime.shutdown(120);
        assert_eq!(actuation.left.duty, 0);
        assert_eq!(actuation.right.duty, 0);
        assert_eq!(actuation.right.mode, DriveMode::Brake);
        assert!(runtime.car().is_stopped());
        assert!(!runtime.car().is_distance_move_active());
    }

    #[test]
    fn test_stop_command_with_mode() {
        let mut runtime = test_runtime();
        runtime.on_command(CarCommand::SetSpeed { speed: 120 }, 0);
        runtime.step(0);
        runtime.on_command(
            CarCommand::Stop {
                mode: Some(crate::motor::StopMode::Release),
            },
            20,
        );
        let (actuation, _) = runtime.step(20);
        assert_eq!(actuation.right.duty, 0);
        assert_eq!(actuation.right.mode, DriveMode::Release);
    }

    #[test]
    fn test_calibration_loaded_and_saved() {
        let mut store = MemoryCalibrationStore::new();
        store
            .store(
                LEFT_MOTOR_SLOT,
                Calibration {
                    drive_speed: 100,
                    compensation: 0,
                },
            )
            .unwrap();
        let mut runtime = Runtime::new(test_profile(), store).unwrap();
        assert_eq!(runtime.car().left().drive_speed(), 100);
        // Empty slot keeps the default
        assert_eq!(runtime.car().right().drive_speed(), 80);

        runtime.on_command(CarCommand::ChangeCompensation { right: 5 }, 0);
        runtime.on_command(CarCommand::SetDriveSpeed { speed: 90 }, 0);
        runtime.on_command(CarCommand::SaveCalibration, 0);

        let saved = runtime.store_mut().load(RIGHT_MOTOR_SLOT).unwrap();
        assert_eq!(
            saved,
            Some(Calibration {
                drive_speed: 90,
                compensation: 5
            })
        );
    }
}
