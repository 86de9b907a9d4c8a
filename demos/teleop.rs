// Keyboard teleop: W/S drive, A/D rotate 90 degrees, SPACE ramp down, X stop,
// R/F drive speed, C save calibration, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use pwm_car_runtime::config::TOPIC_CMD_CAR;
use pwm_car_runtime::messages::CarCommand;
use pwm_car_runtime::motor::{Direction, TurnDirection};

const DRIVE_SPEEDS: [u8; 3] = [80, 106, 160]; // duty cycle
const ROTATE_DEGREES: i32 = 90;
const INPUT_TIMEOUT_MS: u64 = 100; // Ramp down after this much time with no drive input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_CAR).await?;

    info!("Controls: W/S=drive, A/D=rotate, SPACE=ramp down, X=stop, R/F=speed, C=save, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &CarCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    send(
        publisher,
        &CarCommand::SetDriveSpeed {
            speed: DRIVE_SPEEDS[speed_idx],
        },
    )
    .await?;
    print_speed(speed_idx);

    // Direction of the key currently held, if any
    let mut driving: Option<Direction> = None;
    let mut last_drive_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (one control loop of the runtime)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Drive while held
                    KeyCode::Char('w') if pressed => {
                        driving = Some(Direction::Forward);
                        last_drive_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        driving = Some(Direction::Backward);
                        last_drive_input = Instant::now();
                    }

                    // Rotation is a distance move, one per key press
                    KeyCode::Char('a') if kind == KeyEventKind::Press => {
                        driving = None;
                        let cmd = CarCommand::Rotate {
                            degrees: ROTATE_DEGREES,
                            turn: TurnDirection::InPlace,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Char('d') if kind == KeyEventKind::Press => {
                        driving = None;
                        let cmd = CarCommand::Rotate {
                            degrees: -ROTATE_DEGREES,
                            turn: TurnDirection::InPlace,
                        };
                        send(publisher, &cmd).await?;
                    }

                    KeyCode::Char(' ') if pressed => {
                        driving = None;
                        send(publisher, &CarCommand::RampDown).await?;
                    }
                    KeyCode::Char('x') if pressed => {
                        driving = None;
                        send(publisher, &CarCommand::Stop { mode: None }).await?;
                    }

                    // Speed control
                    KeyCode::Char('r') | KeyCode::Char('f') if kind == KeyEventKind::Press => {
                        speed_idx = if code == KeyCode::Char('r') {
                            (speed_idx + 1).min(DRIVE_SPEEDS.len() - 1)
                        } else {
                            speed_idx.saturating_sub(1)
                        };
                        let cmd = CarCommand::SetDriveSpeed {
                            speed: DRIVE_SPEEDS[speed_idx],
                        };
                        send(publisher, &cmd).await?;
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('c') if kind == KeyEventKind::Press => {
                        send(publisher, &CarCommand::SaveCalibration).await?;
                        info!("Calibration saved");
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => {
                        send(publisher, &CarCommand::Stop { mode: None }).await?;
                        break;
                    }

                    _ => {}
                }
            }
        }

        // Key released: ramp down once
        if driving.is_some() && last_drive_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS)
        {
            driving = None;
            send(publisher, &CarCommand::RampDown).await?;
        }

        // Refresh the runtime watchdog at ~50Hz while a drive key is held
        if let Some(direction) = driving {
            send(publisher, &CarCommand::Start { direction }).await?;
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Drive speed: {} ({})", label, DRIVE_SPEEDS[idx]);
}
