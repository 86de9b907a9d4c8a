// Prints the ramp of a simulated car, no hardware or zenoh needed.
// Useful to check ramp constants for a bridge before driving.
use clap::Parser;
use tracing::info;

use pwm_car_runtime::car::Car;
use pwm_car_runtime::config::{
    BridgeConfig, FULL_BRIDGE_INPUT_MILLIVOLT, FULL_BRIDGE_LOSS_MILLIVOLT, RAMP_INTERVAL_MILLIS,
};
use pwm_car_runtime::motor::{ActuationRecorder, Direction, Millis, RampProfile};

#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value_t = FULL_BRIDGE_INPUT_MILLIVOLT)]
    input_millivolt: u32,

    #[arg(long, default_value_t = FULL_BRIDGE_LOSS_MILLIVOLT)]
    loss_millivolt: u32,

    /// Distance of the fixed distance move
    #[arg(long, default_value_t = 300, allow_hyphen_values = true)]
    distance_mm: i32,

    /// Compensation of the right motor, negative for the left one
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    compensation: i8,
}

fn print_cycle(car: &Car<ActuationRecorder>, now: Millis) {
    println!(
        "{:>6} ms  right {:>3} {:<12} left {:>3} {:<12}",
        now,
        car.right().compensated_speed(),
        format!("{:?}", car.right().ramp_state()),
        car.left().compensated_speed(),
        format!("{:?}", car.left().ramp_state())
    );
}

/// Run until the car stops, at most `max_cycles`
fn run_until_stopped(car: &mut Car<ActuationRecorder>, now: &mut Millis, max_cycles: usize) {
    for _ in 0..max_cycles {
        *now += RAMP_INTERVAL_MILLIS as Millis;
        let result = car.update(*now);
        print_cycle(car, *now);
        if result.distance_reached {
            println!("distance reached");
        }
        if !result.still_running {
            break;
        }
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let bridge = BridgeConfig::new(args.input_millivolt, args.loss_millivolt);
    let profile = RampProfile::for_bridge(&bridge);
    info!("{} mV usable: {:?}", bridge.output_millivolt(), profile);

    let mut car = Car::new(
        ActuationRecorder::new("right"),
        ActuationRecorder::new("left"),
        profile,
    );
    car.set_values_for_fixed_distance_driving(profile.default_drive_speed, args.compensation);

    let mut now: Millis = 0;

    println!("== ramp up");
    car.start(Direction::Forward, now);
    print_cycle(&car, now);
    for _ in 0..15 {
        now += RAMP_INTERVAL_MILLIS as Millis;
        car.update(now);
        print_cycle(&car, now);
    }

    println!("== ramp down");
    car.start_ramp_down();
    run_until_stopped(&mut car, &mut now, 50);

    println!("== go {} mm", args.distance_mm);
    car.start_go_distance_mm(args.distance_mm, now);
    run_until_stopped(&mut car, &mut now, 1000);
}
