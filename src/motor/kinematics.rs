// Differential drive turn geometry for a 2 wheel car
// Converts a rotation of the car body into the distance each wheel has to travel.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TRACK_WIDTH_MILLIMETER;

/// Pivot point of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    /// Only the outer wheel drives forward, pivot is the inner wheel
    Forward,
    /// Only the outer wheel drives backward
    Backward,
    /// Wheels drive in opposite directions, pivot is the car center
    #[default]
    InPlace,
}

/// Signed travel distance of each wheel (positive = forward)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelDistances {
    pub left_mm: i32,
    pub right_mm: i32,
}

impl WheelDistances {
    pub fn new(left_mm: i32, right_mm: i32) -> Self {
        Self { left_mm, right_mm }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns distances as array [left, right]
    pub fn as_array(&self) -> [i32; 2] {
        [self.left_mm, self.right_mm]
    }
}

/// Arc length in mm of a wheel circling the pivot at `radius_mm`
fn arc_mm(degrees: u32, radius_mm: f32) -> i32 {
    let arc = degrees as f32 * (PI / 180.0) * radius_mm;
    // Clamp to the i32 range
    arc.round().min(i32::MAX as f32) as i32
}

/// Convert a car rotation to wheel distances
///
/// # Arguments
/// * `degrees` - Rotation in degrees (positive = left / counter-clockwise)
/// * `turn` - Pivot point of the turn
pub fn turn_wheel_distances(degrees: i32, turn: TurnDirection) -> WheelDistances {
    turn_wheel_distances_with_track(degrees, turn, DEFAULT_TRACK_WIDTH_MILLIMETER)
}

/// Convert a car rotation to wheel distances for a custom track width
pub fn turn_wheel_distances_with_track(
    degrees: i32,
    turn: TurnDirection,
    track_width_mm: u32,
) -> WheelDistances {
    let magnitude = degrees.unsigned_abs();
    let track = track_width_mm as f32;

    // Distances for a left turn as [outer (right), inner (left)]
    let [outer, inner] = match turn {
        // Outer wheel circles the inner one
        TurnDirection::Forward => [arc_mm(magnitude, track), 0],
        // Inner wheel backs up around the outer one
        TurnDirection::Backward => [0, -arc_mm(magnitude, track)],
        TurnDirection::InPlace => {
            let half = arc_mm(magnitude, track / 2.0);
            [half, -half]
        }
    };

    if degrees >= 0 {
        WheelDistances::new(inner, outer)
    } else {
        // Right turn: swap the roles of the wheels
        WheelDistances::new(outer, inner)
    }
}
