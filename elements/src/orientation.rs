// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::time::Duration;

pub const RADIAN_TO_DEGREE: f64 = 180.0 / PI;

// Weight given to the gyro-propagated angle by the complementary filter; the
// accelerometer angle gets the remainder.
pub const FILTER_ALPHA: f64 = 0.96;

/// Per-axis value (acceleration, angular speed, or angle).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Triple {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Triple {
    /// Value reported by accessors while no polling loop is running.
    pub const SENTINEL: Triple = Triple{x: -1.0, y: -1.0, z: -1.0};

    pub const ZERO: Triple = Triple{x: 0.0, y: 0.0, z: 0.0};

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Triple{x, y, z}
    }
}

impl Add for Triple {
    type Output = Triple;

    fn add(self, other: Triple) -> Triple {
        Triple{x: self.x + other.x, y: self.y + other.y, z: self.z + other.z}
    }
}

impl Sub for Triple {
    type Output = Triple;

    fn sub(self, other: Triple) -> Triple {
        Triple{x: self.x - other.x, y: self.y - other.y, z: self.z - other.z}
    }
}

impl Mul<f64> for Triple {
    type Output = Triple;

    fn mul(self, factor: f64) -> Triple {
        Triple{x: self.x * factor, y: self.y * factor, z: self.z * factor}
    }
}

impl Div<f64> for Triple {
    type Output = Triple;

    fn div(self, divisor: f64) -> Triple {
        Triple{x: self.x / divisor, y: self.y / divisor, z: self.z / divisor}
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x: {}\ty: {}\tz: {}", self.x, self.y, self.z)
    }
}

pub fn angle_to_string(angle: f64) -> String {
    format!("{:.4}°", angle)
}

pub fn accel_to_string(accel: f64) -> String {
    format!("{:.6}g", accel)
}

pub fn angular_speed_to_string(angular_speed: f64) -> String {
    format!("{:.4}°/s", angular_speed)
}

/// Formats each axis of `values` with `format_fn`.
pub fn xyz_to_string(values: &Triple, format_fn: fn(f64) -> String) -> String {
    format!("x: {}\ty: {}\tz: {}",
            format_fn(values.x), format_fn(values.y), format_fn(values.z))
}

fn distance(a: f64, b: f64) -> f64 {
    (a * a + b * b).sqrt()
}

// Tilt about the X axis, in 0..360 degrees. Rotating the gravity vector
// (0, sin θ, cos θ) yields θ.
pub fn accel_x_angle(accel: &Triple) -> f64 {
    let (y, z) = (accel.y, accel.z);
    let base = y.atan2(distance(accel.x, z)) * RADIAN_TO_DEGREE;
    if y >= 0.0 {
        if z >= 0.0 { base } else { 180.0 - base }
    } else if z <= 0.0 {
        180.0 - base
    } else {
        base + 360.0
    }
}

// Tilt about the Y axis, in 0..360 degrees. Rotating the gravity vector
// (-sin θ, 0, cos θ) yields θ.
pub fn accel_y_angle(accel: &Triple) -> f64 {
    let (x, z) = (accel.x, accel.z);
    // Same as atan(-x / d) for d > 0, and stays finite when d == 0.
    let base = (-x).atan2(distance(accel.y, z)) * RADIAN_TO_DEGREE;
    if x <= 0.0 {
        if z >= 0.0 { base } else { 180.0 - base }
    } else if z <= 0.0 {
        180.0 - base
    } else {
        base + 360.0
    }
}

// A single gravity vector carries no information about rotation around it.
pub fn accel_z_angle(_accel: &Triple) -> f64 {
    0.0
}

pub fn accel_angles(accel: &Triple) -> Triple {
    Triple{x: accel_x_angle(accel),
           y: accel_y_angle(accel),
           z: accel_z_angle(accel)}
}

/// Everything one polling iteration derives. Published as a whole so readers
/// never mix fields from two iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationState {
    // g, z axis sign-inverted.
    pub accel: Triple,

    // Degrees, from `accel` alone.
    pub accel_angles: Triple,

    // Degrees/second, calibration offsets removed.
    pub angular_speeds: Triple,

    // Degrees. Pure integration of `angular_speeds`, never wrapped.
    pub gyro_angles: Triple,

    // Degrees. Complementary filter output.
    pub filtered_angles: Triple,

    // Number of updates folded into this state.
    pub iteration: u64,
}

/// Integrates gyro rates and fuses them with accelerometer tilt angles.
///
/// X and Y use the complementary filter
/// `filtered = α·(filtered + Δgyro) + (1 − α)·accel_angle`. Z has no
/// accelerometer reference and is pure integration; it drifts without bound,
/// as do the raw integrated gyro angles.
#[derive(Debug, Clone, Default)]
pub struct OrientationEstimator {
    state: OrientationState,
}

impl OrientationEstimator {
    pub fn new() -> Self {
        OrientationEstimator::default()
    }

    /// Continues from a previously published state.
    pub fn from_state(state: OrientationState) -> Self {
        OrientationEstimator{state}
    }

    pub fn state(&self) -> &OrientationState {
        &self.state
    }

    /// Folds in one iteration. `accel` is in g, `angular_speeds` in
    /// degrees/second (already offset-corrected), `dt` is the time since the
    /// previous update.
    pub fn update(&mut self, accel: Triple, angular_speeds: Triple,
                  dt: Duration) -> OrientationState {
        let accel_angles = accel_angles(&accel);
        let delta = angular_speeds * dt.as_secs_f64();
        let prev = self.state.filtered_angles;

        self.state = OrientationState{
            accel,
            accel_angles,
            angular_speeds,
            gyro_angles: self.state.gyro_angles + delta,
            filtered_angles: Triple{
                x: FILTER_ALPHA * (prev.x + delta.x) +
                    (1.0 - FILTER_ALPHA) * accel_angles.x,
                y: FILTER_ALPHA * (prev.y + delta.y) +
                    (1.0 - FILTER_ALPHA) * accel_angles.y,
                z: prev.z + delta.z,
            },
            iteration: self.state.iteration + 1,
        };
        self.state
    }
}

// mod tests.
