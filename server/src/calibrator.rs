// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::thread::sleep;
use std::time::Duration;

use canonical_error::CanonicalError;
use log::info;

use cubli_elements::orientation::Triple;
use cubli_elements::register_device::RegisterBus;

use crate::mpu6050::Mpu6050;

pub const CALIBRATION_SAMPLES: usize = 50;

/// Estimates the gyro zero bias: the mean angular velocity reported while the
/// device is at rest. Takes CALIBRATION_SAMPLES readings spaced by
/// `interval`, blocking the caller throughout.
pub fn calibrate_gyro<B: RegisterBus>(sensor: &mut Mpu6050<B>,
                                      interval: Duration)
                                      -> Result<Triple, CanonicalError> {
    info!("Calibrating gyro over {} samples; keep the device still",
          CALIBRATION_SAMPLES);
    let mut samples = Vec::<Triple>::with_capacity(CALIBRATION_SAMPLES);
    for _ in 0..CALIBRATION_SAMPLES {
        samples.push(sensor.read_angular_velocity()?);
        sleep(interval);
    }
    let offsets = mean(&samples);
    info!("Gyro zero bias (°/s): {}", offsets);
    Ok(offsets)
}

// Per-axis arithmetic mean. `samples` must not be empty.
pub fn mean(samples: &[Triple]) -> Triple {
    let sum = samples.iter().fold(Triple::ZERO, |acc, s| acc + *s);
    sum / samples.len() as f64
}

// mod tests.
