// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

pub mod calibrator;
pub mod imu_driver;
pub mod mpu6050;
pub mod rppal_bus;

#[cfg(test)]
mod sim_bus;
