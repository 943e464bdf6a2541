// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

pub mod imu_trait;
pub mod orientation;
pub mod register_device;
