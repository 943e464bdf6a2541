// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::CanonicalError;

use crate::orientation::{OrientationState, Triple};

// Lifecycle of an orientation source's polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    // No loop running.
    Idle,
    // Loop active, publishing a new state each iteration.
    Running,
    // Loop terminated by a bus error. Cleared by stop() or start().
    Failed,
}

/// Live orientation data for visualization and control consumers.
///
/// All get_xxx() accessors return `Triple::SENTINEL` (-1 on every axis) unless
/// the polling loop is running.
pub trait OrientationSource {
    // Launches the polling loop. No-op if it is already running.
    fn start(&mut self) -> Result<(), CanonicalError>;

    // Signals the polling loop to exit and waits for it. No-op when idle.
    // Returns the error that terminated the loop, if any.
    fn stop(&mut self) -> Result<(), CanonicalError>;

    fn poll_state(&self) -> PollState;

    fn is_running(&self) -> bool {
        self.poll_state() == PollState::Running
    }

    // The most recently published state, or None if the loop is not running.
    fn snapshot(&self) -> Option<OrientationState>;

    // Calibration offsets (degrees/s), independent of the loop state.
    fn calibration_offsets(&self) -> Triple;

    // Degrees, from the accelerometer alone.
    fn get_accel_angles(&self) -> Triple {
        self.snapshot().map_or(Triple::SENTINEL, |s| s.accel_angles)
    }

    // g.
    fn get_accel_accelerations(&self) -> Triple {
        self.snapshot().map_or(Triple::SENTINEL, |s| s.accel)
    }

    // Degrees/second, offset-corrected.
    fn get_gyro_angular_speeds(&self) -> Triple {
        self.snapshot().map_or(Triple::SENTINEL, |s| s.angular_speeds)
    }

    // Degrees, raw integration (drifts).
    fn get_gyro_angles(&self) -> Triple {
        self.snapshot().map_or(Triple::SENTINEL, |s| s.gyro_angles)
    }

    // Degrees, fused estimate.
    fn get_filtered_angles(&self) -> Triple {
        self.snapshot().map_or(Triple::SENTINEL, |s| s.filtered_angles)
    }

    fn get_gyro_offsets(&self) -> Triple {
        if self.is_running() {
            self.calibration_offsets()
        } else {
            Triple::SENTINEL
        }
    }

    // Returns the IMU's model.
    fn get_model(&self) -> String;
}
