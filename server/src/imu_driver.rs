// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use canonical_error::{CanonicalError, internal_error};
use log::{debug, error, info, warn};

use cubli_elements::imu_trait::{OrientationSource, PollState};
use cubli_elements::orientation::{OrientationEstimator, OrientationState,
                                  Triple};
use cubli_elements::register_device::RegisterBus;

use crate::calibrator::calibrate_gyro;
use crate::mpu6050::{DriverConfig, Mpu6050};

/// Turns an MPU-6050 into a continuously updated orientation source.
///
/// Construction configures the device and blocks for the gyro calibration.
/// start() launches a worker thread that samples the sensor as fast as the
/// bus allows, fuses accelerometer and gyro data, and publishes an
/// OrientationState per iteration. stop() cancels the worker and waits for
/// it.
pub struct ImuDriver<B: RegisterBus + Send + 'static> {
    // Shared with the worker thread, which does all sampling while running.
    sensor: Arc<Mutex<Mpu6050<B>>>,

    // Degrees/second. Fixed for the driver's lifetime.
    gyro_offsets: Triple,

    // Our state, shared between ImuDriver methods and the worker thread.
    state: Arc<Mutex<SharedState>>,

    // Executes worker(). None while idle.
    poll_task: Option<PollTask>,
}

struct PollTask {
    // Set by stop(); the worker exits when it sees this.
    stop_request: Arc<AtomicBool>,

    handle: JoinHandle<Result<(), CanonicalError>>,
}

// State shared between worker thread and the ImuDriver methods.
struct SharedState {
    poll_state: PollState,

    // Replaced as a whole by the worker once per iteration.
    orientation: OrientationState,

    // Describes the error that terminated the worker, if any.
    last_error: Option<String>,
}

impl<B: RegisterBus + Send + 'static> ImuDriver<B> {
    /// Configures the sensor on `bus` and calibrates the gyro. The device
    /// must be at rest; this blocks for about 50 calibration intervals.
    pub fn new(bus: B, config: DriverConfig) -> Result<Self, CanonicalError> {
        let mut sensor = Mpu6050::new(bus, &config)?;
        let gyro_offsets =
            calibrate_gyro(&mut sensor, config.calibration_interval)?;
        Ok(ImuDriver{
            sensor: Arc::new(Mutex::new(sensor)),
            gyro_offsets,
            state: Arc::new(Mutex::new(SharedState{
                poll_state: PollState::Idle,
                orientation: OrientationState::default(),
                last_error: None,
            })),
            poll_task: None,
        })
    }

    /// Changes the digital low pass filter setting (0..=7). Allowed while
    /// the worker is running.
    pub fn set_dlpf_config(&self, dlpf_config: u8)
                           -> Result<(), CanonicalError> {
        self.sensor.lock().unwrap().set_dlpf_config(dlpf_config)
    }

    /// Sensor output rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sensor.lock().unwrap().sample_rate()
    }

    /// Describes the bus error that terminated the most recent worker, if
    /// any. Cleared by start().
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    fn worker(sensor: Arc<Mutex<Mpu6050<B>>>,
              gyro_offsets: Triple,
              state: Arc<Mutex<SharedState>>,
              stop_request: Arc<AtomicBool>,
              mut last_update: Instant) -> Result<(), CanonicalError> {
        info!("Starting IMU poll loop");
        let mut estimator = OrientationEstimator::from_state(
            state.lock().unwrap().orientation);
        while !stop_request.load(Ordering::Relaxed) {
            let (accel, angular_velocity) = match Self::acquire(&sensor) {
                Ok(samples) => samples,
                Err(e) => {
                    error!("IMU poll loop terminated: {:?}", e);
                    let mut locked_state = state.lock().unwrap();
                    locked_state.poll_state = PollState::Failed;
                    locked_state.last_error = Some(format!("{:?}", e));
                    return Err(e);
                }
            };
            let now = Instant::now();
            let dt = now.saturating_duration_since(last_update);
            last_update = now;

            let orientation = estimator.update(
                accel, angular_velocity - gyro_offsets, dt);
            state.lock().unwrap().orientation = orientation;
        }
        info!("IMU poll loop stopped");
        Ok(())
    }

    // Reads the accelerometer, then the gyro. Either both succeed or nothing
    // from this iteration is used.
    fn acquire(sensor: &Arc<Mutex<Mpu6050<B>>>)
               -> Result<(Triple, Triple), CanonicalError> {
        let mut locked_sensor = sensor.lock().unwrap();
        let accel = locked_sensor.read_acceleration()?;
        let angular_velocity = locked_sensor.read_angular_velocity()?;
        Ok((accel, angular_velocity))
    }
}

impl<B: RegisterBus + Send + 'static> OrientationSource for ImuDriver<B> {
    fn start(&mut self) -> Result<(), CanonicalError> {
        // A worker that reported Failed is about to return even if its
        // thread has not finished yet.
        if let Some(task) = &self.poll_task {
            if !task.handle.is_finished() &&
                self.poll_state() != PollState::Failed
            {
                warn!("IMU poll loop already running");
                return Ok(());
            }
        }
        // Reap a worker that terminated on its own.
        if let Some(task) = self.poll_task.take() {
            if let Ok(Err(e)) = task.handle.join() {
                info!("Restarting IMU poll loop after: {:?}", e);
            }
        }

        let stop_request = Arc::new(AtomicBool::new(false));
        {
            let mut locked_state = self.state.lock().unwrap();
            locked_state.poll_state = PollState::Running;
            locked_state.last_error = None;
        }
        let cloned_sensor = self.sensor.clone();
        let cloned_state = self.state.clone();
        let cloned_stop_request = stop_request.clone();
        let gyro_offsets = self.gyro_offsets;
        let last_update = Instant::now();
        let spawned = std::thread::Builder::new()
            .name("imu_poll".to_string())
            .spawn(move || {
                Self::worker(cloned_sensor, gyro_offsets, cloned_state,
                             cloned_stop_request, last_update)
            });
        match spawned {
            Ok(handle) => {
                self.poll_task = Some(PollTask{stop_request, handle});
                Ok(())
            },
            Err(e) => {
                self.state.lock().unwrap().poll_state = PollState::Idle;
                Err(internal_error(
                    &format!("Failed to spawn IMU poll thread: {:?}", e)))
            }
        }
    }

    fn stop(&mut self) -> Result<(), CanonicalError> {
        let Some(task) = self.poll_task.take() else {
            debug!("IMU poll loop not running");
            return Ok(());
        };
        task.stop_request.store(true, Ordering::Relaxed);
        let result = match task.handle.join() {
            Ok(result) => result,
            Err(_) => Err(internal_error("IMU poll thread panicked")),
        };
        self.state.lock().unwrap().poll_state = PollState::Idle;
        result
    }

    fn poll_state(&self) -> PollState {
        self.state.lock().unwrap().poll_state
    }

    fn snapshot(&self) -> Option<OrientationState> {
        let locked_state = self.state.lock().unwrap();
        match locked_state.poll_state {
            PollState::Running => Some(locked_state.orientation),
            _ => None,
        }
    }

    fn calibration_offsets(&self) -> Triple {
        self.gyro_offsets
    }

    fn get_model(&self) -> String {
        "MPU-6050".to_string()
    }
}

impl<B: RegisterBus + Send + 'static> Drop for ImuDriver<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("IMU poll loop ended with error: {:?}", e);
        }
    }
}

// mod tests.
