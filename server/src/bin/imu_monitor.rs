// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use canonical_error::{CanonicalError, internal_error};
use clap::Parser;
use log::info;

use cubli_elements::imu_trait::OrientationSource;
use cubli_elements::orientation::{
    accel_to_string, angle_to_string, angular_speed_to_string, xyz_to_string};
use cubli_server::imu_driver::ImuDriver;
use cubli_server::mpu6050::DriverConfig;
use cubli_server::rppal_bus::RppalBus;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// I2C bus number (/dev/i2c-N).
    #[arg(long, default_value = "1")]
    i2c_bus: u8,

    /// Device address of the MPU-6050; 0x68, or 0x69 with AD0 high.
    #[arg(long, value_parser = parse_address, default_value = "0x68")]
    address: u16,

    /// Digital low pass filter setting, 0..7.
    #[arg(long, default_value = "6")]
    dlpf: u8,

    /// Sample rate divider.
    #[arg(long, default_value = "0")]
    sample_rate_divider: u8,

    /// Interval between reports, seconds.
    #[arg(long, value_parser = parse_duration, default_value = "0.1")]
    report_interval: Duration,

    /// Also report raw accelerometer and gyro values.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn parse_duration(arg: &str)
                  -> Result<std::time::Duration, std::num::ParseFloatError> {
    let seconds = arg.parse()?;
    Ok(std::time::Duration::from_secs_f32(seconds))
}

fn parse_address(arg: &str) -> Result<u16, std::num::ParseIntError> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => arg.parse(),
    }
}

fn main() -> Result<(), CanonicalError> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let got_signal = Arc::new(AtomicBool::new(false));
    let got_signal2 = got_signal.clone();
    ctrlc::set_handler(move || {
        info!("Got control-c");
        got_signal2.store(true, Ordering::Relaxed);
    }).map_err(|e| internal_error(
        &format!("Failed to install signal handler: {:?}", e)))?;

    let config = DriverConfig{
        address: args.address,
        dlpf_config: args.dlpf,
        sample_rate_divider: args.sample_rate_divider,
        ..Default::default()
    };
    info!("Initializing MPU-6050 on I2C bus {}; keep it still...", args.i2c_bus);
    let bus = RppalBus::new(args.i2c_bus)?;
    let mut imu = ImuDriver::new(bus, config)?;
    info!("{} ready, sample rate {}Hz, gyro offsets {}",
          imu.get_model(), imu.sample_rate(),
          xyz_to_string(&imu.calibration_offsets(), angular_speed_to_string));

    imu.start()?;
    while imu.is_running() && !got_signal.load(Ordering::Relaxed) {
        std::thread::sleep(args.report_interval);
        info!("Filtered: {}",
              xyz_to_string(&imu.get_filtered_angles(), angle_to_string));
        if args.verbose {
            info!("Accel: {}  Gyro: {}",
                  xyz_to_string(&imu.get_accel_accelerations(), accel_to_string),
                  xyz_to_string(&imu.get_gyro_angular_speeds(),
                                angular_speed_to_string));
        }
    }
    info!("Exiting");
    imu.stop()
}
