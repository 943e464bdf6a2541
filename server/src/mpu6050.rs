// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Duration;

use canonical_error::{CanonicalError,
                      failed_precondition_error, out_of_range_error};
use log::{debug, info};

use cubli_elements::orientation::Triple;
use cubli_elements::register_device::{RegisterBus, RegisterDevice};

// MPU-6050 register map.
pub const SMPLRT_DIV: u8 = 0x19;
pub const CONFIG: u8 = 0x1A;
pub const GYRO_CONFIG: u8 = 0x1B;
pub const ACCEL_CONFIG: u8 = 0x1C;
pub const INT_ENABLE: u8 = 0x38;
pub const PWR_MGMT_1: u8 = 0x6B;
pub const PWR_MGMT_2: u8 = 0x6C;
pub const WHO_AM_I: u8 = 0x75;

// Data register addresses (high byte of each axis; low byte follows).
pub const ACCEL_XOUT_H: u8 = 0x3B;
pub const ACCEL_YOUT_H: u8 = 0x3D;
pub const ACCEL_ZOUT_H: u8 = 0x3F;
pub const GYRO_XOUT_H: u8 = 0x43;
pub const GYRO_YOUT_H: u8 = 0x45;
pub const GYRO_ZOUT_H: u8 = 0x47;

pub const DEFAULT_ADDRESS: u16 = 0x68;
const EXPECTED_WHO_AM_I: u8 = 0x68;

/// Gyroscope full scale range (FS_SEL).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GyroRange {
    #[default]
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroRange {
    pub fn register_value(self) -> u8 {
        let fs_sel = match self {
            GyroRange::Dps250 => 0,
            GyroRange::Dps500 => 1,
            GyroRange::Dps1000 => 2,
            GyroRange::Dps2000 => 3,
        };
        fs_sel << 3
    }

    // LSB per degree/second.
    pub fn sensitivity(self) -> f64 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }
}

/// Accelerometer full scale range (AFS_SEL).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccelRange {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    pub fn register_value(self) -> u8 {
        let afs_sel = match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        };
        afs_sel << 3
    }

    // LSB per g.
    pub fn sensitivity(self) -> f64 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub address: u16,

    // Digital low pass filter setting, 0..=7. 0 and 7 disable filtering.
    // The only field that can be changed after construction.
    pub dlpf_config: u8,

    // Sample Rate = Gyroscope Output Rate / (1 + sample_rate_divider).
    pub sample_rate_divider: u8,

    pub gyro_range: GyroRange,
    pub accel_range: AccelRange,

    // Spacing of the gyro samples averaged during calibration.
    pub calibration_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig{
            address: DEFAULT_ADDRESS,
            dlpf_config: 6,
            sample_rate_divider: 0,
            gyro_range: GyroRange::default(),
            accel_range: AccelRange::default(),
            calibration_interval: Duration::from_millis(100),
        }
    }
}

/// Low level interface to the MPU-6050. Configures the device and converts
/// its data registers to physical units. This layer does not provide zero
/// calibration or data integration.
pub struct Mpu6050<B: RegisterBus> {
    device: RegisterDevice<B>,

    dlpf_config: u8,
    sample_rate_divider: u8,

    // LSB per degree/second and LSB per g, per the configured ranges.
    gyro_sensitivity: f64,
    accel_sensitivity: f64,
}

impl<B: RegisterBus> Mpu6050<B> {
    /// Binds the device on `bus` and applies `config`. Every configuration
    /// write is read back; any discrepancy is a failed precondition error
    /// and no sensor is returned.
    pub fn new(bus: B, config: &DriverConfig) -> Result<Self, CanonicalError> {
        Self::check_dlpf_config(config.dlpf_config)?;
        let device = RegisterDevice::new(bus, config.address)?;
        let mut mpu = Mpu6050{
            device,
            dlpf_config: config.dlpf_config,
            sample_rate_divider: config.sample_rate_divider,
            gyro_sensitivity: config.gyro_range.sensitivity(),
            accel_sensitivity: config.accel_range.sensitivity(),
        };
        mpu.verify_device()?;
        mpu.configure(config)?;
        info!("MPU-6050 at 0x{:02X} configured: {}Hz sample rate, DLPF {}, \
               {:?} gyro, {:?} accel",
              config.address, mpu.sample_rate(), config.dlpf_config,
              config.gyro_range, config.accel_range);
        Ok(mpu)
    }

    fn verify_device(&mut self) -> Result<(), CanonicalError> {
        let who_am_i = self.device.read_unsigned_register(WHO_AM_I)?;
        if who_am_i != EXPECTED_WHO_AM_I {
            return Err(failed_precondition_error(
                &format!("Wrong device ID: expected 0x{:02X}, got 0x{:02X}",
                         EXPECTED_WHO_AM_I, who_am_i)));
        }
        Ok(())
    }

    fn configure(&mut self, config: &DriverConfig) -> Result<(), CanonicalError> {
        // Clear SLEEP; zero elsewhere selects the internal oscillator.
        self.update_register(PWR_MGMT_1, 0x00)?;
        self.update_register(SMPLRT_DIV, config.sample_rate_divider)?;
        self.set_dlpf_config(config.dlpf_config)?;
        self.update_register(GYRO_CONFIG, config.gyro_range.register_value())?;
        self.update_register(ACCEL_CONFIG, config.accel_range.register_value())?;
        // No interrupt sources; no axis in standby.
        self.update_register(INT_ENABLE, 0x00)?;
        self.update_register(PWR_MGMT_2, 0x00)?;
        Ok(())
    }

    /// Writes `value` to `reg` and verifies it by reading it back.
    pub fn update_register(&mut self, reg: u8, value: u8)
                           -> Result<(), CanonicalError> {
        self.device.write_register(reg, value as i32)?;
        let read_back = self.device.read_unsigned_register(reg)?;
        if read_back != value {
            return Err(failed_precondition_error(
                &format!("Register 0x{:02X} reads back 0x{:02X} after writing \
                          0x{:02X}", reg, read_back, value)));
        }
        Ok(())
    }

    pub fn set_dlpf_config(&mut self, dlpf_config: u8)
                           -> Result<(), CanonicalError> {
        Self::check_dlpf_config(dlpf_config)?;
        self.update_register(CONFIG, dlpf_config)?;
        self.dlpf_config = dlpf_config;
        Ok(())
    }

    pub fn dlpf_config(&self) -> u8 {
        self.dlpf_config
    }

    /// Sensor output rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        // The gyro outputs at 8kHz with the DLPF disabled, 1kHz otherwise.
        let gyro_output_rate =
            if self.dlpf_config == 0 || self.dlpf_config == 7 { 8000 } else { 1000 };
        gyro_output_rate / (1 + self.sample_rate_divider as u32)
    }

    /// Acceleration in g. The z axis is sign-inverted relative to the
    /// sensor's convention.
    pub fn read_acceleration(&mut self) -> Result<Triple, CanonicalError> {
        let raw = self.read_xyz(ACCEL_XOUT_H, ACCEL_YOUT_H, ACCEL_ZOUT_H)?;
        debug!("Raw accel: {}", raw);
        let accel = raw / self.accel_sensitivity;
        Ok(Triple::new(accel.x, accel.y, -accel.z))
    }

    /// Angular velocity in degrees/second, without offset correction.
    pub fn read_angular_velocity(&mut self) -> Result<Triple, CanonicalError> {
        let raw = self.read_xyz(GYRO_XOUT_H, GYRO_YOUT_H, GYRO_ZOUT_H)?;
        debug!("Raw gyro: {}", raw);
        Ok(raw / self.gyro_sensitivity)
    }

    fn read_xyz(&mut self, x_reg: u8, y_reg: u8, z_reg: u8)
                -> Result<Triple, CanonicalError> {
        Ok(Triple::new(self.device.read_signed_word(x_reg)? as f64,
                       self.device.read_signed_word(y_reg)? as f64,
                       self.device.read_signed_word(z_reg)? as f64))
    }

    fn check_dlpf_config(dlpf_config: u8) -> Result<(), CanonicalError> {
        if dlpf_config > 7 {
            return Err(out_of_range_error(
                &format!("DLPF config {} must be in the 0..7 range",
                         dlpf_config)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use canonical_error::CanonicalErrorCode;
    use super::*;
    use crate::sim_bus::SimBus;

    #[test]
    fn test_configuration_sequence() {
        let bus = SimBus::new();
        let config = DriverConfig{sample_rate_divider: 4,
                                  ..Default::default()};
        let mpu = Mpu6050::new(bus.clone(), &config).unwrap();
        assert_eq!(bus.bound(), Some(0x68));
        assert_eq!(bus.writes(),
                   vec![(PWR_MGMT_1, 0x00), (SMPLRT_DIV, 4), (CONFIG, 6),
                        (GYRO_CONFIG, 0x00), (ACCEL_CONFIG, 0x00),
                        (INT_ENABLE, 0x00), (PWR_MGMT_2, 0x00)]);
        assert_eq!(bus.register(PWR_MGMT_1), 0);
        assert_eq!(mpu.sample_rate(), 200);
    }

    #[test]
    fn test_ranges_written() {
        let bus = SimBus::new();
        let config = DriverConfig{gyro_range: GyroRange::Dps2000,
                                  accel_range: AccelRange::G8,
                                  ..Default::default()};
        let mut mpu = Mpu6050::new(bus.clone(), &config).unwrap();
        assert_eq!(bus.register(GYRO_CONFIG), 0x18);
        assert_eq!(bus.register(ACCEL_CONFIG), 0x10);

        bus.set_accel_raw([4096, -2048, 4096]);
        bus.set_gyro_raw([164, -328, 0]);
        let accel = mpu.read_acceleration().unwrap();
        assert_abs_diff_eq!(accel.x, 1.0);
        assert_abs_diff_eq!(accel.y, -0.5);
        assert_abs_diff_eq!(accel.z, -1.0);
        let gyro = mpu.read_angular_velocity().unwrap();
        assert_abs_diff_eq!(gyro.x, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(gyro.y, -20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_default_conversion() {
        let bus = SimBus::new();
        let mut mpu = Mpu6050::new(bus.clone(), &DriverConfig::default()).unwrap();
        bus.set_accel_raw([-16384, 8192, 16384]);
        bus.set_gyro_raw([131, -32768, 32767]);
        assert_eq!(mpu.read_acceleration().unwrap(),
                   Triple::new(-1.0, 0.5, -1.0));
        let gyro = mpu.read_angular_velocity().unwrap();
        assert_abs_diff_eq!(gyro.x, 1.0);
        assert_abs_diff_eq!(gyro.y, -32768.0 / 131.0);
        assert_abs_diff_eq!(gyro.z, 32767.0 / 131.0);
    }

    #[test]
    fn test_read_back_mismatch() {
        let bus = SimBus::new();
        bus.stick_register(ACCEL_CONFIG);
        let config = DriverConfig{accel_range: AccelRange::G4,
                                  ..Default::default()};
        let err = Mpu6050::new(bus.clone(), &config).err().unwrap();
        assert!(err.code == CanonicalErrorCode::FailedPrecondition);
        // Sequence aborted at the failing step.
        assert_eq!(bus.writes().last(), Some(&(ACCEL_CONFIG, 0x08)));
    }

    #[test]
    fn test_sleep_bit_must_clear() {
        let bus = SimBus::new();
        bus.stick_register(PWR_MGMT_1);
        let err = Mpu6050::new(bus.clone(), &DriverConfig::default())
            .err().unwrap();
        assert!(err.code == CanonicalErrorCode::FailedPrecondition);
        assert_eq!(bus.writes().len(), 1);
    }

    #[test]
    fn test_bad_construction_args() {
        let config = DriverConfig{address: 0x78, ..Default::default()};
        let err = Mpu6050::new(SimBus::new(), &config).err().unwrap();
        assert!(err.code == CanonicalErrorCode::InvalidArgument);

        let bus = SimBus::new();
        let config = DriverConfig{dlpf_config: 8, ..Default::default()};
        let err = Mpu6050::new(bus.clone(), &config).err().unwrap();
        assert!(err.code == CanonicalErrorCode::OutOfRange);
        assert!(bus.writes().is_empty());

        let bus = SimBus::new();
        bus.set_fail_reads(true);
        let err = Mpu6050::new(bus, &DriverConfig::default()).err().unwrap();
        assert!(err.code == CanonicalErrorCode::Unavailable);
    }

    #[test]
    fn test_wrong_device() {
        let bus = SimBus::new();
        let mut raw = bus.clone();
        raw.write_register(WHO_AM_I, 0x70).unwrap();
        let err = Mpu6050::new(bus, &DriverConfig::default()).err().unwrap();
        assert!(err.code == CanonicalErrorCode::FailedPrecondition);
    }

    #[test]
    fn test_dlpf_and_sample_rate() {
        let bus = SimBus::new();
        let mut mpu = Mpu6050::new(bus.clone(), &DriverConfig::default()).unwrap();
        assert_eq!(mpu.sample_rate(), 1000);
        mpu.set_dlpf_config(0).unwrap();
        assert_eq!(mpu.sample_rate(), 8000);
        mpu.set_dlpf_config(7).unwrap();
        assert_eq!(mpu.sample_rate(), 8000);
        mpu.set_dlpf_config(3).unwrap();
        assert_eq!(mpu.dlpf_config(), 3);
        assert_eq!(bus.register(CONFIG), 3);
        assert_eq!(mpu.sample_rate(), 1000);

        let err = mpu.set_dlpf_config(8).err().unwrap();
        assert!(err.code == CanonicalErrorCode::OutOfRange);
        assert_eq!(mpu.dlpf_config(), 3);
    }

    #[test]
    fn test_read_failure_propagates() {
        let bus = SimBus::new();
        let mut mpu = Mpu6050::new(bus.clone(), &DriverConfig::default()).unwrap();
        bus.set_fail_reads(true);
        assert!(mpu.read_acceleration().err().unwrap().code ==
                CanonicalErrorCode::Unavailable);
        assert!(mpu.read_angular_velocity().err().unwrap().code ==
                CanonicalErrorCode::Unavailable);
    }

}  // mod tests.
