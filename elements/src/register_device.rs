// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fmt::Debug;

use canonical_error::{CanonicalError,
                      invalid_argument_error, out_of_range_error,
                      unavailable_error};
use log::debug;

/// The byte-level transport underneath a RegisterDevice. Implementations
/// perform exactly one bus transaction per call and do not retry.
pub trait RegisterBus {
    type Error: Debug;

    /// Directs subsequent transactions to the device at `address`.
    fn bind(&mut self, address: u16) -> Result<(), Self::Error>;

    /// Writes a single byte to the device, without a register offset.
    fn write_byte(&mut self, value: u8) -> Result<(), Self::Error>;

    /// Writes `value` to register `reg`.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;

    /// Reads the content of register `reg`.
    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error>;
}

// A seven bit wide address space allows 128 addresses, but 0x00..=0x02 and
// 0x78..=0x7F are reserved by the I2C specification.
pub const MIN_DEVICE_ADDRESS: u16 = 0x03;
pub const MAX_DEVICE_ADDRESS: u16 = 0x77;

/// Validated, typed access to the registers of a single bus device. Knows
/// nothing about what the registers mean.
pub struct RegisterDevice<B: RegisterBus> {
    bus: B,
    address: u16,
}

impl<B: RegisterBus> RegisterDevice<B> {
    /// Binds `bus` to the device at `address`. Fails with an invalid argument
    /// error if `address` is outside the usable 7-bit address window.
    pub fn new(mut bus: B, address: u16) -> Result<Self, CanonicalError> {
        if !(MIN_DEVICE_ADDRESS..=MAX_DEVICE_ADDRESS).contains(&address) {
            return Err(invalid_argument_error(
                &format!("Invalid device address 0x{:02X}; must be in \
                          0x{:02X}..=0x{:02X}",
                         address, MIN_DEVICE_ADDRESS, MAX_DEVICE_ADDRESS)));
        }
        bus.bind(address).map_err(|e| unavailable_error(
            &format!("Failed to bind device address 0x{:02X}: {:?}",
                     address, e)))?;
        debug!("Bound register device at 0x{:02X}", address);
        Ok(RegisterDevice{bus, address})
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// Writes `value` directly to the device (no register offset).
    pub fn write_byte(&mut self, value: i32) -> Result<(), CanonicalError> {
        let byte = Self::checked_byte(value)?;
        self.bus.write_byte(byte).map_err(|e| unavailable_error(
            &format!("Failed to write 0x{:02X} to device 0x{:02X}: {:?}",
                     byte, self.address, e)))
    }

    /// Writes `value` to register `reg`.
    pub fn write_register(&mut self, reg: u8, value: i32)
                          -> Result<(), CanonicalError> {
        let byte = Self::checked_byte(value)?;
        self.bus.write_register(reg, byte).map_err(|e| unavailable_error(
            &format!("Failed to write 0x{:02X} to register 0x{:02X}: {:?}",
                     byte, reg, e)))
    }

    /// Returns the register content in 0..=255.
    pub fn read_unsigned_register(&mut self, reg: u8)
                                  -> Result<u8, CanonicalError> {
        self.bus.read_register(reg).map_err(|e| unavailable_error(
            &format!("Failed to read register 0x{:02X}: {:?}", reg, e)))
    }

    /// Returns the register content as a two's complement value in
    /// -128..=127.
    pub fn read_signed_register(&mut self, reg: u8)
                                -> Result<i8, CanonicalError> {
        Ok(self.read_unsigned_register(reg)? as i8)
    }

    /// Reads `reg` (high byte) then `reg + 1` (low byte) and returns their
    /// big-endian unsigned combination.
    pub fn read_unsigned_word(&mut self, reg: u8)
                              -> Result<u16, CanonicalError> {
        let low_reg = Self::low_register(reg)?;
        let high = self.read_unsigned_register(reg)?;
        let low = self.read_unsigned_register(low_reg)?;
        Ok(((high as u16) << 8) | low as u16)
    }

    /// Reads `reg` (high byte) then `reg + 1` (low byte) and interprets the
    /// combination as a full 16-bit two's complement word.
    pub fn read_signed_word(&mut self, reg: u8) -> Result<i16, CanonicalError> {
        let low_reg = Self::low_register(reg)?;
        let high = self.read_unsigned_register(reg)?;
        let low = self.read_unsigned_register(low_reg)?;
        Ok(word_from_bytes(high, low))
    }

    /// Returns the transport, consuming the device.
    pub fn free(self) -> B {
        self.bus
    }

    fn checked_byte(value: i32) -> Result<u8, CanonicalError> {
        u8::try_from(value).map_err(|_| out_of_range_error(
            &format!("Value {} must be in the [0;255] interval", value)))
    }

    fn low_register(reg: u8) -> Result<u8, CanonicalError> {
        reg.checked_add(1).ok_or_else(|| invalid_argument_error(
            &format!("Register 0x{:02X} has no following register", reg)))
    }
}

/// Combines a high and low register byte into a signed 16-bit word: the
/// unsigned big-endian value, minus 0x10000 when it is 0x8000 or above.
pub fn word_from_bytes(high: u8, low: u8) -> i16 {
    let value = ((high as i32) << 8) + low as i32;
    if value >= 0x8000 {
        (value - 0x10000) as i16
    } else {
        value as i16
    }
}

// mod tests.
