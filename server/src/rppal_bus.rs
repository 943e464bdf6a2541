// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::{CanonicalError, unavailable_error};
use rppal::i2c::{Error, I2c};

use cubli_elements::register_device::RegisterBus;

/// Linux I2C bus (/dev/i2c-N) as seen through rppal.
pub struct RppalBus {
    i2c: I2c,
}

impl RppalBus {
    pub fn new(bus: u8) -> Result<Self, CanonicalError> {
        let i2c = I2c::with_bus(bus)
            .map_err(|e| unavailable_error(
                &format!("Failed to initialize I2C bus {}: {:?}", bus, e)))?;
        Ok(RppalBus{i2c})
    }
}

impl RegisterBus for RppalBus {
    type Error = Error;

    fn bind(&mut self, address: u16) -> Result<(), Error> {
        self.i2c.set_slave_address(address)
    }

    fn write_byte(&mut self, value: u8) -> Result<(), Error> {
        self.i2c.write(&[value])?;
        Ok(())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        self.i2c.write(&[reg, value])?;
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, Error> {
        let mut buffer = [0u8; 1];
        self.i2c.write_read(&[reg], &mut buffer)?;
        Ok(buffer[0])
    }
}
