// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

// In-memory stand-in for an MPU-6050 on an I2C bus. Clones share the same
// register file, so a test can keep a handle after moving one into a driver.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use cubli_elements::register_device::RegisterBus;

use crate::mpu6050::{ACCEL_XOUT_H, GYRO_XOUT_H, PWR_MGMT_1, WHO_AM_I};

pub struct SimRegisters {
    pub registers: [u8; 256],
    pub bound: Option<u16>,
    pub writes: Vec<(u8, u8)>,
    // Registers that ignore writes.
    pub stuck: HashSet<u8>,
    pub fail_reads: bool,
    pub read_count: usize,
    // Raw gyro samples served one per GYRO_XOUT_H read, before falling back
    // to the register content.
    pub gyro_script: VecDeque<[i16; 3]>,
}

#[derive(Clone)]
pub struct SimBus {
    inner: Arc<Mutex<SimRegisters>>,
}

impl SimBus {
    // Power-on register state: asleep, identity register set.
    pub fn new() -> Self {
        let mut registers = [0u8; 256];
        registers[WHO_AM_I as usize] = 0x68;
        registers[PWR_MGMT_1 as usize] = 0x40;
        SimBus{inner: Arc::new(Mutex::new(SimRegisters{
            registers,
            bound: None,
            writes: Vec::new(),
            stuck: HashSet::new(),
            fail_reads: false,
            read_count: 0,
            gyro_script: VecDeque::new(),
        }))}
    }

    // Device lying flat in the orientation the angle math calls level, at
    // rest apart from a constant gyro bias.
    pub fn level_and_still(gyro_bias: [i16; 3]) -> Self {
        let bus = SimBus::new();
        bus.set_accel_raw([0, 0, -16384]);
        bus.set_gyro_raw(gyro_bias);
        bus
    }

    pub fn set_accel_raw(&self, values: [i16; 3]) {
        Self::store_xyz(&mut self.inner.lock().unwrap(), ACCEL_XOUT_H, values);
    }

    pub fn set_gyro_raw(&self, values: [i16; 3]) {
        Self::store_xyz(&mut self.inner.lock().unwrap(), GYRO_XOUT_H, values);
    }

    pub fn script_gyro(&self, samples: &[[i16; 3]]) {
        self.inner.lock().unwrap().gyro_script.extend(samples.iter().copied());
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    pub fn stick_register(&self, reg: u8) {
        self.inner.lock().unwrap().stuck.insert(reg);
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.inner.lock().unwrap().registers[reg as usize]
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn bound(&self) -> Option<u16> {
        self.inner.lock().unwrap().bound
    }

    pub fn read_count(&self) -> usize {
        self.inner.lock().unwrap().read_count
    }

    fn store_xyz(sim: &mut SimRegisters, start: u8, values: [i16; 3]) {
        for (axis, value) in values.iter().enumerate() {
            let [high, low] = value.to_be_bytes();
            let reg = start as usize + 2 * axis;
            sim.registers[reg] = high;
            sim.registers[reg + 1] = low;
        }
    }
}

impl RegisterBus for SimBus {
    type Error = String;

    fn bind(&mut self, address: u16) -> Result<(), String> {
        self.inner.lock().unwrap().bound = Some(address);
        Ok(())
    }

    fn write_byte(&mut self, _value: u8) -> Result<(), String> {
        Ok(())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), String> {
        let mut sim = self.inner.lock().unwrap();
        sim.writes.push((reg, value));
        if !sim.stuck.contains(&reg) {
            sim.registers[reg as usize] = value;
        }
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, String> {
        let mut sim = self.inner.lock().unwrap();
        if sim.fail_reads {
            return Err(format!("Remote I/O error reading 0x{:02X}", reg));
        }
        sim.read_count += 1;
        if reg == GYRO_XOUT_H {
            if let Some(sample) = sim.gyro_script.pop_front() {
                Self::store_xyz(&mut sim, GYRO_XOUT_H, sample);
            }
        }
        Ok(sim.registers[reg as usize])
    }
}
