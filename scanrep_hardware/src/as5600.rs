//! AS5600 magnetic rotary encoder over I2C.
use rppal::i2c::I2c;
use scanrep_traits::{AngleSensor, BoxError};
use tracing::trace;

use crate::error::{HwError, Result};

pub const DEFAULT_ADDRESS: u16 = 0x36;
const REG_RAW_ANGLE: u8 = 0x0C;
const REG_MAGNITUDE: u8 = 0x1B;
const TWELVE_BITS: u16 = 0x0FFF;

pub struct As5600 {
    bus: I2c,
}

impl As5600 {
    pub fn new(bus: u8, address: u16) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::Bus(format!("open i2c-{bus}: {e}")))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::Bus(format!("address {address:#04x}: {e}")))?;
        Ok(Self { bus: i2c })
    }

    fn read_register(&self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.bus
            .write_read(&[reg], &mut buf)
            .map_err(|e| HwError::Bus(format!("read register {reg:#04x}: {e}")))?;
        Ok(u16::from_be_bytes(buf) & TWELVE_BITS)
    }

    /// Magnet field strength (AGC-corrected), useful for checking magnet placement.
    pub fn read_magnitude(&self) -> Result<u16> {
        self.read_register(REG_MAGNITUDE)
    }
}

impl AngleSensor for As5600 {
    fn read_raw_angle(&mut self) -> std::result::Result<u16, BoxError> {
        let raw = self.read_register(REG_RAW_ANGLE)?;
        trace!(raw, "as5600 raw angle");
        Ok(raw)
    }
}
