//! SparkFun OpenScale board streaming records over a USB serial adapter.
//!
//! The board is configured for continuous output, one record roughly every
//! 50 ms: `timestamp,value,unit,`.
use rppal::uart::{Parity, Queue, Uart};
use scanrep_traits::{BoxError, SerialLink};
use std::time::Duration;

use crate::error::{HwError, Result};
use crate::util::LineFramer;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;

pub struct OpenScale {
    uart: Uart,
    framer: LineFramer,
}

impl OpenScale {
    pub fn new(port: &str, baud: u32, read_timeout: Duration) -> Result<Self> {
        let mut uart = Uart::with_path(port, baud, Parity::None, 8, 1)
            .map_err(|e| HwError::Serial(format!("open {port}: {e}")))?;
        uart.set_read_mode(0, read_timeout)
            .map_err(|e| HwError::Serial(format!("read mode: {e}")))?;
        Ok(Self {
            uart,
            framer: LineFramer::new(),
        })
    }
}

impl SerialLink for OpenScale {
    fn read_line(&mut self) -> std::result::Result<String, BoxError> {
        let mut buf = [0u8; 64];
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(line);
            }
            let n = self
                .uart
                .read(&mut buf)
                .map_err(|e| HwError::Serial(format!("read: {e}")))?;
            if n == 0 {
                // Read timeout with nothing pending.
                return Ok(String::new());
            }
            self.framer.push(&buf[..n]);
        }
    }

    fn discard_pending(&mut self) -> std::result::Result<(), BoxError> {
        self.framer.clear();
        self.uart
            .flush(Queue::Input)
            .map_err(|e| HwError::Serial(format!("flush: {e}")))?;
        Ok(())
    }
}
