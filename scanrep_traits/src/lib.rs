//! Hardware seams shared by the sampling layer and the device drivers.
//!
//! Every trait returns `Box<dyn Error + Send + Sync>` at the boundary so that
//! drivers are free to use their own error types; `scanrep_core` maps them
//! back to typed errors.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Absolute rotary angle sensor (12-bit, one revolution = 4096 ticks).
pub trait AngleSensor {
    /// Single blocking query for the raw angle in `[0, 4095]`.
    fn read_raw_angle(&mut self) -> Result<u16, BoxError>;
}

/// Byte-stream serial link carrying newline-terminated text records.
pub trait SerialLink {
    /// Block until one line is available or the link's own read timeout
    /// expires. An empty string means the read timed out with no data.
    fn read_line(&mut self) -> Result<String, BoxError>;

    /// Drop anything already buffered so the next line is fresh.
    fn discard_pending(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A single digital input pin. `true` is logic high.
pub trait DigitalInput {
    fn is_high(&mut self) -> Result<bool, BoxError>;
}

impl<T: AngleSensor + ?Sized> AngleSensor for Box<T> {
    fn read_raw_angle(&mut self) -> Result<u16, BoxError> {
        (**self).read_raw_angle()
    }
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn read_line(&mut self) -> Result<String, BoxError> {
        (**self).read_line()
    }

    fn discard_pending(&mut self) -> Result<(), BoxError> {
        (**self).discard_pending()
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        (**self).is_high()
    }
}
