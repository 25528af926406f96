//! Push button on a GPIO pin with the internal pull-up enabled.
use rppal::gpio::{Gpio, InputPin};
use scanrep_traits::{BoxError, DigitalInput};

use crate::error::{HwError, Result};

pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    /// `pin` is a BCM GPIO number.
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
            .into_input_pullup();
        Ok(Self { pin })
    }
}

impl DigitalInput for GpioButton {
    fn is_high(&mut self) -> std::result::Result<bool, BoxError> {
        Ok(self.pin.is_high())
    }
}
