use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c bus error: {0}")]
    Bus(String),
    #[error("serial error: {0}")]
    Serial(String),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("device timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
