use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    /// Bus or serial device unreachable, or it answered with garbage.
    #[error("transport error: {0}")]
    Transport(String),
    /// A record arrived but a field could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
    /// The request is not valid in the current session state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ScanError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

impl From<csv::Error> for ScanError {
    fn from(e: csv::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
