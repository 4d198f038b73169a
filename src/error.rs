use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum SubdictError {
    CorruptDictionary(String),
    InvalidTimestamp(String),
    RowNumberMismatch { key: u32, number: String },
    RowNumberOutOfRange(u32),
    IndexExhausted,
}

impl Error for SubdictError {}

impl fmt::Display for SubdictError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubdictError::CorruptDictionary(msg) => write!(fmt, "Corrupt dictionary: {}", msg),
            SubdictError::InvalidTimestamp(ts) => write!(fmt, "Invalid timestamp: '{}'", ts),
            SubdictError::RowNumberMismatch { key, number } => write!(
                fmt,
                "Row stored under index {} carries number '{}'",
                key, number
            ),
            SubdictError::RowNumberOutOfRange(number) => {
                write!(fmt, "Row number {} is outside 1..{}", number, u32::MAX)
            }
            SubdictError::IndexExhausted => write!(fmt, "No row numbers left to assign"),
        }
    }
}
