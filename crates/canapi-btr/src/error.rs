//! Bit-timing error types.

use thiserror::Error;

/// Reasons a bit-rate setting is rejected.
///
/// Every variant is an "invalid baudrate" condition; the variants only say
/// which rule was broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BtrError {
    #[error("unknown bit-rate index {0}")]
    UnknownIndex(i32),

    #[error("no predefined bit-rate for {0} (kbit/s or bit/s)")]
    UnknownSpeed(u32),

    #[error("{field}={value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("SJA1000 timing needs an 8 MHz clock, got {0} Hz")]
    UnsupportedClock(u32),

    #[error("unknown bit-rate key `{0}`")]
    UnknownKey(String),

    #[error("missing bit-rate key `{0}`")]
    MissingKey(&'static str),

    #[error("malformed bit-rate string: {0}")]
    Malformed(String),

    #[error("a bit-rate index cannot be used in CAN FD mode")]
    IndexInFdMode,
}

/// Convenience alias for bit-timing results.
pub type BtrResult<T> = Result<T, BtrError>;
