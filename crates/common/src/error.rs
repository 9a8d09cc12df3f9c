//! Decode errors for OPL values and type codes.

use thiserror::Error;

/// Errors that occur while decoding value-level data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Type code outside the range 0-4.
    #[error("invalid value type code: {0:#04x}")]
    InvalidValueType(u8),

    /// String does not fit behind a single length byte.
    #[error("string of {0} bytes exceeds the 255 byte limit")]
    StringTooLong(usize),
}
