//! Wire-level error types.

use thiserror::Error;

/// Errors produced while parsing or building wire data.
///
/// These are pure data errors: no I/O ever happens in this crate. The
/// client maps them onto its own protocol-error kind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before a fixed-size structure could be read.
    #[error("buffer too short: need {expected} bytes, have {actual}")]
    TooShort {
        /// Bytes required by the structure.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The link header did not start with the protocol magic.
    #[error("invalid protocol magic")]
    InvalidMagic,

    /// The peer speaks an incompatible major protocol version.
    #[error("unsupported protocol major version {0}")]
    VersionMismatch(u32),

    /// An offset-relative pointer fell outside its payload buffer.
    #[error("offset {offset} out of bounds for {len}-byte payload")]
    BadOffset {
        /// The offending byte offset.
        offset: u32,
        /// Length of the payload it must fall within.
        len: usize,
    },

    /// A variable-length structure claimed more data than the buffer holds.
    #[error("truncated {0}")]
    Truncated(&'static str),
}

/// Convenience alias used throughout the wire layer.
pub type Result<T> = core::result::Result<T, WireError>;
