//! The mini-header: the uniform record boundary used after the handshake.

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Result, WireError};

/// Six-byte `{type, size}` record header.
///
/// After link negotiation every record on every channel is one of these
/// followed by exactly `size` payload bytes. The type space below
/// [`crate::channel::msg::BASE_LAST`] is shared by all channels; higher
/// values are channel-specific.
///
/// # Invariants
///
/// - `SIZE` equals the wire size (6 bytes, no padding).
/// - `size` bounds the payload; readers must never consume more.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MiniHeader {
    ty: U16,
    size: U32,
}

impl MiniHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 6;

    /// Create a header for an outbound record.
    #[must_use]
    pub fn new(ty: u16, size: u32) -> Self {
        Self { ty: U16::new(ty), size: U32::new(size) }
    }

    /// Parse a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| WireError::TooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Record type.
    #[must_use]
    pub fn ty(&self) -> u16 {
        self.ty.get()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.get()
    }

    /// Serialized form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}
