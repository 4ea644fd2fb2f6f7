//! VD_AGENT framing: the guest-agent side-protocol tunnelled inside MAIN
//! `AGENT_DATA` records.
//!
//! Every agent message begins with an [`AgentMessage`] header whose `size`
//! covers the whole logical message; the bytes may then span as many
//! `AGENT_DATA` records as needed, each at most [`MAX_DATA_SIZE`] long.

use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Result, WireError};

/// Agent protocol version this client speaks.
pub const PROTOCOL: u32 = 1;

/// Maximum payload bytes per tunnelled `AGENT_DATA` record.
pub const MAX_DATA_SIZE: usize = 2048;

/// Agent message types.
pub mod msg {
    /// Clipboard payload transfer.
    pub const CLIPBOARD: u32 = 4;
    /// Capability exchange.
    pub const ANNOUNCE_CAPABILITIES: u32 = 6;
    /// The peer took clipboard ownership.
    pub const CLIPBOARD_GRAB: u32 = 7;
    /// The peer wants the clipboard contents.
    pub const CLIPBOARD_REQUEST: u32 = 8;
    /// The peer dropped clipboard ownership.
    pub const CLIPBOARD_RELEASE: u32 = 9;
}

/// Agent capability bit indices.
pub mod cap {
    /// Clipboard transfers happen on demand.
    pub const CLIPBOARD_BY_DEMAND: u32 = 5;
    /// Clipboard messages carry a selection header.
    pub const CLIPBOARD_SELECTION: u32 = 6;
}

/// Words in an announced capability set.
pub const CAPS_WORDS: usize = 1;

/// Clipboard data type codes.
pub mod clipboard {
    /// No usable data.
    pub const NONE: u32 = 0;
    /// UTF-8 text.
    pub const UTF8_TEXT: u32 = 1;
    /// PNG image.
    pub const IMAGE_PNG: u32 = 2;
    /// BMP image.
    pub const IMAGE_BMP: u32 = 3;
    /// TIFF image.
    pub const IMAGE_TIFF: u32 = 4;
    /// JPEG image.
    pub const IMAGE_JPG: u32 = 5;

    /// The primary clipboard selection.
    pub const SELECTION_CLIPBOARD: u8 = 0;
}

/// Size of the selection header prefixed to clipboard messages when the
/// selection capability is negotiated: one selection byte plus three
/// reserved bytes.
pub const SELECTION_SIZE: usize = 4;

/// Outer header of every agent message.
///
/// # Invariants
///
/// - `size` counts the logical message body, not the record that carries
///   it; a body larger than [`MAX_DATA_SIZE`] continues in subsequent
///   records with no further header.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AgentMessage {
    protocol: U32,
    ty: U32,
    opaque: U64,
    size: U32,
}

impl AgentMessage {
    /// Wire size of the header.
    pub const SIZE: usize = 20;

    /// Header for an outbound message of `size` body bytes.
    #[must_use]
    pub fn new(ty: u32, size: u32) -> Self {
        Self { protocol: U32::new(PROTOCOL), ty: U32::new(ty), opaque: U64::new(0), size: U32::new(size) }
    }

    /// Parse a header from the front of a record payload.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(msg, _)| msg)
            .map_err(|_| WireError::TooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Announced protocol version.
    #[must_use]
    pub fn protocol(&self) -> u32 {
        self.protocol.get()
    }

    /// Message type ([`msg`]).
    #[must_use]
    pub fn ty(&self) -> u32 {
        self.ty.get()
    }

    /// Logical body size.
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

/// Capability words carried by an ANNOUNCE_CAPABILITIES body, derived
/// from the outer message size (the body is a `u32` request flag plus the
/// capability words).
#[must_use]
pub fn caps_words_from_msg_size(msg_size: u32) -> usize {
    (msg_size as usize).saturating_sub(4) / 4
}

/// Query a capability bit within announced words.
#[must_use]
pub fn has_capability(words: &[u32], index: u32) -> bool {
    words
        .get(index as usize / 32)
        .is_some_and(|w| w & (1 << (index % 32)) != 0)
}

#[cfg(test)]
mod tests {
    use super::{AgentMessage, PROTOCOL, caps_words_from_msg_size, has_capability, msg};

    #[test]
    fn header_size() {
        assert_eq!(core::mem::size_of::<AgentMessage>(), AgentMessage::SIZE);
    }

    #[test]
    fn roundtrip() {
        let header = AgentMessage::new(msg::CLIPBOARD, 1000);
        let parsed = AgentMessage::parse(&header.to_bytes());
        assert_eq!(parsed, Ok(header));
        assert_eq!(header.protocol(), PROTOCOL);
        assert_eq!(header.ty(), msg::CLIPBOARD);
        assert_eq!(header.size(), 1000);
    }

    #[test]
    fn caps_sizing() {
        assert_eq!(caps_words_from_msg_size(8), 1);
        assert_eq!(caps_words_from_msg_size(4), 0);
        assert_eq!(caps_words_from_msg_size(0), 0);
    }

    #[test]
    fn capability_query_is_bounded() {
        let words = [1 << 5 | 1 << 6];
        assert!(has_capability(&words, super::cap::CLIPBOARD_BY_DEMAND));
        assert!(has_capability(&words, super::cap::CLIPBOARD_SELECTION));
        assert!(!has_capability(&words, 7));
        assert!(!has_capability(&words, 40));
    }
}
