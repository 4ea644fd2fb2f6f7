//! Link-phase packets: the fixed pre-auth handshake every channel performs.
//!
//! The sequence is always the same: the client sends a [`LinkHeader`] +
//! [`LinkMess`] + two capability bitmaps, the server answers with a
//! [`LinkHeader`] + [`LinkReply`] + two bitmaps, the client selects the
//! ticket mechanism and sends the RSA-encrypted password, and the server
//! closes the phase with a 4-byte result code.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::caps::CapsBitmap;
use crate::{Result, WireError};

/// Protocol magic, `REDQ` on the wire.
pub const MAGIC: [u8; 4] = *b"REDQ";

/// Protocol major version spoken by this implementation.
pub const VERSION_MAJOR: u32 = 2;

/// Protocol minor version spoken by this implementation.
pub const VERSION_MINOR: u32 = 2;

/// Size of the DER-encoded RSA public key carried in [`LinkReply`].
pub const PUBKEY_BYTES: usize = 162;

/// Link result codes returned in [`LinkReply::error`] and the final
/// 4-byte auth result.
pub mod err {
    /// Success.
    pub const OK: u32 = 0;
    /// Unspecified failure.
    pub const ERROR: u32 = 1;
    /// The client's magic was rejected.
    pub const INVALID_MAGIC: u32 = 2;
    /// Malformed link data.
    pub const INVALID_DATA: u32 = 3;
    /// Incompatible protocol versions.
    pub const VERSION_MISMATCH: u32 = 4;
    /// The server requires a secured channel.
    pub const NEED_SECURED: u32 = 5;
    /// The server requires an unsecured channel.
    pub const NEED_UNSECURED: u32 = 6;
    /// Authentication failed.
    pub const PERMISSION_DENIED: u32 = 7;
    /// The session id was not recognised.
    pub const BAD_CONNECTION_ID: u32 = 8;
    /// The requested channel is not available.
    pub const CHANNEL_NOT_AVAILABLE: u32 = 9;
}

/// Outer header of every link-phase packet in both directions.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LinkHeader {
    magic: [u8; 4],
    major_version: U32,
    minor_version: U32,
    size: U32,
}

impl LinkHeader {
    /// Wire size of the header.
    pub const SIZE: usize = 16;

    /// Header announcing `size` body bytes, stamped with our magic and
    /// version.
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            magic: MAGIC,
            major_version: U32::new(VERSION_MAJOR),
            minor_version: U32::new(VERSION_MINOR),
            size: U32::new(size),
        }
    }

    /// Parse and validate a server header: the magic must match and the
    /// major version must be ours.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (header, _) = Self::read_from_prefix(bytes)
            .map_err(|_| WireError::TooShort { expected: Self::SIZE, actual: bytes.len() })?;

        if header.magic != MAGIC {
            return Err(WireError::InvalidMagic);
        }
        if header.major_version.get() != VERSION_MAJOR {
            return Err(WireError::VersionMismatch(header.major_version.get()));
        }

        Ok(header)
    }

    /// Body length that follows this header.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.get()
    }

    /// Minor version announced by the peer.
    #[must_use]
    pub fn minor_version(&self) -> u32 {
        self.minor_version.get()
    }

    /// Serialized form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

/// The client half of the link exchange.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LinkMess {
    connection_id: U32,
    channel_type: u8,
    channel_id: u8,
    num_common_caps: U32,
    num_channel_caps: U32,
    caps_offset: U32,
}

impl LinkMess {
    /// Wire size of the message.
    pub const SIZE: usize = 18;

    /// Build the client link message. The capability words follow
    /// immediately, so `caps_offset` is always [`Self::SIZE`].
    #[must_use]
    pub fn new(
        connection_id: u32,
        channel_type: u8,
        channel_id: u8,
        num_common_caps: u32,
        num_channel_caps: u32,
    ) -> Self {
        Self {
            connection_id: U32::new(connection_id),
            channel_type,
            channel_id,
            num_common_caps: U32::new(num_common_caps),
            num_channel_caps: U32::new(num_channel_caps),
            caps_offset: U32::new(Self::SIZE as u32),
        }
    }
}

/// The server half of the link exchange.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LinkReply {
    error: U32,
    pub_key: [u8; PUBKEY_BYTES],
    num_common_caps: U32,
    num_channel_caps: U32,
    caps_offset: U32,
}

impl LinkReply {
    /// Wire size of the fixed part of the reply.
    pub const SIZE: usize = 178;

    /// Parse the fixed part of a reply body.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(reply, _)| reply)
            .map_err(|_| WireError::TooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Link error code; anything but [`err::OK`] aborts the channel.
    #[must_use]
    pub fn error(&self) -> u32 {
        self.error.get()
    }

    /// DER-encoded RSA public key for ticket encryption.
    #[must_use]
    pub fn pub_key(&self) -> &[u8; PUBKEY_BYTES] {
        &self.pub_key
    }

    /// Capability bitmaps reflected by the server, read from the reply
    /// body at `caps_offset`. Returns `(common, channel)`.
    pub fn caps(&self, body: &[u8]) -> Result<(CapsBitmap, CapsBitmap)> {
        let offset = self.caps_offset.get() as usize;
        let common_words = self.num_common_caps.get() as usize;
        let channel_words = self.num_channel_caps.get() as usize;

        let caps_bytes = body
            .get(offset..)
            .ok_or(WireError::BadOffset { offset: offset as u32, len: body.len() })?;

        let common = CapsBitmap::parse(caps_bytes, common_words)?;
        let channel = CapsBitmap::parse(&caps_bytes[common_words * 4..], channel_words)?;
        Ok((common, channel))
    }
}

/// The auth mechanism selection sent after the reply.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LinkAuthMechanism {
    auth_mechanism: U32,
}

impl LinkAuthMechanism {
    /// Wire size of the selection.
    pub const SIZE: usize = 4;

    /// Select the SPICE ticket scheme.
    #[must_use]
    pub fn spice() -> Self {
        Self { auth_mechanism: U32::new(crate::caps::common::AUTH_SPICE) }
    }

    /// Serialized form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}
