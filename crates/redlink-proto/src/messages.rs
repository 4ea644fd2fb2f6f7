//! Packed message bodies for the five channels and the shared base range.
//!
//! Fixed-size bodies are zerocopy structs parsed straight off the payload
//! buffer; variable-size bodies get a small parse helper that returns the
//! fixed head plus the trailing bytes.

use zerocopy::byteorder::little_endian::{I32, I64, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Result, WireError};

fn read_prefix<T: FromBytes + KnownLayout + Copy>(bytes: &[u8]) -> Result<T> {
    T::read_from_prefix(bytes)
        .map(|(v, _)| v)
        .map_err(|_| WireError::TooShort { expected: core::mem::size_of::<T>(), actual: bytes.len() })
}

/// Session parameters delivered by the required first MAIN message.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MainInit {
    /// Session id to present on every further channel connect.
    pub session_id: U32,
    /// Hint for the number of display channels.
    pub display_channels_hint: U32,
    /// Bitmask of mouse modes the server supports.
    pub supported_mouse_modes: U32,
    /// Currently active mouse mode.
    pub current_mouse_mode: U32,
    /// Non-zero when the guest agent is attached.
    pub agent_connected: U32,
    /// Initial agent flow-control token grant.
    pub agent_tokens: U32,
    /// Multimedia clock.
    pub multi_media_time: U32,
    /// Server RAM hint.
    pub ram_hint: U32,
}

impl MainInit {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// One entry of the MAIN channels list.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ChannelEntry {
    /// Wire channel type ([`crate::channel::channel_type`]).
    pub ty: u8,
    /// Channel instance id.
    pub channel_id: u8,
}

/// Parse a CHANNELS_LIST payload: `u32` count then that many entries.
pub fn parse_channels_list(bytes: &[u8]) -> Result<Vec<ChannelEntry>> {
    let count = read_prefix::<U32>(bytes)?.get() as usize;
    let entries = &bytes[4..];
    if entries.len() < count * 2 {
        return Err(WireError::Truncated("channels list"));
    }
    Ok((0..count)
        .filter_map(|i| ChannelEntry::read_from_prefix(&entries[i * 2..]).ok().map(|(e, _)| e))
        .collect())
}

/// Parse a MAIN NAME payload: `u32` length then the name bytes. A
/// trailing NUL, if the guest sent one, is stripped.
pub fn parse_main_name(bytes: &[u8]) -> Result<&[u8]> {
    let len = read_prefix::<U32>(bytes)?.get() as usize;
    let name = bytes.get(4..4 + len).ok_or(WireError::Truncated("guest name"))?;
    Ok(name.strip_suffix(&[0]).unwrap_or(name))
}

/// Guest UUID body.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MainUuid {
    /// 128-bit guest UUID.
    pub uuid: [u8; 16],
}

impl MainUuid {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// Server-dictated ACK window.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SetAck {
    /// Generation echoed back in ACK_SYNC.
    pub generation: U32,
    /// Records between client ACKs; zero disables ACKs.
    pub window: U32,
}

impl SetAck {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// ACK_SYNC answer to SET_ACK.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AckSync {
    /// Echoed generation.
    pub generation: U32,
}

impl AckSync {
    /// Build the answer for a given generation.
    #[must_use]
    pub fn new(generation: u32) -> Self {
        Self { generation: U32::new(generation) }
    }
}

/// Latency probe; PONG echoes both fields.
///
/// A PING may carry trailing padding bytes after these fields; they are
/// consumed by the framing and never echoed.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Ping {
    /// Probe id.
    pub id: U32,
    /// Server timestamp.
    pub timestamp: U64,
}

impl Ping {
    /// Parse the fixed head of a PING payload.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// PONG shares the PING layout.
pub type Pong = Ping;

/// Fixed head of a NOTIFY message.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Notify {
    /// Server timestamp.
    pub time_stamp: U64,
    /// Severity level.
    pub severity: U32,
    /// Visibility hint.
    pub visibility: U32,
    /// Message code.
    pub what: U32,
    /// Length of the trailing text.
    pub message_len: U32,
}

/// Parse a NOTIFY payload into its head and text bytes.
pub fn parse_notify(bytes: &[u8]) -> Result<(Notify, &[u8])> {
    let head = read_prefix::<Notify>(bytes)?;
    let len = head.message_len.get() as usize;
    let text = bytes
        .get(core::mem::size_of::<Notify>()..core::mem::size_of::<Notify>() + len)
        .ok_or(WireError::Truncated("notify text"))?;
    Ok((head, text))
}

/// Farewell record sent before closing a channel.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Disconnecting {
    /// Client timestamp in milliseconds.
    pub time_stamp: U64,
    /// Reason code ([`crate::link::err`]).
    pub reason: U32,
}

impl Disconnecting {
    /// Build a farewell with the given timestamp and reason.
    #[must_use]
    pub fn new(time_stamp: u64, reason: u32) -> Self {
        Self { time_stamp: U64::new(time_stamp), reason: U32::new(reason) }
    }
}

/// Mouse mode request sent on MAIN.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MouseModeRequest {
    /// Requested mode ([`crate::channel::mouse`]).
    pub mouse_mode: U16,
}

impl MouseModeRequest {
    /// Build a request for the given mode.
    #[must_use]
    pub fn new(mouse_mode: u16) -> Self {
        Self { mouse_mode: U16::new(mouse_mode) }
    }
}

/// Modifier state, shared by INPUTS_INIT, KEY_MODIFIERS and the client
/// submission.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct KeyModifiers {
    /// Lock-key bitmask.
    pub modifiers: U16,
}

impl KeyModifiers {
    /// Build a modifier submission.
    #[must_use]
    pub fn new(modifiers: u16) -> Self {
        Self { modifiers: U16::new(modifiers) }
    }

    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// Key press or release; the code carries the 0xE0 prefix encoding for
/// extended scancodes.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct KeyCode {
    /// Encoded scancode.
    pub code: U32,
}

impl KeyCode {
    /// Wrap an encoded scancode.
    #[must_use]
    pub fn new(code: u32) -> Self {
        Self { code: U32::new(code) }
    }
}

/// Absolute mouse position.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MousePosition {
    /// X coordinate.
    pub x: U32,
    /// Y coordinate.
    pub y: U32,
    /// Buttons currently held.
    pub button_state: U16,
    /// Target display.
    pub display_id: u8,
}

/// Relative mouse motion, each axis clamped to ±127 by the submitter.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MouseMotion {
    /// X delta.
    pub x: I32,
    /// Y delta.
    pub y: I32,
    /// Buttons currently held.
    pub button_state: U16,
}

impl MouseMotion {
    /// Wire size of one motion record body.
    pub const SIZE: usize = 10;
}

/// Button press or release.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MouseButton {
    /// Button number ([`crate::channel::mouse`]).
    pub button: u8,
    /// Buttons held after this event.
    pub button_state: U16,
}

/// Playback stream parameters.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PlaybackStart {
    /// Channel count.
    pub channels: U32,
    /// Sample format ([`crate::channel::audio`]).
    pub format: U16,
    /// Sample rate in Hz.
    pub frequency: U32,
    /// Stream start time.
    pub time: U32,
}

impl PlaybackStart {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// Record stream parameters.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RecordStart {
    /// Channel count.
    pub channels: U32,
    /// Sample format ([`crate::channel::audio`]).
    pub format: U16,
    /// Sample rate in Hz.
    pub frequency: U32,
}

impl RecordStart {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// Head of an audio data record in either direction; samples follow.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AudioPacket {
    /// Stream time of the first sample.
    pub time: U32,
}

impl AudioPacket {
    /// Wire size of the head.
    pub const SIZE: usize = 4;

    /// Build a head for outbound captured audio.
    #[must_use]
    pub fn new(time: u32) -> Self {
        Self { time: U32::new(time) }
    }

    /// Split an inbound record into its head and sample bytes.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let head = read_prefix::<Self>(bytes)?;
        Ok((head, &bytes[Self::SIZE..]))
    }
}

/// Parse an audio VOLUME payload: `u8` channel count then one `u16` per
/// channel.
pub fn parse_audio_volume(bytes: &[u8]) -> Result<Vec<u16>> {
    let channels = *bytes.first().ok_or(WireError::Truncated("audio volume"))? as usize;
    let body = &bytes[1..];
    if body.len() < channels * 2 {
        return Err(WireError::Truncated("audio volume"));
    }
    Ok(body[..channels * 2]
        .chunks_exact(2)
        .map(|v| u16::from_le_bytes([v[0], v[1]]))
        .collect())
}

/// Audio MUTE body.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AudioMute {
    /// Non-zero to mute.
    pub mute: u8,
}

impl AudioMute {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// DISPLAY_INIT body; this client runs without caches, all zero.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DisplayInit {
    /// Pixmap cache id (unused, zero).
    pub pixmap_cache_id: u8,
    /// Pixmap cache size (unused, zero).
    pub pixmap_cache_size: I64,
    /// GLZ dictionary id (unused, zero).
    pub glz_dictionary_id: u8,
    /// GLZ dictionary window (unused, zero).
    pub glz_dictionary_window_size: U32,
}

/// Image compression preference.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PreferredCompression {
    /// Compression code ([`crate::draw::image::COMPRESSION_OFF`]).
    pub image_compression: u8,
}

impl PreferredCompression {
    /// Request uncompressed bitmaps only.
    #[must_use]
    pub fn off() -> Self {
        Self { image_compression: crate::draw::image::COMPRESSION_OFF }
    }
}

/// Surface creation announcement.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SurfaceCreate {
    /// Surface id.
    pub surface_id: U32,
    /// Width in pixels.
    pub width: U32,
    /// Height in pixels.
    pub height: U32,
    /// Pixel format ([`crate::draw::surface_fmt`]).
    pub format: U32,
    /// Creation flags.
    pub flags: U32,
}

impl SurfaceCreate {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

/// Surface destruction announcement.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SurfaceDestroy {
    /// Surface id.
    pub surface_id: U32,
}

impl SurfaceDestroy {
    /// Parse from a payload buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        read_prefix(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        AudioPacket, ChannelEntry, DisplayInit, MainInit, MouseMotion, MousePosition, Notify,
        Ping, PlaybackStart, RecordStart, parse_audio_volume, parse_channels_list,
        parse_main_name, parse_notify,
    };

    #[test]
    fn struct_sizes_match_wire() {
        assert_eq!(core::mem::size_of::<MainInit>(), 32);
        assert_eq!(core::mem::size_of::<Ping>(), 12);
        assert_eq!(core::mem::size_of::<Notify>(), 24);
        assert_eq!(core::mem::size_of::<MousePosition>(), 11);
        assert_eq!(core::mem::size_of::<MouseMotion>(), MouseMotion::SIZE);
        assert_eq!(core::mem::size_of::<PlaybackStart>(), 14);
        assert_eq!(core::mem::size_of::<RecordStart>(), 10);
        assert_eq!(core::mem::size_of::<DisplayInit>(), 14);
        assert_eq!(core::mem::size_of::<AudioPacket>(), AudioPacket::SIZE);
    }

    #[test]
    fn channels_list_parses_entries() {
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[1, 0, 3, 0]);
        let list = parse_channels_list(&payload).unwrap();
        assert_eq!(list, vec![
            ChannelEntry { ty: 1, channel_id: 0 },
            ChannelEntry { ty: 3, channel_id: 0 },
        ]);
    }

    #[test]
    fn channels_list_rejects_truncation() {
        let mut payload = 3u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[1, 0]);
        assert!(parse_channels_list(&payload).is_err());
    }

    #[test]
    fn main_name_strips_nul() {
        let mut payload = 6u32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"guest\0");
        assert_eq!(parse_main_name(&payload).unwrap(), b"guest");
    }

    #[test]
    fn notify_splits_text() {
        let mut payload = vec![0u8; 24];
        payload[20..24].copy_from_slice(&5u32.to_le_bytes());
        payload.extend_from_slice(b"hello");
        let (head, text) = parse_notify(&payload).unwrap();
        assert_eq!(head.message_len.get(), 5);
        assert_eq!(text, b"hello");
    }

    #[test]
    fn audio_volume_per_channel() {
        let payload = [2u8, 0x10, 0x00, 0x20, 0x00];
        assert_eq!(parse_audio_volume(&payload).unwrap(), vec![0x10, 0x20]);
    }
}
