//! Public data types shared across the client surface.

use redlink_proto::channel::channel_type;

/// The logical channels this client can carry, in connect order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Session control and the agent tunnel. Always connected first.
    Main,
    /// Keyboard and mouse.
    Inputs,
    /// Audio out of the guest.
    Playback,
    /// Audio into the guest.
    Record,
    /// Surfaces and draws.
    Display,
}

impl ChannelKind {
    /// All kinds in declared (connect) order.
    pub(crate) const ALL: [ChannelKind; 5] =
        [Self::Main, Self::Inputs, Self::Playback, Self::Record, Self::Display];

    /// Number of channel slots.
    pub(crate) const COUNT: usize = 5;

    /// Slot index within the session.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Inputs => 1,
            Self::Playback => 2,
            Self::Record => 3,
            Self::Display => 4,
        }
    }

    /// The 8-bit type carried in the link message.
    pub(crate) fn wire_type(self) -> u8 {
        match self {
            Self::Main => channel_type::MAIN,
            Self::Inputs => channel_type::INPUTS,
            Self::Playback => channel_type::PLAYBACK,
            Self::Record => channel_type::RECORD,
            Self::Display => channel_type::DISPLAY,
        }
    }

    /// Name used in logs.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Inputs => "INPUTS",
            Self::Playback => "PLAYBACK",
            Self::Record => "RECORD",
            Self::Display => "DISPLAY",
        }
    }
}

/// Clipboard data types exposed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataType {
    /// UTF-8 text.
    Text,
    /// PNG image.
    Png,
    /// BMP image.
    Bmp,
    /// TIFF image.
    Tiff,
    /// JPEG image.
    Jpeg,
    /// Anything the fixed enumeration does not cover.
    #[default]
    None,
}

/// Audio sample formats exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// The stream uses a format this client cannot describe.
    Invalid,
    /// Signed 16-bit PCM.
    S16,
}

/// Surface pixel formats exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// 1-bit alpha.
    A1,
    /// 8-bit alpha.
    A8,
    /// 16-bit 5-5-5.
    Rgb555,
    /// 16-bit 5-6-5.
    Rgb565,
    /// 32-bit RGB, high byte unused.
    Xrgb,
    /// 32-bit ARGB.
    Argb,
}

/// Guest identity reported by the MAIN channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Guest name.
    pub name: String,
    /// Guest UUID.
    pub uuid: [u8; 16],
}

/// A solid fill delivered to the display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawFill {
    /// Target surface.
    pub surface_id: u32,
    /// Left edge of the filled region.
    pub x: i32,
    /// Top edge of the filled region.
    pub y: i32,
    /// Region width.
    pub width: i32,
    /// Region height.
    pub height: i32,
    /// Fill colour.
    pub color: u32,
}

/// An uncompressed bitmap draw delivered to the display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBitmap<'a> {
    /// Target surface.
    pub surface_id: u32,
    /// Rows run top to bottom when set.
    pub top_down: bool,
    /// Left edge of the destination.
    pub x: i32,
    /// Top edge of the destination.
    pub y: i32,
    /// Bitmap width in pixels.
    pub width: u32,
    /// Bitmap height in pixels.
    pub height: u32,
    /// Row stride in bytes.
    pub stride: u32,
    /// Raw pixel rows, 32-bit RGBA.
    pub data: &'a [u8],
}
