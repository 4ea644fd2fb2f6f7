//! DISPLAY draw payloads: packed substructures with offset-relative
//! pointers.
//!
//! Draw messages embed references to images, palettes and clip data as
//! byte offsets from the start of the payload buffer, never as inline
//! data. [`BufOffset`] keeps those distinct from lengths and cursors, and
//! resolution is a bounds-checked rebase into the same buffer. The fixed
//! parts are walked sequentially with a [`WireCursor`], matching the
//! packed byte-aligned layout.

use zerocopy::byteorder::little_endian::{I32, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Result, WireError};

/// Surface pixel formats.
pub mod surface_fmt {
    /// 1-bit alpha.
    pub const F1_A: u32 = 1;
    /// 8-bit alpha.
    pub const F8_A: u32 = 8;
    /// 16-bit 5-5-5.
    pub const F16_555: u32 = 16;
    /// 32-bit RGB, high byte unused.
    pub const F32_XRGB: u32 = 32;
    /// 16-bit 5-6-5.
    pub const F16_565: u32 = 80;
    /// 32-bit ARGB.
    pub const F32_ARGB: u32 = 96;
}

/// Image descriptor types and compression codes.
pub mod image {
    /// Uncompressed bitmap, the only type this client draws.
    pub const TYPE_BITMAP: u8 = 0;
    /// PREFERRED_COMPRESSION code for uncompressed bitmaps.
    pub const COMPRESSION_OFF: u8 = 1;
}

/// Brush types inside DRAW_FILL.
pub mod brush {
    /// No brush.
    pub const NONE: u32 = 0;
    /// Single colour.
    pub const SOLID: u32 = 1;
    /// Tiled pattern image.
    pub const PATTERN: u32 = 2;
}

/// Clip types inside a draw base.
pub mod clip {
    /// No clipping.
    pub const NONE: u8 = 0;
    /// Rectangle list follows inline.
    pub const RECTS: u8 = 1;
}

/// Bitmap flags.
pub mod bitmap_flags {
    /// Rows run top to bottom.
    pub const TOP_DOWN: u8 = 1 << 2;
}

/// A rectangle in surface coordinates.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Rect {
    /// Top edge.
    pub top: I32,
    /// Left edge.
    pub left: I32,
    /// Bottom edge (exclusive).
    pub bottom: I32,
    /// Right edge (exclusive).
    pub right: I32,
}

impl Rect {
    /// Width of the rectangle.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.right.get() - self.left.get()
    }

    /// Height of the rectangle.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.bottom.get() - self.top.get()
    }
}

/// A point in surface coordinates.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Point {
    /// X coordinate.
    pub x: I32,
    /// Y coordinate.
    pub y: I32,
}

/// A byte offset into the current payload buffer.
///
/// Zero means "absent"; any other value must fall inside the buffer it is
/// resolved against. This is deliberately not a pointer: resolution is a
/// checked rebase, never arithmetic on addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufOffset(u32);

impl BufOffset {
    /// Wrap a raw wire offset.
    #[must_use]
    pub fn new(offset: u32) -> Option<Self> {
        (offset != 0).then_some(Self(offset))
    }

    /// The raw offset value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// The buffer tail starting at this offset.
    pub fn slice_in(self, buf: &[u8]) -> Result<&[u8]> {
        buf.get(self.0 as usize..)
            .ok_or(WireError::BadOffset { offset: self.0, len: buf.len() })
    }
}

/// Sequential reader over a packed payload.
///
/// # Invariants
///
/// - The position never exceeds the buffer length; every advance is
///   checked and failure surfaces as [`WireError::TooShort`].
#[derive(Debug)]
pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `offset` within `buf`.
    pub fn at(buf: &'a [u8], offset: BufOffset) -> Result<Self> {
        offset.slice_in(buf)?;
        Ok(Self { buf, pos: offset.get() as usize })
    }

    /// Current position from the start of the buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read a packed value and advance past it.
    pub fn read<T: FromBytes + KnownLayout + ::core::marker::Copy>(&mut self) -> Result<T> {
        let (value, _) = T::read_from_prefix(&self.buf[self.pos..]).map_err(|_| {
            WireError::TooShort { expected: core::mem::size_of::<T>(), actual: self.remaining() }
        })?;
        self.pos += core::mem::size_of::<T>();
        Ok(value)
    }

    /// Read a wire offset; zero becomes `None`.
    pub fn read_offset(&mut self) -> Result<Option<BufOffset>> {
        Ok(BufOffset::new(self.read::<U32>()?.get()))
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(WireError::TooShort { expected: n, actual: self.remaining() });
        }
        self.pos += n;
        Ok(())
    }

    /// The unread tail of the buffer.
    #[must_use]
    pub fn rest(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// The common prefix of every draw message: target surface, bounding box
/// and clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBase {
    /// Target surface id.
    pub surface_id: u32,
    /// Bounding box of the operation.
    pub bbox: Rect,
    /// Clip type ([`clip`]).
    pub clip_type: u8,
}

impl DisplayBase {
    /// Walk the base off the cursor, skipping an inline clip-rectangle
    /// list if present.
    pub fn parse(cur: &mut WireCursor<'_>) -> Result<Self> {
        let surface_id = cur.read::<U32>()?.get();
        let bbox = cur.read::<Rect>()?;
        let clip_type = cur.read::<u8>()?;

        if clip_type == clip::RECTS {
            let num_rects = cur.read::<U32>()?.get() as usize;
            cur.skip(num_rects * core::mem::size_of::<Rect>())?;
        }

        Ok(Self { surface_id, bbox, clip_type })
    }
}

/// A fill brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brush {
    /// No brush.
    None,
    /// Solid colour fill.
    Solid(u32),
    /// Pattern image with an origin; the image stays an unresolved
    /// offset.
    Pattern {
        /// Pattern image reference.
        image: Option<BufOffset>,
        /// Pattern origin.
        pos: Point,
    },
    /// A brush type this client does not know.
    Unknown(u32),
}

/// A mask attachment shared by fill and copy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QMask {
    /// Mask flags.
    pub flags: u8,
    /// Mask origin.
    pub pos: Point,
    /// Mask bitmap reference.
    pub bitmap: Option<BufOffset>,
}

impl QMask {
    fn parse(cur: &mut WireCursor<'_>) -> Result<Self> {
        let flags = cur.read::<u8>()?;
        let pos = cur.read::<Point>()?;
        let bitmap = cur.read_offset()?;
        Ok(Self { flags, pos, bitmap })
    }
}

/// The body of DRAW_FILL after the display base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Fill brush.
    pub brush: Brush,
    /// Raster operation descriptor.
    pub rop_descriptor: u16,
    /// Optional mask.
    pub mask: QMask,
}

impl Fill {
    /// Walk the fill body off the cursor.
    pub fn parse(cur: &mut WireCursor<'_>) -> Result<Self> {
        let brush_type = cur.read::<U32>()?.get();
        let brush = match brush_type {
            brush::NONE => Brush::None,
            brush::SOLID => Brush::Solid(cur.read::<U32>()?.get()),
            brush::PATTERN => Brush::Pattern { image: cur.read_offset()?, pos: cur.read::<Point>()? },
            other => Brush::Unknown(other),
        };
        let rop_descriptor = cur.read::<U16>()?.get();
        let mask = QMask::parse(cur)?;
        Ok(Self { brush, rop_descriptor, mask })
    }
}

/// The body of DRAW_COPY after the display base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Copy {
    /// Source image reference.
    pub src_bitmap: Option<BufOffset>,
    /// Source area within the image.
    pub src_area: Rect,
    /// Raster operation descriptor.
    pub rop_descriptor: u16,
    /// Scaling mode.
    pub scale_mode: u8,
    /// Optional mask.
    pub mask: QMask,
}

impl Copy {
    /// Walk the copy body off the cursor.
    pub fn parse(cur: &mut WireCursor<'_>) -> Result<Self> {
        let src_bitmap = cur.read_offset()?;
        let src_area = cur.read::<Rect>()?;
        let rop_descriptor = cur.read::<U16>()?.get();
        let scale_mode = cur.read::<u8>()?;
        let mask = QMask::parse(cur)?;
        Ok(Self { src_bitmap, src_area, rop_descriptor, scale_mode, mask })
    }
}

/// Image descriptor found at a resolved image offset.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ImageDescriptor {
    /// Server-side image id.
    pub id: U64,
    /// Image type ([`image`]).
    pub ty: u8,
    /// Descriptor flags.
    pub flags: u8,
    /// Image width.
    pub width: U32,
    /// Image height.
    pub height: U32,
}

/// An uncompressed bitmap resolved out of a draw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap<'a> {
    /// Pixel format code.
    pub format: u8,
    /// Bitmap flags ([`bitmap_flags`]).
    pub flags: u8,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row stride in bytes.
    pub stride: u32,
    /// Palette reference, absent for direct-colour formats.
    pub palette: Option<BufOffset>,
    /// Palette cache id; only meaningful with a palette.
    pub palette_id: u64,
    /// Pixel rows.
    pub data: &'a [u8],
}

/// Resolve an image reference and, when it is an uncompressed bitmap,
/// its pixel data. Returns the descriptor and `Some(bitmap)` for
/// [`image::TYPE_BITMAP`], `None` for every other image type.
pub fn resolve_image(buf: &[u8], offset: BufOffset) -> Result<(ImageDescriptor, Option<Bitmap<'_>>)> {
    let mut cur = WireCursor::at(buf, offset)?;
    let descriptor = cur.read::<ImageDescriptor>()?;

    if descriptor.ty != image::TYPE_BITMAP {
        return Ok((descriptor, None));
    }

    let format = cur.read::<u8>()?;
    let flags = cur.read::<u8>()?;
    let width = cur.read::<U32>()?.get();
    let height = cur.read::<U32>()?.get();
    let stride = cur.read::<U32>()?.get();
    let palette = cur.read_offset()?;
    // the palette id is only serialized when a palette is referenced
    let palette_id = if palette.is_some() { cur.read::<U64>()?.get() } else { 0 };

    let bitmap = Bitmap {
        format,
        flags,
        width,
        height,
        stride,
        palette,
        palette_id,
        data: cur.rest(),
    };
    Ok((descriptor, Some(bitmap)))
}
