//! DISPLAY channel: surface lifecycle and the uncompressed draw path.
//!
//! On connect the channel announces that it runs without caches and
//! prefers uncompressed bitmaps, so the only draws that arrive are
//! solid fills and plain bitmap copies. Anything else logs and no-ops.

use redlink_proto::MiniHeader;
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{msg, msgc};
use redlink_proto::draw::{
    Brush, Copy, DisplayBase, Fill, WireCursor, bitmap_flags, resolve_image, surface_fmt,
};
use redlink_proto::messages::{DisplayInit, PreferredCompression, SurfaceCreate, SurfaceDestroy};
use tracing::{debug, error};
use zerocopy::IntoBytes;

use crate::channel::Dispatch;
use crate::error::ClientError;
use crate::session::Session;
use crate::types::{DrawBitmap, DrawFill, SurfaceFormat};

/// DISPLAY advertises the compression-preference capability so the
/// OFF request below is honoured.
pub(crate) fn link_caps() -> CapsBitmap {
    let mut bits = CapsBitmap::with_words(caps::cap_words(caps::display::PREF_COMPRESSION));
    bits.set(caps::display::PREF_COMPRESSION);
    bits
}

/// Post-handshake hook: declare the cache-less client and ask for
/// uncompressed bitmaps only.
pub(crate) fn on_connect(session: &mut Session, idx: usize) -> Result<(), ClientError> {
    let shared = &session.channels[idx].shared;

    let init = DisplayInit::default();
    shared.send_packet(msgc::display::INIT, &[init.as_bytes()]).map_err(|e| {
        error!("failed to send the display init: {e}");
        e
    })?;

    let preference = PreferredCompression::off();
    shared
        .send_packet(msgc::display::PREFERRED_COMPRESSION, &[preference.as_bytes()])
        .map_err(|e| {
            error!("failed to send the compression preference: {e}");
            e
        })
}

pub(crate) fn select(session: &mut Session, idx: usize, header: &MiniHeader) -> Dispatch {
    session.channels[idx].init_done = true;

    match header.ty() {
        msg::display::SURFACE_CREATE => Dispatch::Handle(on_surface_create),
        msg::display::SURFACE_DESTROY => Dispatch::Handle(on_surface_destroy),
        msg::display::DRAW_FILL => Dispatch::Handle(on_draw_fill),
        msg::display::DRAW_COPY => Dispatch::Handle(on_draw_copy),
        _ => Dispatch::Discard,
    }
}

fn map_surface_format(format: u32) -> Option<SurfaceFormat> {
    match format {
        surface_fmt::F1_A => Some(SurfaceFormat::A1),
        surface_fmt::F8_A => Some(SurfaceFormat::A8),
        surface_fmt::F16_555 => Some(SurfaceFormat::Rgb555),
        surface_fmt::F16_565 => Some(SurfaceFormat::Rgb565),
        surface_fmt::F32_XRGB => Some(SurfaceFormat::Xrgb),
        surface_fmt::F32_ARGB => Some(SurfaceFormat::Argb),
        _ => None,
    }
}

fn on_surface_create(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = SurfaceCreate::parse(payload)?;

    let Some(format) = map_surface_format(msg.format.get()) else {
        return Err(ClientError::Protocol {
            reason: format!("unknown surface format {}", msg.format.get()),
        });
    };

    if let Some(create) = session.config.display.surface_create.as_mut() {
        create(msg.surface_id.get(), format, msg.width.get(), msg.height.get());
    }
    Ok(())
}

fn on_surface_destroy(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = SurfaceDestroy::parse(payload)?;
    if let Some(destroy) = session.config.display.surface_destroy.as_mut() {
        destroy(msg.surface_id.get());
    }
    Ok(())
}

fn on_draw_fill(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let mut cursor = WireCursor::new(payload);
    let base = DisplayBase::parse(&mut cursor)?;
    let fill = Fill::parse(&mut cursor)?;

    let Brush::Solid(color) = fill.brush else {
        debug!("ignoring fill with unsupported brush {:?}", fill.brush);
        return Ok(());
    };

    if let Some(draw) = session.config.display.draw_fill.as_mut() {
        draw(&DrawFill {
            surface_id: base.surface_id,
            x: base.bbox.left.get(),
            y: base.bbox.top.get(),
            width: base.bbox.width(),
            height: base.bbox.height(),
            color,
        });
    }
    Ok(())
}

fn on_draw_copy(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let mut cursor = WireCursor::new(payload);
    let base = DisplayBase::parse(&mut cursor)?;
    let copy = Copy::parse(&mut cursor)?;

    let Some(image) = copy.src_bitmap else {
        debug!("ignoring copy without a source bitmap");
        return Ok(());
    };

    let (descriptor, bitmap) = resolve_image(payload, image)?;
    let Some(bitmap) = bitmap else {
        debug!("ignoring copy with compressed image type {}", descriptor.ty);
        return Ok(());
    };

    if let Some(draw) = session.config.display.draw_bitmap.as_mut() {
        draw(&DrawBitmap {
            surface_id: base.surface_id,
            top_down: bitmap.flags & bitmap_flags::TOP_DOWN != 0,
            x: base.bbox.left.get(),
            y: base.bbox.top.get(),
            width: bitmap.width,
            height: bitmap.height,
            stride: bitmap.stride,
            data: bitmap.data,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use redlink_proto::channel::{msg, msgc};
    use redlink_proto::draw::{brush, clip, image};

    use crate::config::Config;
    use crate::session::{Service, session_with_mocks};
    use crate::types::{DrawFill, SurfaceFormat};

    const DISPLAY: usize = 4;

    fn base(surface_id: u32, left: i32, top: i32, right: i32, bottom: i32) -> Vec<u8> {
        let mut out = surface_id.to_le_bytes().to_vec();
        for v in [top, left, bottom, right] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.push(clip::NONE);
        out
    }

    fn solid_fill(color: u32) -> Vec<u8> {
        let mut out = brush::SOLID.to_le_bytes().to_vec();
        out.extend_from_slice(&color.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // rop
        out.push(0); // mask flags
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // mask bitmap: absent
        out
    }

    #[allow(clippy::type_complexity)]
    fn display_config() -> (
        Config,
        Arc<Mutex<Vec<(u32, SurfaceFormat, u32, u32)>>>,
        Arc<Mutex<Vec<DrawFill>>>,
        Arc<Mutex<Vec<(u32, u32, u32, Vec<u8>)>>>,
    ) {
        let surfaces = Arc::new(Mutex::new(Vec::new()));
        let fills = Arc::new(Mutex::new(Vec::new()));
        let bitmaps = Arc::new(Mutex::new(Vec::new()));

        let mut config = Config::default();
        config.display.enable = true;
        let sink = Arc::clone(&surfaces);
        config.display.surface_create =
            Some(Box::new(move |id, fmt, w, h| sink.lock().push((id, fmt, w, h))));
        config.display.surface_destroy = Some(Box::new(|_| {}));
        let sink = Arc::clone(&fills);
        config.display.draw_fill = Some(Box::new(move |fill| sink.lock().push(*fill)));
        let sink = Arc::clone(&bitmaps);
        config.display.draw_bitmap = Some(Box::new(move |draw| {
            sink.lock().push((draw.surface_id, draw.width, draw.height, draw.data.to_vec()));
        }));

        (config, surfaces, fills, bitmaps)
    }

    #[test]
    fn connect_hook_declares_cacheless_uncompressed() {
        let (config, _, _, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        super::on_connect(&mut session, DISPLAY).unwrap();

        let records = mocks[DISPLAY].written_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, msgc::display::INIT);
        assert_eq!(records[0].1, vec![0u8; 14]);
        assert_eq!(records[1].0, msgc::display::PREFERRED_COMPRESSION);
        assert_eq!(records[1].1, vec![image::COMPRESSION_OFF]);
    }

    #[test]
    fn surface_lifecycle_is_forwarded() {
        let (config, surfaces, _, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        let mut payload = Vec::new();
        for v in [7u32, 640, 480, 32, 0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        mocks[DISPLAY].push_record(msg::display::SURFACE_CREATE, &payload);

        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
        assert_eq!(surfaces.lock().as_slice(), &[(7, SurfaceFormat::Xrgb, 640, 480)]);
        assert!(session.channels[DISPLAY].init_done);
    }

    #[test]
    fn unknown_surface_format_is_fatal() {
        let (config, _, _, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        let mut payload = Vec::new();
        for v in [7u32, 640, 480, 1234, 0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        mocks[DISPLAY].push_record(msg::display::SURFACE_CREATE, &payload);
        assert!(session.service_channel(DISPLAY).is_err());
    }

    #[test]
    fn solid_fill_resolves_the_box() {
        let (config, _, fills, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        let mut payload = base(3, 10, 20, 110, 70);
        payload.extend_from_slice(&solid_fill(0x00ff_8800));
        mocks[DISPLAY].push_record(msg::display::DRAW_FILL, &payload);

        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
        assert_eq!(
            fills.lock().as_slice(),
            &[DrawFill { surface_id: 3, x: 10, y: 20, width: 100, height: 50, color: 0x00ff_8800 }]
        );
    }

    #[test]
    fn pattern_fill_is_ignored() {
        let (config, _, fills, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        let mut payload = base(3, 0, 0, 1, 1);
        payload.extend_from_slice(&brush::PATTERN.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes()); // pattern image
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        mocks[DISPLAY].push_record(msg::display::DRAW_FILL, &payload);

        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
        assert!(fills.lock().is_empty());
    }

    #[test]
    fn bitmap_copy_rebases_the_image_offset() {
        let (config, _, _, bitmaps) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        // base + copy body, then the image at a known offset
        let mut payload = base(1, 5, 6, 7, 8);
        let copy_at = payload.len();
        payload.extend_from_slice(&0u32.to_le_bytes()); // src bitmap offset, patched below
        for v in [0i32, 0, 2, 2] {
            payload.extend_from_slice(&v.to_le_bytes()); // src area
        }
        payload.extend_from_slice(&0u16.to_le_bytes()); // rop
        payload.push(0); // scale
        payload.push(0); // mask flags
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes()); // mask bitmap

        let image_off = payload.len() as u32;
        payload[copy_at..copy_at + 4].copy_from_slice(&image_off.to_le_bytes());

        payload.extend_from_slice(&1u64.to_le_bytes()); // image id
        payload.push(image::TYPE_BITMAP);
        payload.push(0);
        payload.extend_from_slice(&2u32.to_le_bytes()); // descriptor w
        payload.extend_from_slice(&2u32.to_le_bytes()); // descriptor h
        payload.push(8); // bitmap format
        payload.push(1 << 2); // top-down
        payload.extend_from_slice(&2u32.to_le_bytes()); // width
        payload.extend_from_slice(&2u32.to_le_bytes()); // height
        payload.extend_from_slice(&8u32.to_le_bytes()); // stride
        payload.extend_from_slice(&0u32.to_le_bytes()); // palette: absent
        payload.extend_from_slice(&[0xCD; 16]); // pixels

        mocks[DISPLAY].push_record(msg::display::DRAW_COPY, &payload);

        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
        let drawn = bitmaps.lock();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].0, 1);
        assert_eq!((drawn[0].1, drawn[0].2), (2, 2));
        assert_eq!(drawn[0].3, vec![0xCD; 16]);
    }

    #[test]
    fn copy_with_compressed_image_is_ignored() {
        let (config, _, _, bitmaps) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        let mut payload = base(1, 0, 0, 2, 2);
        let copy_at = payload.len();
        payload.extend_from_slice(&0u32.to_le_bytes());
        for v in [0i32, 0, 2, 2] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(0);
        payload.push(0);
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());

        let image_off = payload.len() as u32;
        payload[copy_at..copy_at + 4].copy_from_slice(&image_off.to_le_bytes());
        payload.extend_from_slice(&1u64.to_le_bytes());
        payload.push(4); // a compressed type
        payload.push(0);
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&2u32.to_le_bytes());

        mocks[DISPLAY].push_record(msg::display::DRAW_COPY, &payload);
        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
        assert!(bitmaps.lock().is_empty());
    }

    #[test]
    fn unhandled_display_messages_are_discarded() {
        let (config, _, _, _) = display_config();
        let (mut session, mocks) = session_with_mocks(config);

        mocks[DISPLAY].push_record(150, &[0xEE; 32]);
        assert!(matches!(session.service_channel(DISPLAY), Ok(Service::Continue)));
    }
}
