//! INPUTS channel: key and mouse submission, motion-ACK accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use redlink_proto::MiniHeader;
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{MOTION_ACK_BUNCH, mouse, msg, msgc};
use redlink_proto::messages::{
    KeyCode, KeyModifiers, MouseButton, MouseMotion, MousePosition,
};
use tracing::error;
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::{I32, U16, U32};

use crate::channel::{ChannelShared, Dispatch};
use crate::error::ClientError;
use crate::handle::SessionHandle;
use crate::main_channel;
use crate::session::Session;

/// The QEMU virtio mouse rejects deltas beyond this per record.
const MOTION_CLAMP: i32 = 127;

/// Mouse state shared between submitters; the button mask must be
/// consistent within every emitted record.
#[derive(Default)]
struct MouseState {
    button_state: u16,
}

/// Send-side INPUTS state shared with the submit surface.
pub(crate) struct InputsShared {
    mouse: Mutex<MouseState>,
    /// Motion records sent and not yet acknowledged.
    pub(crate) sent_count: AtomicI32,
    /// Reused buffer for coalesced motion batches.
    motion_scratch: Mutex<Vec<u8>>,
    pub(crate) channel: Arc<ChannelShared>,
}

impl InputsShared {
    pub(crate) fn new(channel: Arc<ChannelShared>) -> Self {
        Self {
            mouse: Mutex::new(MouseState::default()),
            sent_count: AtomicI32::new(0),
            motion_scratch: Mutex::new(Vec::new()),
            channel,
        }
    }

    /// Free the motion scratch buffer on session teardown.
    pub(crate) fn release_scratch(&self) {
        *self.motion_scratch.lock() = Vec::new();
    }

    fn ready(&self) -> bool {
        self.channel.is_connected() && self.channel.is_ready()
    }
}

/// INPUTS advertises no channel-specific capabilities.
pub(crate) fn link_caps() -> CapsBitmap {
    CapsBitmap::with_words(caps::cap_words(0))
}

pub(crate) fn select(session: &mut Session, idx: usize, header: &MiniHeader) -> Dispatch {
    let channel = &session.channels[idx];

    if !channel.init_done {
        if header.ty() == msg::inputs::INIT {
            return Dispatch::Handle(on_init);
        }
        error!("expected the inputs init message but got {}", header.ty());
        return Dispatch::Fatal;
    }

    match header.ty() {
        msg::inputs::INIT => {
            error!("unexpected second inputs init message");
            Dispatch::Fatal
        }
        msg::inputs::KEY_MODIFIERS => Dispatch::Handle(on_key_modifiers),
        msg::inputs::MOUSE_MOTION_ACK => Dispatch::Handle(on_mouse_motion_ack),
        _ => Dispatch::Discard,
    }
}

fn on_init(session: &mut Session, idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    session.channels[idx].init_done = true;
    Ok(())
}

fn on_key_modifiers(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = KeyModifiers::parse(payload)?;
    session.kb_modifiers = msg.modifiers.get();
    Ok(())
}

fn on_mouse_motion_ack(session: &mut Session, _idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    let outstanding = session.inputs.sent_count.fetch_sub(MOTION_ACK_BUNCH, Ordering::AcqRel);
    if outstanding < MOTION_ACK_BUNCH {
        return Err(ClientError::Flow {
            reason: "server acknowledged more motion records than were sent".into(),
        });
    }
    Ok(())
}

/// Scancode encoding for a key press. Extended codes (>= 0x100) use the
/// two-byte 0xE0 prefix form.
pub(crate) fn encode_key_down(code: u32) -> u32 {
    if code >= 0x100 { 0xe0 | ((code - 0x100) << 8) } else { code }
}

/// Scancode encoding for a key release: the 0x80 release bit, or its
/// 0xE0-prefixed variant for extended codes.
pub(crate) fn encode_key_up(code: u32) -> u32 {
    if code >= 0x100 { 0x80e0 | ((code - 0x100) << 8) } else { code | 0x80 }
}

fn button_mask(button: u32) -> u16 {
    match button {
        mouse::BUTTON_LEFT => mouse::MASK_LEFT,
        mouse::BUTTON_MIDDLE => mouse::MASK_MIDDLE,
        mouse::BUTTON_RIGHT => mouse::MASK_RIGHT,
        mouse::BUTTON_SIDE => mouse::MASK_SIDE,
        mouse::BUTTON_EXTRA => mouse::MASK_EXTRA,
        _ => 0,
    }
}

fn clamp_delta(v: i32) -> i32 {
    v.clamp(-MOTION_CLAMP, MOTION_CLAMP)
}

impl SessionHandle {
    /// Submit a key press.
    pub fn key_down(&self, code: u32) -> bool {
        if !self.inputs.ready() {
            return false;
        }
        let msg = KeyCode::new(encode_key_down(code));
        if let Err(e) = self.inputs.channel.send_packet(msgc::inputs::KEY_DOWN, &[msg.as_bytes()]) {
            error!("failed to send the key press: {e}");
            return false;
        }
        true
    }

    /// Submit a key release.
    pub fn key_up(&self, code: u32) -> bool {
        if !self.inputs.ready() {
            return false;
        }
        let msg = KeyCode::new(encode_key_up(code));
        if let Err(e) = self.inputs.channel.send_packet(msgc::inputs::KEY_UP, &[msg.as_bytes()]) {
            error!("failed to send the key release: {e}");
            return false;
        }
        true
    }

    /// Submit the lock-key modifier state.
    pub fn key_modifiers(&self, modifiers: u16) -> bool {
        if !self.inputs.ready() {
            return false;
        }
        let msg = KeyModifiers::new(modifiers);
        if let Err(e) =
            self.inputs.channel.send_packet(msgc::inputs::KEY_MODIFIERS, &[msg.as_bytes()])
        {
            error!("failed to send the key modifiers: {e}");
            return false;
        }
        true
    }

    /// Ask the server for server-side (relative) or client-side
    /// (absolute) mouse handling. This travels on MAIN; it lives here
    /// for caller convenience.
    pub fn mouse_mode(&self, server: bool) -> bool {
        if !self.main.is_connected() || !self.main.is_ready() {
            return false;
        }
        if let Err(e) = main_channel::request_mouse_mode(&self.main, server) {
            error!("failed to send the mouse mode request: {e}");
            return false;
        }
        true
    }

    /// Submit an absolute mouse position.
    pub fn mouse_position(&self, x: u32, y: u32) -> bool {
        if !self.inputs.ready() {
            return false;
        }

        let msg = {
            let mouse = self.inputs.mouse.lock();
            MousePosition {
                x: U32::new(x),
                y: U32::new(y),
                button_state: U16::new(mouse.button_state),
                display_id: 0,
            }
        };

        self.inputs.sent_count.fetch_add(1, Ordering::AcqRel);
        if let Err(e) =
            self.inputs.channel.send_packet(msgc::inputs::MOUSE_POSITION, &[msg.as_bytes()])
        {
            error!("failed to send the mouse position: {e}");
            return false;
        }
        true
    }

    /// Submit a relative mouse motion.
    ///
    /// Deltas beyond ±127 are split into as many consecutive records as
    /// needed, each clamped per axis, assembled into one buffer and
    /// written under the send lock so the burst is contiguous on the
    /// wire.
    pub fn mouse_motion(&self, dx: i32, dy: i32) -> bool {
        if !self.inputs.ready() {
            return false;
        }

        let delta = dx.unsigned_abs().max(dy.unsigned_abs());
        let records = delta.div_ceil(127).max(1) as i32;

        if records == 1 {
            let msg = {
                let mouse = self.inputs.mouse.lock();
                MouseMotion {
                    x: I32::new(dx),
                    y: I32::new(dy),
                    button_state: U16::new(mouse.button_state),
                }
            };
            self.inputs.sent_count.fetch_add(1, Ordering::AcqRel);
            if let Err(e) =
                self.inputs.channel.send_packet(msgc::inputs::MOUSE_MOTION, &[msg.as_bytes()])
            {
                error!("failed to send the mouse motion: {e}");
                return false;
            }
            return true;
        }

        let mut scratch = self.inputs.motion_scratch.lock();
        scratch.clear();
        {
            let mouse = self.inputs.mouse.lock();
            let (mut x, mut y) = (dx, dy);
            for _ in 0..records {
                let msg = MouseMotion {
                    x: I32::new(clamp_delta(x)),
                    y: I32::new(clamp_delta(y)),
                    button_state: U16::new(mouse.button_state),
                };
                x -= clamp_delta(x);
                y -= clamp_delta(y);

                scratch.extend_from_slice(
                    &MiniHeader::new(msgc::inputs::MOUSE_MOTION, MouseMotion::SIZE as u32)
                        .to_bytes(),
                );
                scratch.extend_from_slice(msg.as_bytes());
            }
        }

        self.inputs.sent_count.fetch_add(records, Ordering::AcqRel);
        if let Err(e) = self.inputs.channel.send_raw(&scratch) {
            error!("failed to send the motion burst: {e}");
            return false;
        }
        true
    }

    /// Submit a button press.
    pub fn mouse_press(&self, button: u32) -> bool {
        if !self.inputs.ready() {
            return false;
        }

        let msg = {
            let mut mouse = self.inputs.mouse.lock();
            mouse.button_state |= button_mask(button);
            MouseButton { button: button as u8, button_state: U16::new(mouse.button_state) }
        };

        if let Err(e) =
            self.inputs.channel.send_packet(msgc::inputs::MOUSE_PRESS, &[msg.as_bytes()])
        {
            error!("failed to send the button press: {e}");
            return false;
        }
        true
    }

    /// Submit a button release.
    pub fn mouse_release(&self, button: u32) -> bool {
        if !self.inputs.ready() {
            return false;
        }

        let msg = {
            let mut mouse = self.inputs.mouse.lock();
            mouse.button_state &= !button_mask(button);
            MouseButton { button: button as u8, button_state: U16::new(mouse.button_state) }
        };

        if let Err(e) =
            self.inputs.channel.send_packet(msgc::inputs::MOUSE_RELEASE, &[msg.as_bytes()])
        {
            error!("failed to send the button release: {e}");
            return false;
        }
        true
    }
}
