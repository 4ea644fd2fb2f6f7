//! The per-channel engine: shared send side, receive-side record, the
//! link handshake and the base-range message dispatch.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{msg, msgc};
use redlink_proto::link::{self, LinkAuthMechanism, LinkHeader, LinkMess, LinkReply};
use redlink_proto::messages::{AckSync, Disconnecting, Ping, SetAck, parse_notify};
use redlink_proto::MiniHeader;
use tracing::{error, info, warn};
use zerocopy::IntoBytes;

use crate::error::ClientError;
use crate::framer::Framer;
use crate::session::Session;
use crate::stream::{Stream, write_all_spin};
use crate::types::ChannelKind;

/// How the dispatcher wants the current message handled.
pub(crate) enum Dispatch {
    /// Stage the payload and invoke this handler.
    Handle(Handler),
    /// Drain and drop the payload.
    Discard,
    /// The message is invalid in this state; tear the session down.
    Fatal,
}

/// A message handler: the session, the channel slot, the payload.
pub(crate) type Handler = fn(&mut Session, usize, &[u8]) -> Result<(), ClientError>;

/// Send-side channel state, shared with submit surfaces on other
/// threads.
///
/// The stream slot is read-locked for the duration of any I/O and
/// write-locked only to install or drop the socket; `send_lock`
/// serialises writers so each submitted record is contiguous on the
/// wire. The receive path reads without taking `send_lock`.
pub(crate) struct ChannelShared {
    name: &'static str,
    stream: RwLock<Option<Stream>>,
    send_lock: Mutex<()>,
    connected: AtomicBool,
    ready: AtomicBool,
}

impl ChannelShared {
    pub(crate) fn new(kind: ChannelKind) -> Self {
        Self {
            name: kind.name(),
            stream: RwLock::new(None),
            send_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Log name of the channel.
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn install(&self, stream: Stream) {
        *self.stream.write() = Some(stream);
        self.connected.store(true, Ordering::Release);
    }

    /// Drop the stream, closing the socket.
    pub(crate) fn take_stream(&self) -> Option<Stream> {
        self.connected.store(false, Ordering::Release);
        self.ready.store(false, Ordering::Release);
        self.stream.write().take()
    }

    pub(crate) fn stream(&self) -> parking_lot::RwLockReadGuard<'_, Option<Stream>> {
        self.stream.read()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Lock for multi-record writes; the caller must already hold the
    /// stream read guard.
    pub(crate) fn send_lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.send_lock.lock()
    }

    /// Frame and send one record. The header and every payload part end
    /// up contiguous on the wire.
    pub(crate) fn send_packet(&self, ty: u16, parts: &[&[u8]]) -> Result<(), ClientError> {
        let size: usize = parts.iter().map(|p| p.len()).sum();
        let mut buf = Vec::with_capacity(MiniHeader::SIZE + size);
        buf.extend_from_slice(&MiniHeader::new(ty, size as u32).to_bytes());
        for part in parts {
            buf.extend_from_slice(part);
        }
        self.send_raw(&buf)
    }

    /// Send pre-framed bytes under the send lock.
    pub(crate) fn send_raw(&self, buf: &[u8]) -> Result<(), ClientError> {
        let guard = self.stream.read();
        let Some(stream) = guard.as_ref() else {
            return Err(ClientError::Protocol { reason: format!("{} is not connected", self.name) });
        };
        let _send = self.send_lock.lock();
        write_all_spin(stream, buf)?;
        Ok(())
    }
}

/// Receive-side channel record, owned by the session.
pub(crate) struct Channel {
    pub(crate) kind: ChannelKind,
    pub(crate) shared: Arc<ChannelShared>,
    /// The server announced this channel in the channels list.
    pub(crate) available: bool,
    /// The channel-specific init message has been seen.
    pub(crate) init_done: bool,
    /// Deferred close, honoured at the top of the next `process` call.
    pub(crate) do_disconnect: bool,
    /// The socket is registered with the readiness poll.
    pub(crate) registered: bool,
    /// ACK window dictated by SET_ACK; zero disables ACKs.
    pub(crate) ack_frequency: u32,
    pub(crate) ack_count: u32,
    pub(crate) framer: Framer,
    /// Handler selected at header time, consumed at payload completion.
    pub(crate) pending: Option<Handler>,
}

impl Channel {
    pub(crate) fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            shared: Arc::new(ChannelShared::new(kind)),
            available: false,
            init_done: false,
            do_disconnect: false,
            registered: false,
            ack_frequency: 0,
            ack_count: 0,
            framer: Framer::new(),
            pending: None,
        }
    }

    /// Count a received message and emit an ACK when the window fills.
    pub(crate) fn ack(&mut self) -> Result<(), ClientError> {
        if self.ack_frequency == 0 {
            return Ok(());
        }
        self.ack_count += 1;
        if self.ack_count != self.ack_frequency {
            return Ok(());
        }
        self.ack_count = 0;

        self.shared
            .send_packet(msgc::ACK, &[&[0u8]])
            .map_err(|e| ClientError::Ack { reason: e.to_string() })
    }
}

/// Milliseconds for the farewell timestamp.
fn timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

/// Build the link-phase connect packet for one channel.
pub(crate) fn build_connect_packet(
    session_id: u32,
    channel_id: u8,
    wire_type: u8,
    common: &CapsBitmap,
    channel: &CapsBitmap,
) -> Vec<u8> {
    let caps_len = (common.word_count() + channel.word_count()) * 4;
    let body_len = LinkMess::SIZE + caps_len;

    let mut out = Vec::with_capacity(LinkHeader::SIZE + body_len);
    out.extend_from_slice(&LinkHeader::new(body_len as u32).to_bytes());
    let mess = LinkMess::new(
        session_id,
        wire_type,
        channel_id,
        common.word_count() as u32,
        channel.word_count() as u32,
    );
    out.extend_from_slice(mess.as_bytes());
    common.write_to(&mut out);
    channel.write_to(&mut out);
    out
}

/// The common capabilities every channel advertises.
pub(crate) fn common_caps() -> CapsBitmap {
    let mut bits = CapsBitmap::with_words(caps::cap_words(caps::common::MINI_HEADER));
    bits.set(caps::common::PROTOCOL_AUTH_SELECTION);
    bits.set(caps::common::AUTH_SPICE);
    bits.set(caps::common::MINI_HEADER);
    bits
}

/// Run the blocking link handshake over an already-connected stream.
///
/// Returns the capability bitmaps the server reflected. Every failure
/// is fatal for the channel; the caller tears the socket down.
pub(crate) fn link_handshake<S: Read + Write>(
    stream: &mut S,
    name: &'static str,
    connect_packet: &[u8],
    password: &str,
) -> Result<(CapsBitmap, CapsBitmap), ClientError> {
    stream.write_all(connect_packet)?;

    let mut header_buf = [0u8; LinkHeader::SIZE];
    stream.read_exact(&mut header_buf)?;
    let header = LinkHeader::parse(&header_buf)?;

    if (header.size() as usize) < LinkReply::SIZE {
        return Err(ClientError::Protocol {
            reason: format!("{name}: link reply truncated to {} bytes", header.size()),
        });
    }

    let mut body = vec![0u8; header.size() as usize];
    stream.read_exact(&mut body)?;
    let reply = LinkReply::parse(&body)?;

    if reply.error() != link::err::OK {
        return Err(ClientError::Auth {
            reason: format!("{name}: server reported link error {}", reply.error()),
        });
    }

    let reflected = reply.caps(&body)?;

    stream.write_all(&LinkAuthMechanism::spice().to_bytes())?;

    let ticket = redlink_crypto::encrypt_ticket(reply.pub_key(), password)
        .map_err(|e| ClientError::Auth { reason: format!("{name}: {e}") })?;
    stream.write_all(&ticket)?;

    let mut result = [0u8; 4];
    stream.read_exact(&mut result)?;
    let link_result = u32::from_le_bytes(result);
    if link_result != link::err::OK {
        return Err(ClientError::Auth {
            reason: format!("{name}: server rejected the ticket: {link_result}"),
        });
    }

    Ok(reflected)
}

/// Select a handler for the shared base range.
pub(crate) fn base_select(header: &MiniHeader) -> Dispatch {
    match header.ty() {
        msg::MIGRATE | msg::MIGRATE_DATA | msg::WAIT_FOR_CHANNELS => Dispatch::Discard,
        msg::SET_ACK => Dispatch::Handle(on_set_ack),
        msg::PING => Dispatch::Handle(on_ping),
        msg::DISCONNECTING => Dispatch::Handle(on_disconnecting),
        msg::NOTIFY => Dispatch::Handle(on_notify),
        _ => Dispatch::Fatal,
    }
}

fn on_set_ack(session: &mut Session, idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = SetAck::parse(payload)?;
    let channel = &mut session.channels[idx];
    channel.ack_frequency = msg.window.get();

    let out = AckSync::new(msg.generation.get());
    channel.shared.send_packet(msgc::ACK_SYNC, &[out.as_bytes()])
}

fn on_ping(session: &mut Session, idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    // echo id and timestamp; any trailing probe padding was consumed by
    // the framing and is not echoed
    let msg = Ping::parse(payload)?;
    let channel = &session.channels[idx];
    channel.shared.send_packet(msgc::PONG, &[msg.as_bytes()]).map_err(|e| {
        error!(channel = channel.shared.name(), "failed to send pong: {e}");
        e
    })
}

fn on_disconnecting(session: &mut Session, idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    let channel = &session.channels[idx];
    if let Some(stream) = channel.shared.stream().as_ref() {
        stream.shutdown_write();
    }
    info!(channel = channel.shared.name(), "server sent disconnect message");
    Ok(())
}

fn on_notify(session: &mut Session, idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let channel = &session.channels[idx];
    match parse_notify(payload) {
        Ok((_, text)) => {
            info!(channel = channel.shared.name(), "[notify] {}", String::from_utf8_lossy(text));
        }
        Err(e) => warn!(channel = channel.shared.name(), "unparseable notify: {e}"),
    }
    Ok(())
}

/// Send the best-effort farewell before a close: nodelay is dropped and
/// restored around the record so it flushes immediately.
pub(crate) fn send_farewell(shared: &ChannelShared) {
    {
        let guard = shared.stream();
        let Some(stream) = guard.as_ref() else { return };
        let _ = stream.set_nodelay(false);
    }

    let farewell = Disconnecting::new(timestamp_ms(), link::err::OK);
    let _ = shared.send_packet(msgc::DISCONNECTING, &[farewell.as_bytes()]);

    if let Some(stream) = shared.stream().as_ref() {
        let _ = stream.set_nodelay(true);
    }
}
