//! The guest-agent sub-protocol tunnelled over MAIN.
//!
//! Outbound agent traffic is flow-controlled: every `AGENT_DATA` record
//! costs one server-issued token. Records are pre-framed and queued
//! FIFO; the queue drains opportunistically whenever something is
//! enqueued or new tokens arrive, under the MAIN send lock so the
//! records interleave cleanly with the foreground senders.
//!
//! Inbound, the only multi-record message is the clipboard transfer:
//! the first record carries the outer header, an optional selection
//! prefix, the type code and the first chunk; every further record is
//! raw continuation until the declared size is complete.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use redlink_proto::MiniHeader;
use redlink_proto::agent::{
    self, AgentMessage, MAX_DATA_SIZE, SELECTION_SIZE, caps_words_from_msg_size, clipboard,
    has_capability, msg,
};
use redlink_proto::channel::msgc;
use tracing::{debug, error, info, warn};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::U32;

use crate::channel::ChannelShared;
use crate::error::ClientError;
use crate::handle::SessionHandle;
use crate::session::Session;
use crate::stream::write_all_spin;
use crate::types::DataType;

/// Token grant announced to the agent at connect; the client never
/// throttles the server, so this is simply the largest possible value.
const CLIENT_TOKENS_MAX: u32 = u32::MAX;

/// Clipboard ownership and negotiation state.
#[derive(Default)]
pub(crate) struct ClipboardState {
    /// The agent can do on-demand clipboard transfers.
    pub(crate) supported: bool,
    /// Clipboard messages carry a selection prefix.
    pub(crate) selection: bool,
    /// The agent owns the selection.
    pub(crate) agent_grabbed: bool,
    /// We own the selection.
    pub(crate) client_grabbed: bool,
    /// Type the agent offered with its grab.
    pub(crate) ty: DataType,
}

/// Send-side agent state, shared with the clipboard submit surface.
pub(crate) struct AgentShared {
    present: AtomicBool,
    server_tokens: AtomicU32,
    queue: Mutex<VecDeque<Vec<u8>>>,
    /// Bytes the current outbound message may still write.
    msg_remaining: Mutex<usize>,
    pub(crate) cb: Mutex<ClipboardState>,
    main: Arc<ChannelShared>,
}

impl AgentShared {
    pub(crate) fn new(main: Arc<ChannelShared>) -> Self {
        Self {
            present: AtomicBool::new(false),
            server_tokens: AtomicU32::new(0),
            queue: Mutex::new(VecDeque::new()),
            msg_remaining: Mutex::new(0),
            cb: Mutex::new(ClipboardState::default()),
            main,
        }
    }

    pub(crate) fn is_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    pub(crate) fn set_server_tokens(&self, tokens: u32) {
        self.server_tokens.store(tokens, Ordering::Release);
    }

    pub(crate) fn return_server_tokens(&self, tokens: u32) {
        self.server_tokens.fetch_add(tokens, Ordering::AcqRel);
    }

    #[cfg(test)]
    pub(crate) fn server_tokens(&self) -> u32 {
        self.server_tokens.load(Ordering::Acquire)
    }

    /// Atomically consume one token. Fails when none are available or
    /// the MAIN channel is gone.
    fn take_server_token(&self) -> bool {
        loop {
            if !self.main.is_connected() {
                return false;
            }
            let tokens = self.server_tokens.load(Ordering::Acquire);
            if tokens == 0 {
                return false;
            }
            if self
                .server_tokens
                .compare_exchange_weak(tokens, tokens - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Receive-side agent state, owned by the session.
pub(crate) struct Agent {
    pub(crate) shared: Arc<AgentShared>,
    reassembly: Option<Reassembly>,
}

struct Reassembly {
    ty: DataType,
    buf: Vec<u8>,
    remain: usize,
}

impl Agent {
    pub(crate) fn new(shared: Arc<AgentShared>) -> Self {
        Self { shared, reassembly: None }
    }
}

/// (Re)initialise the agent tunnel: flush stale queue entries, grant the
/// agent our tokens and exchange capabilities.
pub(crate) fn connect(session: &mut Session) -> Result<(), ClientError> {
    let shared = Arc::clone(&session.agent.shared);

    shared.queue.lock().clear();

    shared
        .main
        .send_packet(msgc::main::AGENT_START, &[CLIENT_TOKENS_MAX.to_le_bytes().as_slice()])
        .map_err(|e| {
            error!("failed to open the agent tunnel: {e}");
            e
        })?;

    shared.present.store(true, Ordering::Release);

    if let Err(e) = send_caps(&shared, session.config.clipboard.enable, true) {
        shared.present.store(false, Ordering::Release);
        error!("failed to send our capabilities to the spice guest agent");
        return Err(e);
    }

    info!("connected to the spice guest agent");
    Ok(())
}

/// Drop all agent state; used on agent disconnect and session teardown.
pub(crate) fn reset(agent: &mut Agent) {
    agent.shared.queue.lock().clear();
    agent.reassembly = None;

    let mut cb = agent.shared.cb.lock();
    cb.agent_grabbed = false;
    cb.client_grabbed = false;
    drop(cb);

    agent.shared.present.store(false, Ordering::Release);
}

/// Handle one inbound `AGENT_DATA` record.
pub(crate) fn process_data(session: &mut Session, payload: &[u8]) -> Result<(), ClientError> {
    if let Some(re) = session.agent.reassembly.as_mut() {
        if payload.len() > re.remain {
            return Err(ClientError::Protocol {
                reason: format!(
                    "clipboard continuation of {} bytes exceeds the {} still expected",
                    payload.len(),
                    re.remain
                ),
            });
        }
        re.buf.extend_from_slice(payload);
        re.remain -= payload.len();

        if re.remain == 0 {
            finish_clipboard(session);
        }
        return Ok(());
    }

    let outer = AgentMessage::parse(payload)?;
    if outer.protocol() != agent::PROTOCOL {
        return Err(ClientError::Protocol {
            reason: format!(
                "agent protocol {} expected, but got {}",
                agent::PROTOCOL,
                outer.protocol()
            ),
        });
    }

    let body = &payload[AgentMessage::SIZE..];
    match outer.ty() {
        msg::ANNOUNCE_CAPABILITIES => on_announce_caps(session, &outer, body),
        msg::CLIPBOARD | msg::CLIPBOARD_GRAB | msg::CLIPBOARD_REQUEST | msg::CLIPBOARD_RELEASE => {
            on_clipboard_message(session, &outer, body)
        }
        other => {
            warn!("ignoring agent message {other}");
            Ok(())
        }
    }
}

fn on_announce_caps(
    session: &mut Session,
    outer: &AgentMessage,
    body: &[u8],
) -> Result<(), ClientError> {
    let (request, words_bytes) = body
        .split_at_checked(4)
        .ok_or(redlink_proto::WireError::Truncated("capability announcement"))?;
    let request = u32::from_le_bytes([request[0], request[1], request[2], request[3]]);

    let word_count = caps_words_from_msg_size(outer.size());
    let mut words = Vec::with_capacity(word_count);
    for chunk in words_bytes.chunks_exact(4).take(word_count) {
        words.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    let shared = Arc::clone(&session.agent.shared);
    {
        let mut cb = shared.cb.lock();
        cb.supported = has_capability(&words, agent::cap::CLIPBOARD_BY_DEMAND)
            || has_capability(&words, agent::cap::CLIPBOARD_SELECTION);
        cb.selection = has_capability(&words, agent::cap::CLIPBOARD_SELECTION);
        debug!(
            clipboard = cb.supported,
            selection = cb.selection,
            "agent announced its capabilities"
        );
    }

    if request != 0 {
        return send_caps(&shared, session.config.clipboard.enable, false);
    }
    Ok(())
}

fn on_clipboard_message(
    session: &mut Session,
    outer: &AgentMessage,
    body: &[u8],
) -> Result<(), ClientError> {
    let selection = session.agent.shared.cb.lock().selection;
    let prefix = if selection { SELECTION_SIZE } else { 0 };
    let body = body
        .get(prefix..)
        .ok_or(redlink_proto::WireError::Truncated("clipboard selection header"))?;

    match outer.ty() {
        msg::CLIPBOARD_RELEASE => {
            session.agent.shared.cb.lock().agent_grabbed = false;
            if session.config.clipboard.enable
                && let Some(release) = session.config.clipboard.release.as_mut()
            {
                release();
            }
            Ok(())
        }

        msg::CLIPBOARD_GRAB => {
            // the grab carries a type list; only the first entry is
            // honoured
            let (first, _) = U32::read_from_prefix(body)
                .map_err(|_| redlink_proto::WireError::Truncated("clipboard grab types"))?;
            let ty = from_agent(first.get());

            {
                let mut cb = session.agent.shared.cb.lock();
                cb.ty = ty;
                cb.agent_grabbed = true;
                cb.client_grabbed = false;
            }

            if session.config.clipboard.enable
                && let Some(notice) = session.config.clipboard.notice.as_mut()
            {
                notice(ty);
            }
            Ok(())
        }

        msg::CLIPBOARD_REQUEST => {
            let (ty, _) = U32::read_from_prefix(body)
                .map_err(|_| redlink_proto::WireError::Truncated("clipboard request type"))?;
            if session.config.clipboard.enable
                && let Some(request) = session.config.clipboard.request.as_mut()
            {
                request(from_agent(ty.get()));
            }
            Ok(())
        }

        msg::CLIPBOARD => {
            let (ty, chunk) = body
                .split_at_checked(4)
                .ok_or(redlink_proto::WireError::Truncated("clipboard type"))?;
            let ty = from_agent(u32::from_le_bytes([ty[0], ty[1], ty[2], ty[3]]));

            let declared = outer.size() as usize;
            let total = declared
                .checked_sub(4 + prefix)
                .ok_or(redlink_proto::WireError::Truncated("clipboard transfer"))?;
            if chunk.len() > total {
                return Err(ClientError::Protocol {
                    reason: format!(
                        "clipboard chunk of {} bytes exceeds declared size {total}",
                        chunk.len()
                    ),
                });
            }

            let mut buf = Vec::with_capacity(total);
            buf.extend_from_slice(chunk);
            session.agent.reassembly =
                Some(Reassembly { ty, remain: total - chunk.len(), buf });

            if total == chunk.len() {
                finish_clipboard(session);
            }
            Ok(())
        }

        _ => Ok(()),
    }
}

/// Surface a completed clipboard transfer and release the buffer.
fn finish_clipboard(session: &mut Session) {
    let Some(re) = session.agent.reassembly.take() else {
        return;
    };
    if session.config.clipboard.enable
        && let Some(data) = session.config.clipboard.data.as_mut()
    {
        data(re.ty, &re.buf);
    }
}

/// Drain the queue while tokens last. Every record costs one token, the
/// outer header record included. Returns `false` only when a write
/// failed.
pub(crate) fn process_queue(shared: &AgentShared) -> bool {
    let guard = shared.main.stream();
    let Some(stream) = guard.as_ref() else {
        return true;
    };
    let _send = shared.main.send_lock();

    let mut queue = shared.queue.lock();
    while !queue.is_empty() && shared.take_server_token() {
        let Some(record) = queue.pop_front() else {
            break;
        };
        if let Err(e) = write_all_spin(stream, &record) {
            error!("failed to send a queued agent record: {e}");
            return false;
        }
    }
    true
}

/// Open a logical agent message: queue the outer header record and
/// reserve `size` payload bytes for subsequent [`write_msg`] calls.
fn start_msg(shared: &AgentShared, ty: u32, size: usize) -> Result<(), ClientError> {
    let outer = AgentMessage::new(ty, size as u32);
    {
        let mut queue = shared.queue.lock();
        queue.push_back(frame_agent_record(&outer.to_bytes()));
    }
    *shared.msg_remaining.lock() = size;

    if process_queue(shared) {
        Ok(())
    } else {
        Err(ClientError::Flow { reason: "agent queue drain failed".into() })
    }
}

/// Append payload bytes to the open message, fragmenting at the record
/// size limit. Writing more than the declared size is a programming
/// error.
fn write_msg(shared: &AgentShared, data: &[u8]) -> Result<(), ClientError> {
    {
        let mut remaining = shared.msg_remaining.lock();
        if data.len() > *remaining {
            return Err(ClientError::Flow {
                reason: format!(
                    "agent message overrun: {} bytes submitted, {} declared",
                    data.len(),
                    *remaining
                ),
            });
        }
        *remaining -= data.len();
    }

    {
        let mut queue = shared.queue.lock();
        for chunk in data.chunks(MAX_DATA_SIZE) {
            queue.push_back(frame_agent_record(chunk));
        }
    }

    if process_queue(shared) {
        Ok(())
    } else {
        Err(ClientError::Flow { reason: "agent queue drain failed".into() })
    }
}

fn frame_agent_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MiniHeader::SIZE + payload.len());
    out.extend_from_slice(&MiniHeader::new(msgc::main::AGENT_DATA, payload.len() as u32).to_bytes());
    out.extend_from_slice(payload);
    out
}

/// Announce our capabilities, optionally asking the agent for its own.
fn send_caps(shared: &AgentShared, clipboard_enabled: bool, request: bool) -> Result<(), ClientError> {
    if !shared.is_present() {
        return Err(ClientError::Protocol { reason: "agent is not present".into() });
    }

    let mut caps_word = 0u32;
    let mut request_flag = 0u32;
    if clipboard_enabled {
        request_flag = u32::from(request);
        caps_word |= 1 << agent::cap::CLIPBOARD_BY_DEMAND;
        caps_word |= 1 << agent::cap::CLIPBOARD_SELECTION;
    }

    let mut body = Vec::with_capacity(4 + agent::CAPS_WORDS * 4);
    body.extend_from_slice(&request_flag.to_le_bytes());
    body.extend_from_slice(&caps_word.to_le_bytes());

    start_msg(shared, msg::ANNOUNCE_CAPABILITIES, body.len())?;
    write_msg(shared, &body)
}

/// Public clipboard type to agent code; everything unknown maps to the
/// NONE code.
pub(crate) fn to_agent(ty: DataType) -> u32 {
    match ty {
        DataType::Text => clipboard::UTF8_TEXT,
        DataType::Png => clipboard::IMAGE_PNG,
        DataType::Bmp => clipboard::IMAGE_BMP,
        DataType::Tiff => clipboard::IMAGE_TIFF,
        DataType::Jpeg => clipboard::IMAGE_JPG,
        DataType::None => clipboard::NONE,
    }
}

/// Agent code to public clipboard type; everything unknown maps to
/// [`DataType::None`].
pub(crate) fn from_agent(code: u32) -> DataType {
    match code {
        clipboard::UTF8_TEXT => DataType::Text,
        clipboard::IMAGE_PNG => DataType::Png,
        clipboard::IMAGE_BMP => DataType::Bmp,
        clipboard::IMAGE_TIFF => DataType::Tiff,
        clipboard::IMAGE_JPG => DataType::Jpeg,
        _ => DataType::None,
    }
}

impl SessionHandle {
    /// Ask the agent for the clipboard data it offered. Only valid while
    /// the agent holds the grab and for the offered type.
    pub fn clipboard_request(&self, ty: DataType) -> bool {
        if !self.agent.is_present() {
            return false;
        }
        {
            let cb = self.agent.cb.lock();
            if !cb.agent_grabbed || ty != cb.ty {
                return false;
            }
        }

        let code = to_agent(ty).to_le_bytes();
        let sent = start_msg(&self.agent, msg::CLIPBOARD_REQUEST, code.len())
            .and_then(|()| write_msg(&self.agent, &code));
        if let Err(e) = sent {
            error!("failed to write the clipboard request: {e}");
            return false;
        }
        true
    }

    /// Take clipboard ownership, offering the given types.
    pub fn clipboard_grab(&self, types: &[DataType]) -> bool {
        if !self.agent.is_present() || types.is_empty() {
            return false;
        }

        let selection = self.agent.cb.lock().selection;
        let mut body = Vec::with_capacity(SELECTION_SIZE + types.len() * 4);
        if selection {
            body.extend_from_slice(&[clipboard::SELECTION_CLIPBOARD, 0, 0, 0]);
        }
        for &ty in types {
            body.extend_from_slice(&to_agent(ty).to_le_bytes());
        }

        let sent = start_msg(&self.agent, msg::CLIPBOARD_GRAB, body.len())
            .and_then(|()| write_msg(&self.agent, &body));
        if let Err(e) = sent {
            error!("failed to write the clipboard grab: {e}");
            return false;
        }

        self.agent.cb.lock().client_grabbed = true;
        true
    }

    /// Release a previously taken grab; a no-op success when we hold
    /// none.
    pub fn clipboard_release(&self) -> bool {
        if !self.agent.is_present() {
            return false;
        }

        let (selection, client_grabbed) = {
            let cb = self.agent.cb.lock();
            (cb.selection, cb.client_grabbed)
        };
        if !client_grabbed {
            return true;
        }

        let sent = if selection {
            let body = [clipboard::SELECTION_CLIPBOARD, 0, 0, 0];
            start_msg(&self.agent, msg::CLIPBOARD_RELEASE, body.len())
                .and_then(|()| write_msg(&self.agent, &body))
        } else {
            start_msg(&self.agent, msg::CLIPBOARD_RELEASE, 0)
        };
        if let Err(e) = sent {
            error!("failed to write the clipboard release: {e}");
            return false;
        }

        self.agent.cb.lock().client_grabbed = false;
        true
    }

    /// Open an outbound clipboard transfer of `size` payload bytes; the
    /// bytes follow via [`SessionHandle::clipboard_data`].
    pub fn clipboard_data_start(&self, ty: DataType, size: usize) -> bool {
        if !self.agent.is_present() {
            return false;
        }

        let selection = self.agent.cb.lock().selection;
        let mut head = Vec::with_capacity(SELECTION_SIZE + 4);
        if selection {
            head.extend_from_slice(&[clipboard::SELECTION_CLIPBOARD, 0, 0, 0]);
        }
        head.extend_from_slice(&to_agent(ty).to_le_bytes());

        let sent = start_msg(&self.agent, msg::CLIPBOARD, head.len() + size)
            .and_then(|()| write_msg(&self.agent, &head));
        if let Err(e) = sent {
            error!("failed to open the clipboard transfer: {e}");
            return false;
        }
        true
    }

    /// Append payload bytes to the transfer opened by
    /// [`SessionHandle::clipboard_data_start`].
    pub fn clipboard_data(&self, _ty: DataType, data: &[u8]) -> bool {
        if !self.agent.is_present() {
            return false;
        }
        if let Err(e) = write_msg(&self.agent, data) {
            error!("failed to write clipboard data: {e}");
            return false;
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use parking_lot::Mutex;
    use redlink_proto::agent::{AgentMessage, MAX_DATA_SIZE, clipboard, msg};
    use redlink_proto::channel::msgc;

    use super::{from_agent, process_data, to_agent};
    use crate::config::Config;
    use crate::session::session_with_mocks;
    use crate::types::{ChannelKind, DataType};

    fn agent_record(ty: u32, declared: usize, body: &[u8]) -> Vec<u8> {
        let mut out = AgentMessage::new(ty, declared as u32).to_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    /// A config whose clipboard sinks record what the core surfaced.
    #[allow(clippy::type_complexity)]
    fn clipboard_config() -> (Config, Arc<Mutex<Vec<(DataType, Vec<u8>)>>>, Arc<Mutex<Vec<DataType>>>) {
        let datas = Arc::new(Mutex::new(Vec::new()));
        let notices = Arc::new(Mutex::new(Vec::new()));

        let mut config = Config::default();
        config.clipboard.enable = true;
        let sink = Arc::clone(&datas);
        config.clipboard.data = Some(Box::new(move |ty, bytes: &[u8]| {
            sink.lock().push((ty, bytes.to_vec()));
        }));
        let sink = Arc::clone(&notices);
        config.clipboard.notice = Some(Box::new(move |ty| sink.lock().push(ty)));
        config.clipboard.release = Some(Box::new(|| {}));
        config.clipboard.request = Some(Box::new(|_| {}));

        (config, datas, notices)
    }

    #[test]
    fn type_mapping_is_identity_on_its_domain() {
        for ty in [DataType::Text, DataType::Png, DataType::Bmp, DataType::Tiff, DataType::Jpeg] {
            assert_eq!(from_agent(to_agent(ty)), ty);
        }
        // everything else collapses to NONE in both directions
        assert_eq!(from_agent(to_agent(DataType::None)), DataType::None);
        assert_eq!(from_agent(999), DataType::None);
        assert_eq!(to_agent(DataType::None), clipboard::NONE);
    }

    #[test]
    fn grab_notifies_and_updates_ownership() {
        let (config, _, notices) = clipboard_config();
        let (mut session, _mocks) = session_with_mocks(config);
        session.agent.shared.present.store(true, Ordering::Release);

        let record =
            agent_record(msg::CLIPBOARD_GRAB, 4, &clipboard::UTF8_TEXT.to_le_bytes());
        process_data(&mut session, &record).unwrap();

        assert_eq!(notices.lock().as_slice(), &[DataType::Text]);
        let cb = session.agent.shared.cb.lock();
        assert!(cb.agent_grabbed);
        assert!(!cb.client_grabbed);
        assert_eq!(cb.ty, DataType::Text);
    }

    #[test]
    fn clipboard_transfer_across_two_records() {
        let (config, datas, _) = clipboard_config();
        let (mut session, _mocks) = session_with_mocks(config);
        session.agent.shared.present.store(true, Ordering::Release);

        let payload: Vec<u8> = (0..996u32).map(|i| i as u8).collect();

        // first record: declared size 1000 = type word + 996 payload
        // bytes, of which 500 arrive now
        let mut body = clipboard::UTF8_TEXT.to_le_bytes().to_vec();
        body.extend_from_slice(&payload[..500]);
        process_data(&mut session, &agent_record(msg::CLIPBOARD, 1000, &body)).unwrap();
        assert!(datas.lock().is_empty());

        // continuation record: raw bytes, no outer header
        process_data(&mut session, &payload[500..]).unwrap();

        let surfaced = datas.lock();
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].0, DataType::Text);
        assert_eq!(surfaced[0].1, payload);
        assert!(session.agent.reassembly.is_none());
    }

    #[test]
    fn single_record_transfer_surfaces_immediately() {
        let (config, datas, _) = clipboard_config();
        let (mut session, _mocks) = session_with_mocks(config);
        session.agent.shared.present.store(true, Ordering::Release);

        let mut body = clipboard::UTF8_TEXT.to_le_bytes().to_vec();
        body.extend_from_slice(b"hi");
        process_data(&mut session, &agent_record(msg::CLIPBOARD, 6, &body)).unwrap();

        assert_eq!(datas.lock()[0].1, b"hi");
    }

    #[test]
    fn oversized_continuation_is_fatal() {
        let (config, _, _) = clipboard_config();
        let (mut session, _mocks) = session_with_mocks(config);
        session.agent.shared.present.store(true, Ordering::Release);

        let mut body = clipboard::UTF8_TEXT.to_le_bytes().to_vec();
        body.extend_from_slice(&[1, 2, 3]);
        process_data(&mut session, &agent_record(msg::CLIPBOARD, 14, &body)).unwrap();

        // 7 remain but 8 arrive
        assert!(process_data(&mut session, &[0u8; 8]).is_err());
    }

    #[test]
    fn wrong_agent_protocol_is_fatal() {
        let (mut session, _mocks) = session_with_mocks(Config::default());
        session.agent.shared.present.store(true, Ordering::Release);

        let mut record = AgentMessage::new(msg::CLIPBOARD_RELEASE, 0).to_bytes();
        record[0] = 9; // corrupt the protocol field
        assert!(process_data(&mut session, &record).is_err());
    }

    #[test]
    fn queue_drains_only_with_tokens_and_in_order() {
        let (session, mocks) = session_with_mocks(Config::default());
        let handle = session.handle();
        let main = &mocks[ChannelKind::Main.index()];
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(0);

        // no tokens: the records queue up, nothing hits the wire
        assert!(handle.clipboard_grab(&[DataType::Text, DataType::Png]));
        assert!(main.written_records().is_empty());
        assert_eq!(session.agent.shared.queue.lock().len(), 2);

        // one token: only the outer header record leaves
        session.agent.shared.return_server_tokens(1);
        assert!(super::process_queue(&session.agent.shared));
        assert_eq!(main.written_records().len(), 1);

        // the rest follows once tokens allow
        session.agent.shared.return_server_tokens(5);
        assert!(super::process_queue(&session.agent.shared));
        let records = main.written_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|(ty, _)| *ty == msgc::main::AGENT_DATA));
        assert_eq!(session.agent.shared.server_tokens(), 4);

        let outer = AgentMessage::parse(&records[0].1).unwrap();
        assert_eq!(outer.ty(), msg::CLIPBOARD_GRAB);
        assert_eq!(outer.size(), 8);
        assert_eq!(records[1].1.len(), 8);
    }

    #[test]
    fn zero_sized_message_is_one_record_with_no_fragments() {
        let (session, mocks) = session_with_mocks(Config::default());
        let main = &mocks[ChannelKind::Main.index()];
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(16);

        // a release without the selection capability is a zero-size
        // message
        session.agent.shared.cb.lock().client_grabbed = true;
        assert!(session.handle().clipboard_release());

        let records = main.written_records();
        assert_eq!(records.len(), 1);
        let outer = AgentMessage::parse(&records[0].1).unwrap();
        assert_eq!(outer.ty(), msg::CLIPBOARD_RELEASE);
        assert_eq!(outer.size(), 0);
        assert!(!session.agent.shared.cb.lock().client_grabbed);
    }

    #[test]
    fn large_transfers_fragment_at_the_record_limit() {
        let (session, mocks) = session_with_mocks(Config::default());
        let main = &mocks[ChannelKind::Main.index()];
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(u32::MAX);

        let handle = session.handle();
        let data = vec![0x5A; MAX_DATA_SIZE * 2 + 100];
        assert!(handle.clipboard_data_start(DataType::Png, data.len()));
        assert!(handle.clipboard_data(DataType::Png, &data));

        let records = main.written_records();
        // outer header + type word + three fragments
        assert_eq!(records.len(), 5);
        assert_eq!(records[2].1.len(), MAX_DATA_SIZE);
        assert_eq!(records[3].1.len(), MAX_DATA_SIZE);
        assert_eq!(records[4].1.len(), 100); // remainder
    }

    #[test]
    fn overrunning_the_declared_size_fails() {
        let (session, _mocks) = session_with_mocks(Config::default());
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(u32::MAX);

        let handle = session.handle();
        assert!(handle.clipboard_data_start(DataType::Text, 4));
        assert!(handle.clipboard_data(DataType::Text, &[1, 2, 3, 4]));
        assert!(!handle.clipboard_data(DataType::Text, &[5]));
    }

    #[test]
    fn request_requires_matching_agent_grab() {
        let (session, mocks) = session_with_mocks(Config::default());
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(u32::MAX);
        let handle = session.handle();

        assert!(!handle.clipboard_request(DataType::Text));

        {
            let mut cb = session.agent.shared.cb.lock();
            cb.agent_grabbed = true;
            cb.ty = DataType::Png;
        }
        assert!(!handle.clipboard_request(DataType::Text));
        assert!(handle.clipboard_request(DataType::Png));
        assert!(!mocks[ChannelKind::Main.index()].written_records().is_empty());
    }

    #[test]
    fn announce_capabilities_records_and_answers() {
        let (config, _, _) = clipboard_config();
        let (mut session, mocks) = session_with_mocks(config);
        let main = &mocks[ChannelKind::Main.index()];
        session.agent.shared.present.store(true, Ordering::Release);
        session.agent.shared.set_server_tokens(u32::MAX);

        let mut body = 1u32.to_le_bytes().to_vec(); // request our caps
        body.extend_from_slice(&(1u32 << 5 | 1 << 6).to_le_bytes());
        process_data(&mut session, &agent_record(msg::ANNOUNCE_CAPABILITIES, 8, &body)).unwrap();

        {
            let cb = session.agent.shared.cb.lock();
            assert!(cb.supported);
            assert!(cb.selection);
        }

        // our announcement went out: outer header + body record
        let records = main.written_records();
        assert_eq!(records.len(), 2);
        let outer = AgentMessage::parse(&records[0].1).unwrap();
        assert_eq!(outer.ty(), msg::ANNOUNCE_CAPABILITIES);
    }
}
