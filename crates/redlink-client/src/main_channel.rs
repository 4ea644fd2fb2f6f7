//! MAIN channel: session init, the channels list, guest identity and the
//! agent lifecycle.

use redlink_proto::MiniHeader;
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{mouse, msg, msgc};
use redlink_proto::messages::{
    MainInit, MainUuid, MouseModeRequest, parse_channels_list, parse_main_name,
};
use tracing::{error, warn};
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::U32;

use crate::agent;
use crate::channel::{ChannelShared, Dispatch};
use crate::error::ClientError;
use crate::session::Session;
use crate::types::ChannelKind;

/// MAIN link capabilities: token-carrying agent announcements and the
/// guest name/UUID messages.
pub(crate) fn link_caps() -> CapsBitmap {
    let mut bits = CapsBitmap::with_words(caps::cap_words(caps::main::SEAMLESS_MIGRATE));
    bits.set(caps::main::AGENT_CONNECTED_TOKENS);
    bits.set(caps::main::NAME_AND_UUID);
    bits
}

/// Record the server's reflected MAIN capabilities.
///
/// Several servers fail to reflect MAIN capabilities at all, so the
/// token and name/UUID capabilities are assumed supported regardless of
/// the echoed bitmap; the reflection is kept only for diagnostics.
pub(crate) fn accept_caps(session: &mut Session, reflected: (CapsBitmap, CapsBitmap)) {
    if reflected.1.is_empty() {
        warn!("server reflected no MAIN capabilities; assuming tokens and name/uuid");
    }
    session.main_caps = Some(reflected);
}

/// Ask the server for a mouse mode.
pub(crate) fn request_mouse_mode(main: &ChannelShared, server: bool) -> Result<(), ClientError> {
    let mode = if server { mouse::MODE_SERVER } else { mouse::MODE_CLIENT };
    let msg = MouseModeRequest::new(mode);
    main.send_packet(msgc::main::MOUSE_MODE_REQUEST, &[msg.as_bytes()])
}

pub(crate) fn select(session: &mut Session, idx: usize, header: &MiniHeader) -> Dispatch {
    let channel = &mut session.channels[idx];

    if !channel.init_done {
        if header.ty() == msg::main::INIT {
            channel.init_done = true;
            return Dispatch::Handle(on_init);
        }
        error!("expected the session init message but got {}", header.ty());
        return Dispatch::Fatal;
    }

    match header.ty() {
        msg::main::CHANNELS_LIST => Dispatch::Handle(on_channels_list),
        msg::main::MOUSE_MODE | msg::main::MULTI_MEDIA_TIME => Dispatch::Discard,
        msg::main::AGENT_CONNECTED => Dispatch::Handle(on_agent_connected),
        msg::main::AGENT_CONNECTED_TOKENS => Dispatch::Handle(on_agent_connected_tokens),
        msg::main::AGENT_DISCONNECTED => Dispatch::Handle(on_agent_disconnected),
        msg::main::AGENT_DATA => {
            if session.agent.shared.is_present() {
                Dispatch::Handle(on_agent_data)
            } else {
                Dispatch::Discard
            }
        }
        msg::main::AGENT_TOKEN => Dispatch::Handle(on_agent_token),
        msg::main::NAME => Dispatch::Handle(on_name),
        msg::main::UUID => Dispatch::Handle(on_uuid),
        _ => Dispatch::Discard,
    }
}

fn on_init(session: &mut Session, idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = MainInit::parse(payload)?;

    session.session_id = msg.session_id.get();
    session.agent.shared.set_server_tokens(msg.agent_tokens.get());

    if msg.agent_connected.get() != 0 {
        agent::connect(session)?;
    }

    if msg.current_mouse_mode.get() != u32::from(mouse::MODE_CLIENT) {
        let main = &session.channels[idx].shared;
        request_mouse_mode(main, false).map_err(|e| {
            error!("failed to set the initial mouse mode: {e}");
            e
        })?;
    }

    session.channels[idx].shared.send_packet(msgc::main::ATTACH_CHANNELS, &[])
}

fn on_channels_list(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let entries = parse_channels_list(payload)?;

    for channel in &mut session.channels {
        channel.available = false;
    }
    for entry in &entries {
        if let Some(channel) =
            session.channels.iter_mut().find(|c| c.kind.wire_type() == entry.ty)
        {
            channel.available = true;
        }
    }

    // channels are attempted in declared order, not announcement order
    for idx in 0..ChannelKind::COUNT {
        let kind = session.channels[idx].kind;
        let (enable, auto_connect) = session.config.policy(kind);
        if session.channels[idx].available
            && enable
            && auto_connect
            && !session.channels[idx].shared.is_connected()
        {
            session.connect_channel_inner(idx)?;
        }
    }

    session.channels_listed = true;
    session.maybe_ready();
    Ok(())
}

fn on_name(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let name = parse_main_name(payload)?;
    session.guest_name = Some(String::from_utf8_lossy(name).into_owned());
    session.maybe_ready();
    Ok(())
}

fn on_uuid(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = MainUuid::parse(payload)?;
    session.guest_uuid = Some(msg.uuid);
    session.maybe_ready();
    Ok(())
}

fn on_agent_connected(session: &mut Session, _idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    agent::connect(session)
}

fn on_agent_connected_tokens(
    session: &mut Session,
    _idx: usize,
    payload: &[u8],
) -> Result<(), ClientError> {
    let tokens = read_u32(payload)?;
    session.agent.shared.set_server_tokens(tokens);
    agent::connect(session)
}

fn on_agent_disconnected(
    session: &mut Session,
    _idx: usize,
    payload: &[u8],
) -> Result<(), ClientError> {
    let error = read_u32(payload)?;
    agent::reset(&mut session.agent);
    warn!("disconnected from the spice guest agent: {error}");
    Ok(())
}

fn on_agent_data(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    agent::process_data(session, payload).map_err(|e| {
        error!("failed to process agent data: {e}");
        e
    })
}

fn on_agent_token(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let tokens = read_u32(payload)?;
    session.agent.shared.return_server_tokens(tokens);
    if !agent::process_queue(&session.agent.shared) {
        return Err(ClientError::Flow { reason: "failed to drain the agent queue".into() });
    }
    Ok(())
}

/// Checked little-endian `u32` read used by the token messages.
fn read_u32(payload: &[u8]) -> Result<u32, ClientError> {
    use zerocopy::FromBytes;
    let (value, _) = U32::read_from_prefix(payload)
        .map_err(|_| redlink_proto::WireError::TooShort { expected: 4, actual: payload.len() })?;
    Ok(value.get())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use redlink_proto::channel::{msg, msgc};
    use redlink_proto::messages::parse_channels_list;
    use zerocopy::IntoBytes;

    use crate::config::Config;
    use crate::session::session_with_mocks;
    use crate::session::Service;
    use crate::types::ChannelKind;

    fn main_init_payload(
        session_id: u32,
        mouse_mode: u32,
        agent_connected: u32,
        agent_tokens: u32,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for field in [session_id, 1, 3, mouse_mode, agent_connected, agent_tokens, 0, 0] {
            out.extend_from_slice(field.as_bytes());
        }
        out
    }

    #[test]
    fn init_records_session_and_attaches_channels() {
        let (mut session, mocks) = session_with_mocks(Config::default());
        let main = &mocks[ChannelKind::Main.index()];
        main.push_record(msg::main::INIT, &main_init_payload(0xbeef, 2, 0, 10));

        assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        assert_eq!(session.session_id, 0xbeef);
        assert!(session.channels[0].init_done);

        let records = main.written_records();
        assert_eq!(records, vec![(msgc::main::ATTACH_CHANNELS, Vec::new())]);
    }

    #[test]
    fn init_requests_client_mouse_mode_when_needed() {
        let (mut session, mocks) = session_with_mocks(Config::default());
        let main = &mocks[ChannelKind::Main.index()];
        // server mouse mode is 1: the client asks for mode 2
        main.push_record(msg::main::INIT, &main_init_payload(1, 1, 0, 0));

        assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        let records = main.written_records();
        assert_eq!(records[0].0, msgc::main::MOUSE_MODE_REQUEST);
        assert_eq!(records[0].1, 2u16.as_bytes());
        assert_eq!(records[1].0, msgc::main::ATTACH_CHANNELS);
    }

    #[test]
    fn non_init_first_message_is_fatal() {
        let (mut session, mocks) = session_with_mocks(Config::default());
        mocks[0].push_record(msg::main::CHANNELS_LIST, &0u32.to_le_bytes());

        assert!(session.service_channel(0).is_err());
    }

    #[test]
    fn channels_list_marks_availability() {
        let (mut session, mocks) = session_with_mocks(Config::default());
        session.channels[0].init_done = true;

        // INPUTS (3) and PLAYBACK (5) announced; nothing auto-connects
        // because no policy bits are set
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[3, 0, 5, 0]);
        mocks[0].push_record(msg::main::CHANNELS_LIST, &payload);

        assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        assert!(session.has_channel(ChannelKind::Inputs));
        assert!(session.has_channel(ChannelKind::Playback));
        assert!(!session.has_channel(ChannelKind::Record));
        assert!(session.channels_listed);

        // a second list clears stale flags
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[3, 0]);
        mocks[0].push_record(msg::main::CHANNELS_LIST, &payload);
        assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        assert!(!session.has_channel(ChannelKind::Playback));
    }

    #[test]
    fn ready_fires_once_identity_and_channels_are_known() {
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let observer = std::sync::Arc::clone(&fired);

        let mut config = Config::default();
        config.ready = Some(Box::new(move || {
            observer.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        let (mut session, mocks) = session_with_mocks(config);
        session.channels[0].init_done = true;
        let main = &mocks[0];

        let mut name = 6u32.to_le_bytes().to_vec();
        name.extend_from_slice(b"guest\0");
        main.push_record(msg::main::NAME, &name);
        main.push_record(msg::main::UUID, &[7u8; 16]);
        main.push_record(msg::main::CHANNELS_LIST, &0u32.to_le_bytes());

        for _ in 0..3 {
            assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        }

        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        let info = session.server_info().unwrap();
        assert_eq!(info.name, "guest");
        assert_eq!(info.uuid, [7u8; 16]);

        // identity updates do not re-fire
        main.push_record(msg::main::UUID, &[9u8; 16]);
        assert!(matches!(session.service_channel(0), Ok(Service::Continue)));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn channels_list_payload_shape() {
        // guard the helper the handler relies on
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[2, 1]);
        let entries = parse_channels_list(&payload).unwrap();
        assert_eq!(entries[0].ty, 2);
        assert_eq!(entries[0].channel_id, 1);
    }
}
