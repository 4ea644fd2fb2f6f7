//! The session: connection lifecycle, the readiness loop and the public
//! façade.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use redlink_proto::caps::CapsBitmap;
use redlink_proto::channel::msg;
use redlink_proto::MiniHeader;
use tracing::{error, info};

use crate::agent::{self, Agent, AgentShared};
use crate::channel::{self, Channel, Dispatch};
use crate::config::Config;
use crate::error::{ClientError, Status};
use crate::handle::SessionHandle;
use crate::inputs::{self, InputsShared};
use crate::stream::{Endpoint, Stream};
use crate::types::{ChannelKind, ServerInfo};
use crate::{display, main_channel, playback, record};

/// Outcome of servicing one ready channel for one pass.
#[derive(Debug)]
pub(crate) enum Service {
    /// One message was consumed; the channel may hold more.
    Continue,
    /// No data is available right now.
    Drained,
    /// The peer closed the stream.
    Closed,
}

/// A connected SPICE session.
///
/// All receive-side state lives here and is mutated only by
/// [`Session::process`]; cross-thread submission goes through
/// [`SessionHandle`]. Dropping the session closes every socket.
pub struct Session {
    pub(crate) config: Config,
    endpoint: Endpoint,
    poll: Poll,
    events: Events,
    pub(crate) channels: [Channel; ChannelKind::COUNT],
    pub(crate) session_id: u32,
    channel_id: u8,
    connected: bool,
    /// The channels list has been applied at least once.
    pub(crate) channels_listed: bool,
    ready_fired: bool,
    pub(crate) guest_name: Option<String>,
    pub(crate) guest_uuid: Option<[u8; 16]>,
    pub(crate) kb_modifiers: u16,
    /// MAIN capabilities as reflected by the server (often empty).
    pub(crate) main_caps: Option<(CapsBitmap, CapsBitmap)>,
    pub(crate) inputs: Arc<InputsShared>,
    pub(crate) agent: Agent,
}

impl Session {
    /// Validate the configuration and connect the MAIN channel.
    ///
    /// Further channels connect when the server announces them (policy
    /// permitting) or via [`Session::connect_channel`].
    pub fn connect(config: Config) -> Result<Self, ClientError> {
        config.validate()?;

        let endpoint = if config.port == 0 {
            info!("connecting to unix socket {}", config.host);
            Endpoint::Unix(PathBuf::from(&config.host))
        } else {
            info!("connecting to socket {}:{}", config.host, config.port);
            Endpoint::Tcp(config.host.clone(), config.port)
        };

        let poll = Poll::new()?;
        let channels = ChannelKind::ALL.map(Channel::new);
        let inputs =
            Arc::new(InputsShared::new(Arc::clone(&channels[ChannelKind::Inputs.index()].shared)));
        let agent_shared =
            Arc::new(AgentShared::new(Arc::clone(&channels[ChannelKind::Main.index()].shared)));

        let mut session = Self {
            config,
            endpoint,
            poll,
            events: Events::with_capacity(ChannelKind::COUNT),
            channels,
            session_id: 0,
            channel_id: 0,
            connected: false,
            channels_listed: false,
            ready_fired: false,
            guest_name: None,
            guest_uuid: None,
            kb_modifiers: 0,
            main_caps: None,
            inputs,
            agent: Agent::new(agent_shared),
        };

        if let Err(e) = session.channel_link(ChannelKind::Main.index()) {
            error!("channel connect failed: {e}");
            return Err(e);
        }

        session.connected = true;
        info!("connected");
        Ok(session)
    }

    /// A cloneable, thread-safe handle carrying the submit surfaces.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            Arc::clone(&self.channels[ChannelKind::Main.index()].shared),
            Arc::clone(&self.inputs),
            Arc::clone(&self.channels[ChannelKind::Record.index()].shared),
            Arc::clone(&self.agent.shared),
        )
    }

    /// Drive the session: honour deferred disconnects, wait up to
    /// `timeout` for readiness, then drain one message per ready channel
    /// per pass until every ready channel is out of data.
    pub fn process(&mut self, timeout: Option<Duration>) -> Status {
        for idx in 0..ChannelKind::COUNT {
            if self.channels[idx].init_done && self.channels[idx].do_disconnect {
                self.channel_internal_disconnect(idx);
            }
        }

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Status::Run;
            }
            if !self.connected {
                info!("shutdown");
                return Status::Shutdown;
            }
            error!("readiness wait failed: {e}");
            return Status::ErrPoll;
        }

        let mut ready = [false; ChannelKind::COUNT];
        for event in &self.events {
            if let Token(idx @ 0..ChannelKind::COUNT) = event.token() {
                ready[idx] = true;
            }
        }
        let mut pending: Vec<usize> = (0..ChannelKind::COUNT).filter(|&i| ready[i]).collect();

        // one message per channel per pass so no channel starves another
        while !pending.is_empty() {
            let mut next = Vec::with_capacity(pending.len());
            for idx in pending {
                match self.service_channel(idx) {
                    Ok(Service::Continue) => next.push(idx),
                    Ok(Service::Drained) => {}
                    Ok(Service::Closed) => self.channel_internal_disconnect(idx),
                    Err(e) => return self.fail(e),
                }
            }
            pending = next;
        }

        if self.channels.iter().any(|c| c.shared.is_connected()) {
            return Status::Run;
        }

        self.session_id = 0;
        info!("shutdown");
        Status::Shutdown
    }

    /// Close every channel and clear per-session state. Terminal: a new
    /// session requires a new [`Session::connect`].
    pub fn disconnect(&mut self) {
        let was_connected = self.connected;
        self.connected = false;

        for idx in (0..ChannelKind::COUNT).rev() {
            self.channel_internal_disconnect(idx);
        }

        agent::reset(&mut self.agent);
        self.inputs.release_scratch();
        self.guest_name = None;
        self.guest_uuid = None;

        if was_connected {
            info!("disconnected");
        }
    }

    /// Guest name and UUID, once MAIN has reported them.
    pub fn server_info(&self) -> Option<ServerInfo> {
        let name = self.guest_name.clone()?;
        Some(ServerInfo { name, uuid: self.guest_uuid.unwrap_or_default() })
    }

    /// Modifier state last reported by the INPUTS channel.
    pub fn key_modifiers(&self) -> u16 {
        self.kb_modifiers
    }

    /// Whether the server announced the channel.
    pub fn has_channel(&self, kind: ChannelKind) -> bool {
        self.channels[kind.index()].available
    }

    /// Whether the channel currently holds a socket.
    pub fn channel_connected(&self, kind: ChannelKind) -> bool {
        self.channels[kind.index()].shared.is_connected()
    }

    /// Connect a single announced channel. A failure tears the whole
    /// session down.
    pub fn connect_channel(&mut self, kind: ChannelKind) -> bool {
        let idx = kind.index();
        if !self.channels[idx].available {
            error!(channel = kind.name(), "channel is not available");
            return false;
        }
        if self.channels[idx].shared.is_connected() {
            return true;
        }
        self.connect_channel_inner(idx).is_ok()
    }

    /// Schedule a single channel for disconnection at the next
    /// `process` call.
    pub fn disconnect_channel(&mut self, kind: ChannelKind) -> bool {
        let idx = kind.index();
        if !self.channels[idx].available {
            error!(channel = kind.name(), "channel is not available");
            return false;
        }
        if self.channels[idx].shared.is_connected() {
            self.channels[idx].do_disconnect = true;
        }
        true
    }

    /// Connect + post-connect hook, with full teardown on failure.
    pub(crate) fn connect_channel_inner(&mut self, idx: usize) -> Result<(), ClientError> {
        let kind = self.channels[idx].kind;

        if let Err(e) = self.channel_link(idx) {
            self.disconnect();
            error!(channel = kind.name(), "failed to connect channel: {e}");
            return Err(e);
        }
        info!(channel = kind.name(), "channel connected");

        if kind != ChannelKind::Display {
            return Ok(());
        }
        if let Err(e) = display::on_connect(self, idx) {
            self.disconnect();
            error!(channel = kind.name(), "failed to initialise channel: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Open the socket and run the link handshake for one channel.
    fn channel_link(&mut self, idx: usize) -> Result<(), ClientError> {
        let kind = self.channels[idx].kind;
        {
            let ch = &mut self.channels[idx];
            ch.do_disconnect = false;
            ch.init_done = false;
            ch.ack_frequency = 0;
            ch.ack_count = 0;
            ch.framer.reset();
            ch.pending = None;
        }

        let stream = Stream::connect(&self.endpoint)?;

        let packet = channel::build_connect_packet(
            self.session_id,
            self.channel_id,
            kind.wire_type(),
            &channel::common_caps(),
            &self.channel_link_caps(kind),
        );

        let mut s: &Stream = &stream;
        let reflected =
            channel::link_handshake(&mut s, kind.name(), &packet, &self.config.password)?;

        if kind == ChannelKind::Main {
            main_channel::accept_caps(self, reflected);
        }

        stream.set_nonblocking(true)?;
        if let Some(fd) = stream.raw_fd() {
            self.poll.registry().register(&mut SourceFd(&fd), Token(idx), Interest::READABLE)?;
            self.channels[idx].registered = true;
        }

        self.channels[idx].shared.install(stream);
        self.channels[idx].shared.set_ready(true);
        Ok(())
    }

    /// The channel-specific capabilities to advertise for `kind`.
    fn channel_link_caps(&self, kind: ChannelKind) -> CapsBitmap {
        match kind {
            ChannelKind::Main => main_channel::link_caps(),
            ChannelKind::Inputs => inputs::link_caps(),
            ChannelKind::Playback => playback::link_caps(&self.config),
            ChannelKind::Record => record::link_caps(&self.config),
            ChannelKind::Display => display::link_caps(),
        }
    }

    /// Tear one channel down: farewell, deregistration, socket close and
    /// framing reset.
    pub(crate) fn channel_internal_disconnect(&mut self, idx: usize) {
        if !self.channels[idx].shared.is_connected() {
            return;
        }

        if self.channels[idx].shared.is_ready() {
            self.channels[idx].shared.set_ready(false);
            channel::send_farewell(&self.channels[idx].shared);
        }

        if self.channels[idx].registered {
            let fd = self.channels[idx].shared.stream().as_ref().and_then(Stream::raw_fd);
            if let Some(fd) = fd {
                let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
            }
            self.channels[idx].registered = false;
        }

        if let Some(stream) = self.channels[idx].shared.take_stream() {
            stream.shutdown_write();
        }

        self.channels[idx].framer.reset();
        self.channels[idx].pending = None;
        self.channels[idx].do_disconnect = false;

        info!(channel = self.channels[idx].kind.name(), "channel disconnected");
    }

    /// Advance one channel until it has consumed one message, run dry,
    /// or closed.
    pub(crate) fn service_channel(&mut self, idx: usize) -> Result<Service, ClientError> {
        use crate::framer::Step;

        let shared = Arc::clone(&self.channels[idx].shared);
        loop {
            let step = {
                let guard = shared.stream();
                let Some(stream) = guard.as_ref() else {
                    return Ok(Service::Closed);
                };
                let mut reader: &Stream = stream;
                self.channels[idx].framer.advance(&mut reader)?
            };

            match step {
                Step::Progress => {}
                Step::NoData => return Ok(Service::Drained),
                Step::Closed => return Ok(Service::Closed),
                Step::Discarded => return Ok(Service::Continue),
                Step::Header(header) => {
                    self.channels[idx].ack()?;
                    match self.select_dispatch(idx, &header) {
                        Dispatch::Fatal => {
                            let name = self.channels[idx].kind.name();
                            return Err(ClientError::Protocol {
                                reason: format!("{name}: invalid message {}", header.ty()),
                            });
                        }
                        Dispatch::Discard => self.channels[idx].framer.begin_discard(header.size()),
                        Dispatch::Handle(handler) => {
                            self.channels[idx].pending = Some(handler);
                            self.channels[idx].framer.begin_payload(header.size());
                        }
                    }
                }
                Step::Message => {
                    let handler = self.channels[idx].pending.take();
                    let (buf, len) = self.channels[idx].framer.take_payload();
                    let result = match handler {
                        Some(handler) => handler(self, idx, &buf[..len]),
                        None => Ok(()),
                    };
                    self.channels[idx].framer.restore_payload(buf);
                    result?;
                    return Ok(Service::Continue);
                }
            }
        }
    }

    /// Map `(channel, type)` onto a handler in one step.
    fn select_dispatch(&mut self, idx: usize, header: &MiniHeader) -> Dispatch {
        if header.ty() < msg::FIRST_AVAIL {
            return channel::base_select(header);
        }
        match self.channels[idx].kind {
            ChannelKind::Main => main_channel::select(self, idx, header),
            ChannelKind::Inputs => inputs::select(self, idx, header),
            ChannelKind::Playback => playback::select(self, idx, header),
            ChannelKind::Record => record::select(self, idx, header),
            ChannelKind::Display => display::select(self, idx, header),
        }
    }

    /// Log a failure, tear the session down when it is unrecoverable,
    /// and map it onto the `process` status.
    pub(crate) fn fail(&mut self, e: ClientError) -> Status {
        error!("{e}");
        if e.is_fatal() {
            self.disconnect();
        }
        e.status()
    }

    /// Fire the one-shot ready callback once the session is fully up:
    /// MAIN initialised, the channels list applied and the guest
    /// identity known.
    ///
    /// Identity is only awaited while the name/UUID capability holds:
    /// assumed when the server reflected nothing (many don't), honoured
    /// when a populated bitmap was reflected.
    pub(crate) fn maybe_ready(&mut self) {
        if self.ready_fired {
            return;
        }
        let main_init = self.channels[ChannelKind::Main.index()].init_done;
        if !main_init || !self.channels_listed {
            return;
        }

        let awaits_identity = self.main_caps.as_ref().is_none_or(|(_, channel)| {
            channel.is_empty() || channel.has(redlink_proto::caps::main::NAME_AND_UUID)
        });
        if awaits_identity && (self.guest_name.is_none() || self.guest_uuid.is_none()) {
            return;
        }

        self.ready_fired = true;
        if let Some(ready) = self.config.ready.as_mut() {
            ready();
        }
    }
}

#[cfg(test)]
pub(crate) use test_support::session_with_mocks;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_support {
    use super::{Agent, AgentShared, Channel, ChannelKind, Config, InputsShared, Session};
    use crate::testing::MockStream;
    use mio::{Events, Poll};
    use std::sync::Arc;

    /// Build a session whose channels are all backed by scripted mock
    /// streams, connected and ready, with no real sockets anywhere.
    pub(crate) fn session_with_mocks(config: Config) -> (Session, Vec<MockStream>) {
        let poll = Poll::new().unwrap();
        let channels = ChannelKind::ALL.map(Channel::new);
        let inputs =
            Arc::new(InputsShared::new(Arc::clone(&channels[ChannelKind::Inputs.index()].shared)));
        let agent_shared =
            Arc::new(AgentShared::new(Arc::clone(&channels[ChannelKind::Main.index()].shared)));

        let mut mocks = Vec::new();
        for channel in &channels {
            let mock = MockStream::new();
            channel.shared.install(crate::stream::Stream::Mock(mock.clone()));
            channel.shared.set_ready(true);
            mocks.push(mock);
        }

        let session = Session {
            config,
            endpoint: crate::stream::Endpoint::Tcp("mock".into(), 1),
            poll,
            events: Events::with_capacity(ChannelKind::COUNT),
            channels,
            session_id: 0,
            channel_id: 0,
            connected: true,
            channels_listed: false,
            ready_fired: false,
            guest_name: None,
            guest_uuid: None,
            kb_modifiers: 0,
            main_caps: None,
            inputs,
            agent: Agent::new(agent_shared),
        };

        (session, mocks)
    }
}
