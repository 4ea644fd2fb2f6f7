//! RECORD channel: raw PCM into the guest.

use redlink_proto::MiniHeader;
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{audio, msg, msgc};
use redlink_proto::messages::{AudioMute, AudioPacket, RecordStart, parse_audio_volume};
use tracing::error;
use zerocopy::IntoBytes;

use crate::channel::Dispatch;
use crate::config::Config;
use crate::error::ClientError;
use crate::handle::SessionHandle;
use crate::session::Session;
use crate::types::AudioFormat;

/// RECORD advertises VOLUME only when the host can consume volume or
/// mute changes.
pub(crate) fn link_caps(config: &Config) -> CapsBitmap {
    let mut bits = CapsBitmap::with_words(caps::cap_words(caps::record::OPUS));
    if config.record.volume.is_some() || config.record.mute.is_some() {
        bits.set(caps::record::VOLUME);
    }
    bits
}

pub(crate) fn select(session: &mut Session, idx: usize, header: &MiniHeader) -> Dispatch {
    session.channels[idx].init_done = true;

    match header.ty() {
        msg::record::START => Dispatch::Handle(on_start),
        msg::record::STOP => Dispatch::Handle(on_stop),
        msg::record::VOLUME => {
            if session.config.record.volume.is_some() {
                Dispatch::Handle(on_volume)
            } else {
                Dispatch::Discard
            }
        }
        msg::record::MUTE => {
            if session.config.record.mute.is_some() {
                Dispatch::Handle(on_mute)
            } else {
                Dispatch::Discard
            }
        }
        _ => Dispatch::Fatal,
    }
}

fn on_start(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = RecordStart::parse(payload)?;

    let format =
        if msg.format.get() == audio::FMT_S16 { AudioFormat::S16 } else { AudioFormat::Invalid };

    if let Some(start) = session.config.record.start.as_mut() {
        start(msg.channels.get(), msg.frequency.get(), format);
    }
    Ok(())
}

fn on_stop(session: &mut Session, _idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    if let Some(stop) = session.config.record.stop.as_mut() {
        stop();
    }
    Ok(())
}

fn on_volume(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let volume = parse_audio_volume(payload)?;
    if let Some(sink) = session.config.record.volume.as_mut() {
        sink(&volume);
    }
    Ok(())
}

fn on_mute(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = AudioMute::parse(payload)?;
    if let Some(mute) = session.config.record.mute.as_mut() {
        mute(msg.mute != 0);
    }
    Ok(())
}

impl SessionHandle {
    /// Submit captured audio frames with their stream time. The record
    /// header and the samples are written back-to-back under the
    /// channel's send lock.
    pub fn write_audio(&self, data: &[u8], time: u32) -> bool {
        if !self.record.is_connected() {
            return false;
        }

        let head = AudioPacket::new(time);
        if let Err(e) =
            self.record.send_packet(msgc::record::DATA, &[head.as_bytes(), data])
        {
            error!("failed to write the captured audio: {e}");
            return false;
        }
        true
    }
}
