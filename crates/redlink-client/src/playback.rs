//! PLAYBACK channel: raw PCM out of the guest.

use redlink_proto::MiniHeader;
use redlink_proto::caps::{self, CapsBitmap};
use redlink_proto::channel::{audio, msg};
use redlink_proto::messages::{AudioMute, AudioPacket, PlaybackStart, parse_audio_volume};

use crate::channel::Dispatch;
use crate::config::Config;
use crate::error::ClientError;
use crate::session::Session;
use crate::types::AudioFormat;

/// PLAYBACK advertises VOLUME only when the host can consume volume or
/// mute changes.
pub(crate) fn link_caps(config: &Config) -> CapsBitmap {
    let mut bits = CapsBitmap::with_words(caps::cap_words(caps::playback::OPUS));
    if config.playback.volume.is_some() || config.playback.mute.is_some() {
        bits.set(caps::playback::VOLUME);
    }
    bits
}

pub(crate) fn select(session: &mut Session, idx: usize, header: &MiniHeader) -> Dispatch {
    session.channels[idx].init_done = true;

    match header.ty() {
        msg::playback::START => Dispatch::Handle(on_start),
        msg::playback::MODE => Dispatch::Discard,
        msg::playback::DATA => Dispatch::Handle(on_data),
        msg::playback::STOP => Dispatch::Handle(on_stop),
        msg::playback::VOLUME => {
            if session.config.playback.volume.is_some() {
                Dispatch::Handle(on_volume)
            } else {
                Dispatch::Discard
            }
        }
        msg::playback::MUTE => {
            if session.config.playback.mute.is_some() {
                Dispatch::Handle(on_mute)
            } else {
                Dispatch::Discard
            }
        }
        _ => Dispatch::Fatal,
    }
}

fn on_start(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = PlaybackStart::parse(payload)?;

    let format =
        if msg.format.get() == audio::FMT_S16 { AudioFormat::S16 } else { AudioFormat::Invalid };

    if let Some(start) = session.config.playback.start.as_mut() {
        start(msg.channels.get(), msg.frequency.get(), format, msg.time.get());
    }
    Ok(())
}

fn on_data(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let (_, samples) = AudioPacket::parse(payload)?;
    if let Some(data) = session.config.playback.data.as_mut() {
        data(samples);
    }
    Ok(())
}

fn on_stop(session: &mut Session, _idx: usize, _payload: &[u8]) -> Result<(), ClientError> {
    if let Some(stop) = session.config.playback.stop.as_mut() {
        stop();
    }
    Ok(())
}

fn on_volume(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let volume = parse_audio_volume(payload)?;
    if let Some(sink) = session.config.playback.volume.as_mut() {
        sink(&volume);
    }
    Ok(())
}

fn on_mute(session: &mut Session, _idx: usize, payload: &[u8]) -> Result<(), ClientError> {
    let msg = AudioMute::parse(payload)?;
    if let Some(mute) = session.config.playback.mute.as_mut() {
        mute(msg.mute != 0);
    }
    Ok(())
}
