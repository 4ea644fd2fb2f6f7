//! The caller-supplied configuration surface.
//!
//! Channel policy is two bits per channel (`enable`, `auto_connect`);
//! data leaves the core through boxed sinks. Sinks marked optional in
//! their doc comment may be omitted; all others are mandatory once the
//! group is enabled, validated when the session connects. Volume and
//! mute sinks additionally control whether the VOLUME capability is
//! advertised on the audio channels.

use crate::error::ClientError;
use crate::types::{AudioFormat, DataType, DrawBitmap, DrawFill, SurfaceFormat};

/// Host sink: no arguments, no result.
pub(crate) type Hook = Box<dyn FnMut() + Send>;

/// Configuration for [`crate::Session::connect`].
#[derive(Default)]
pub struct Config {
    /// DNS name, dotted-quad, or a filesystem path when `port` is zero.
    pub host: String,
    /// TCP port; zero selects a UNIX-domain socket at `host`.
    pub port: u16,
    /// The SPICE ticket.
    pub password: String,
    /// One-shot callback fired when the session is fully up: MAIN has
    /// initialised, the channels list has arrived and the guest identity
    /// is known.
    pub ready: Option<Hook>,
    /// INPUTS channel policy.
    pub inputs: InputsPolicy,
    /// Clipboard integration over the guest agent.
    pub clipboard: ClipboardConfig,
    /// PLAYBACK channel policy and sinks.
    pub playback: PlaybackConfig,
    /// RECORD channel policy and sinks.
    pub record: RecordConfig,
    /// DISPLAY channel policy and sinks.
    pub display: DisplayConfig,
}

/// Policy bits for the INPUTS channel, which has no sinks.
#[derive(Default)]
pub struct InputsPolicy {
    /// Connect-ability of the channel.
    pub enable: bool,
    /// Connect as soon as the server announces the channel.
    pub auto_connect: bool,
}

/// Clipboard sinks; all four are mandatory when enabled.
#[derive(Default)]
pub struct ClipboardConfig {
    /// Enable clipboard support.
    pub enable: bool,
    /// The agent offers data of the given type.
    pub notice: Option<Box<dyn FnMut(DataType) + Send>>,
    /// A complete clipboard transfer arrived.
    pub data: Option<Box<dyn FnMut(DataType, &[u8]) + Send>>,
    /// The agent's offer is withdrawn.
    pub release: Option<Hook>,
    /// The agent asks for our clipboard data of the given type.
    pub request: Option<Box<dyn FnMut(DataType) + Send>>,
}

/// Playback sinks; start, stop and data are mandatory when enabled.
#[derive(Default)]
pub struct PlaybackConfig {
    /// Enable the channel.
    pub enable: bool,
    /// Connect as soon as the server announces the channel.
    pub auto_connect: bool,
    /// A stream opens: channels, sample rate, format, stream time.
    pub start: Option<Box<dyn FnMut(u32, u32, AudioFormat, u32) + Send>>,
    /// Optional: per-channel volume. Presence advertises the VOLUME
    /// capability.
    pub volume: Option<Box<dyn FnMut(&[u16]) + Send>>,
    /// Optional: mute state. Presence advertises the VOLUME capability.
    pub mute: Option<Box<dyn FnMut(bool) + Send>>,
    /// The stream closes.
    pub stop: Option<Hook>,
    /// Raw samples for the open stream.
    pub data: Option<Box<dyn FnMut(&[u8]) + Send>>,
}

/// Record sinks; start and stop are mandatory when enabled.
#[derive(Default)]
pub struct RecordConfig {
    /// Enable the channel.
    pub enable: bool,
    /// Connect as soon as the server announces the channel.
    pub auto_connect: bool,
    /// A capture stream opens: channels, sample rate, format.
    pub start: Option<Box<dyn FnMut(u32, u32, AudioFormat) + Send>>,
    /// Optional: per-channel volume. Presence advertises the VOLUME
    /// capability.
    pub volume: Option<Box<dyn FnMut(&[u16]) + Send>>,
    /// Optional: mute state. Presence advertises the VOLUME capability.
    pub mute: Option<Box<dyn FnMut(bool) + Send>>,
    /// The capture stream closes.
    pub stop: Option<Hook>,
}

/// Display sinks; all four are mandatory when enabled.
#[derive(Default)]
pub struct DisplayConfig {
    /// Enable the channel.
    pub enable: bool,
    /// Connect as soon as the server announces the channel.
    pub auto_connect: bool,
    /// A surface came into existence.
    pub surface_create: Option<Box<dyn FnMut(u32, SurfaceFormat, u32, u32) + Send>>,
    /// A surface is gone.
    pub surface_destroy: Option<Box<dyn FnMut(u32) + Send>>,
    /// Draw an uncompressed bitmap.
    pub draw_bitmap: Option<Box<dyn FnMut(&DrawBitmap<'_>) + Send>>,
    /// Fill a region with a solid colour.
    pub draw_fill: Option<Box<dyn FnMut(&DrawFill) + Send>>,
}

impl Config {
    /// Check that every enabled group carries its mandatory sinks.
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        fn require(present: bool, reason: &'static str) -> Result<(), ClientError> {
            if present { Ok(()) } else { Err(ClientError::Policy { reason }) }
        }

        if self.clipboard.enable {
            require(self.clipboard.notice.is_some(), "clipboard.notice is mandatory")?;
            require(self.clipboard.data.is_some(), "clipboard.data is mandatory")?;
            require(self.clipboard.release.is_some(), "clipboard.release is mandatory")?;
            require(self.clipboard.request.is_some(), "clipboard.request is mandatory")?;
        }

        if self.playback.enable {
            require(self.playback.start.is_some(), "playback.start is mandatory")?;
            require(self.playback.stop.is_some(), "playback.stop is mandatory")?;
            require(self.playback.data.is_some(), "playback.data is mandatory")?;
        }

        if self.record.enable {
            require(self.record.start.is_some(), "record.start is mandatory")?;
            require(self.record.stop.is_some(), "record.stop is mandatory")?;
        }

        if self.display.enable {
            require(self.display.surface_create.is_some(), "display.surface_create is mandatory")?;
            require(self.display.surface_destroy.is_some(), "display.surface_destroy is mandatory")?;
            require(self.display.draw_bitmap.is_some(), "display.draw_bitmap is mandatory")?;
            require(self.display.draw_fill.is_some(), "display.draw_fill is mandatory")?;
        }

        Ok(())
    }

    /// Policy bits for a channel slot. MAIN is always connected
    /// explicitly, never by policy.
    pub(crate) fn policy(&self, kind: crate::types::ChannelKind) -> (bool, bool) {
        use crate::types::ChannelKind as K;
        match kind {
            K::Main => (false, false),
            K::Inputs => (self.inputs.enable, self.inputs.auto_connect),
            K::Playback => (self.playback.enable, self.playback.auto_connect),
            K::Record => (self.record.enable, self.record.auto_connect),
            K::Display => (self.display.enable, self.display.auto_connect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::error::ClientError;

    #[test]
    fn empty_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn enabled_clipboard_requires_all_sinks() {
        let mut config = Config::default();
        config.clipboard.enable = true;
        config.clipboard.notice = Some(Box::new(|_| {}));
        config.clipboard.data = Some(Box::new(|_, _| {}));
        config.clipboard.release = Some(Box::new(|| {}));

        let err = config.validate().err();
        assert!(matches!(
            err,
            Some(ClientError::Policy { reason: "clipboard.request is mandatory" })
        ));

        config.clipboard.request = Some(Box::new(|_| {}));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_playback_requires_data_sink() {
        let mut config = Config::default();
        config.playback.enable = true;
        config.playback.start = Some(Box::new(|_, _, _, _| {}));
        config.playback.stop = Some(Box::new(|| {}));
        assert!(matches!(
            config.validate(),
            Err(ClientError::Policy { reason: "playback.data is mandatory" })
        ));
    }
}
