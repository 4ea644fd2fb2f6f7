//! A client for the SPICE remote-desktop protocol.
//!
//! The client opens one socket per logical channel (MAIN, INPUTS,
//! PLAYBACK, RECORD, DISPLAY), performs link negotiation and ticket
//! authentication on each, then multiplexes mini-header framed traffic
//! through a single readiness loop. The guest-agent side-protocol for
//! clipboard integration is tunnelled over MAIN with token-based flow
//! control.
//!
//! The split surfaces mirror the threading model: a [`Session`] owns all
//! receive-side state and makes progress only inside
//! [`Session::process`], while a cloneable [`SessionHandle`] carries the
//! submit entry points (keyboard, mouse, clipboard, captured audio) and
//! may be used from any thread.
//!
//! ```no_run
//! use redlink_client::{Config, Session, Status};
//!
//! let mut config = Config::default();
//! config.host = "127.0.0.1".into();
//! config.port = 5900;
//! config.password = "ticket".into();
//! config.inputs.enable = true;
//! config.inputs.auto_connect = true;
//!
//! let mut session = Session::connect(config)?;
//! let input = session.handle();
//! loop {
//!     match session.process(Some(std::time::Duration::from_millis(10))) {
//!         Status::Run => {}
//!         Status::Shutdown => break,
//!         status => return Err(format!("session failed: {status:?}").into()),
//!     }
//!     input.mouse_motion(1, 0);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Logging goes through `tracing`; install a subscriber to see it.

mod agent;
mod channel;
mod config;
mod display;
mod error;
mod framer;
mod handle;
mod inputs;
mod main_channel;
mod playback;
mod record;
mod session;
mod stream;
#[cfg(test)]
mod testing;
mod types;

pub use config::{
    ClipboardConfig, Config, DisplayConfig, InputsPolicy, PlaybackConfig, RecordConfig,
};
pub use error::{ClientError, Status};
pub use handle::SessionHandle;
pub use session::Session;
pub use types::{
    AudioFormat, ChannelKind, DataType, DrawBitmap, DrawFill, ServerInfo, SurfaceFormat,
};
