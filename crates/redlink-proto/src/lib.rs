//! Wire types for the SPICE client protocol.
//!
//! This crate is the pure data layer shared by the client: the link-phase
//! packets exchanged before authentication, the 6-byte mini-header that
//! frames every record afterwards, capability bitmaps, the per-channel
//! message identifiers, the packed message bodies, the guest-agent
//! (VD_AGENT) framing tunnelled over the MAIN channel, and the
//! offset-relative draw payloads of the DISPLAY channel.
//!
//! Everything on the wire is packed little-endian with no implicit padding.
//! Structs are cast from untrusted bytes via `zerocopy`, so parsing never
//! copies more than the caller asks for and malformed input surfaces as a
//! typed [`WireError`] rather than a panic.

pub mod agent;
pub mod caps;
pub mod channel;
pub mod draw;
mod errors;
pub mod link;
pub mod messages;
mod mini;

pub use errors::{Result, WireError};
pub use mini::MiniHeader;
