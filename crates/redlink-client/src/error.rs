//! Client error and status types.

use redlink_proto::WireError;
use thiserror::Error;

/// Outcome of one [`crate::Session::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// At least one channel is still connected; call `process` again.
    Run,
    /// Every channel is gone; the session is over.
    Shutdown,
    /// The readiness wait itself failed.
    ErrPoll,
    /// A read, parse or handler failed.
    ErrRead,
    /// An acknowledgment could not be sent.
    ErrAck,
}

/// Everything that can go wrong inside the client.
///
/// Submit surfaces swallow these into a `bool` and log the cause; only
/// `process` and `connect` expose them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure.
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be parsed.
    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    /// The peer violated the protocol.
    #[error("protocol: {reason}")]
    Protocol {
        /// What the peer did wrong.
        reason: String,
    },

    /// Link negotiation or ticket authentication was rejected.
    #[error("authentication: {reason}")]
    Auth {
        /// Why the link failed.
        reason: String,
    },

    /// Flow-control accounting became inconsistent.
    #[error("flow control: {reason}")]
    Flow {
        /// The violated rule.
        reason: String,
    },

    /// An acknowledgment record could not be written.
    #[error("ack: {reason}")]
    Ack {
        /// The underlying send failure.
        reason: String,
    },

    /// The caller-supplied configuration is incomplete.
    #[error("configuration: {reason}")]
    Policy {
        /// The missing piece.
        reason: &'static str,
    },
}

impl ClientError {
    /// The `process` status this error maps onto.
    #[must_use]
    pub(crate) fn status(&self) -> Status {
        match self {
            Self::Ack { .. } => Status::ErrAck,
            _ => Status::ErrRead,
        }
    }

    /// Whether the session must be torn down before returning: protocol,
    /// auth and flow violations are unrecoverable; plain transport errors
    /// leave the decision to the caller.
    #[must_use]
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Wire(_) | Self::Protocol { .. } | Self::Auth { .. } | Self::Flow { .. }
        )
    }
}
