//! The cross-thread submit surface.
//!
//! A [`SessionHandle`] owns nothing but atomically-refcounted pointers to
//! the send-side state, so it can be cloned freely and used from any
//! thread while [`crate::Session::process`] runs elsewhere. Submit
//! methods return `false` on failure and log the cause; they never block
//! on session progress.
//!
//! The method implementations live beside their channel handlers:
//! keyboard and mouse in `inputs`, clipboard in `agent`, captured audio
//! in `record`.

use std::sync::Arc;

use crate::agent::AgentShared;
use crate::channel::ChannelShared;
use crate::inputs::InputsShared;

/// Thread-safe handle for the submit entry points.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) main: Arc<ChannelShared>,
    pub(crate) inputs: Arc<InputsShared>,
    pub(crate) record: Arc<ChannelShared>,
    pub(crate) agent: Arc<AgentShared>,
}

impl SessionHandle {
    pub(crate) fn new(
        main: Arc<ChannelShared>,
        inputs: Arc<InputsShared>,
        record: Arc<ChannelShared>,
        agent: Arc<AgentShared>,
    ) -> Self {
        Self { main, inputs, record, agent }
    }
}
