//! Channel identifiers and message type numbers.
//!
//! The base range (below [`msg::BASE_LAST`]) is shared by every channel;
//! channel-specific messages start at [`msg::FIRST_AVAIL`] in both
//! directions.

/// Wire channel types carried in the link message.
pub mod channel_type {
    /// Session control, agent tunnel.
    pub const MAIN: u8 = 1;
    /// Surface lifecycle and draws.
    pub const DISPLAY: u8 = 2;
    /// Keyboard and mouse.
    pub const INPUTS: u8 = 3;
    /// Cursor shapes (not wired into this client).
    pub const CURSOR: u8 = 4;
    /// Audio out of the guest.
    pub const PLAYBACK: u8 = 5;
    /// Audio into the guest.
    pub const RECORD: u8 = 6;
}

/// Server → client message types.
pub mod msg {
    /// Migration start (acknowledged and discarded).
    pub const MIGRATE: u16 = 1;
    /// Migration payload (discarded).
    pub const MIGRATE_DATA: u16 = 2;
    /// Server dictates the ACK window.
    pub const SET_ACK: u16 = 3;
    /// Latency probe; answered with PONG.
    pub const PING: u16 = 4;
    /// Migration barrier (discarded).
    pub const WAIT_FOR_CHANNELS: u16 = 5;
    /// Server-initiated channel shutdown.
    pub const DISCONNECTING: u16 = 6;
    /// Informational message with embedded text.
    pub const NOTIFY: u16 = 7;
    /// Last id of the shared base range.
    pub const BASE_LAST: u16 = 100;
    /// First channel-specific id.
    pub const FIRST_AVAIL: u16 = 101;

    /// MAIN channel messages.
    pub mod main {
        /// Required first message: session parameters.
        pub const INIT: u16 = 103;
        /// Channels available on the server.
        pub const CHANNELS_LIST: u16 = 104;
        /// Mouse mode changed (discarded).
        pub const MOUSE_MODE: u16 = 105;
        /// Multimedia clock (discarded).
        pub const MULTI_MEDIA_TIME: u16 = 106;
        /// Guest agent attached.
        pub const AGENT_CONNECTED: u16 = 107;
        /// Guest agent detached.
        pub const AGENT_DISCONNECTED: u16 = 108;
        /// Tunnelled agent record.
        pub const AGENT_DATA: u16 = 109;
        /// Flow-control token refill.
        pub const AGENT_TOKEN: u16 = 110;
        /// Guest name.
        pub const NAME: u16 = 113;
        /// Guest UUID.
        pub const UUID: u16 = 114;
        /// Agent attached, with an initial token count.
        pub const AGENT_CONNECTED_TOKENS: u16 = 115;
    }

    /// INPUTS channel messages.
    pub mod inputs {
        /// Required first message: current modifier state.
        pub const INIT: u16 = 101;
        /// Keyboard modifier change.
        pub const KEY_MODIFIERS: u16 = 102;
        /// Acknowledges a batch of motion records.
        pub const MOUSE_MOTION_ACK: u16 = 111;
    }

    /// PLAYBACK channel messages.
    pub mod playback {
        /// Raw PCM samples.
        pub const DATA: u16 = 101;
        /// Compression mode announcement (discarded).
        pub const MODE: u16 = 102;
        /// Stream opens.
        pub const START: u16 = 103;
        /// Stream closes.
        pub const STOP: u16 = 104;
        /// Per-channel volume.
        pub const VOLUME: u16 = 105;
        /// Mute toggle.
        pub const MUTE: u16 = 106;
    }

    /// RECORD channel messages.
    pub mod record {
        /// Capture stream opens.
        pub const START: u16 = 101;
        /// Capture stream closes.
        pub const STOP: u16 = 102;
        /// Per-channel volume.
        pub const VOLUME: u16 = 103;
        /// Mute toggle.
        pub const MUTE: u16 = 104;
    }

    /// DISPLAY channel messages.
    pub mod display {
        /// Fill a region with a brush.
        pub const DRAW_FILL: u16 = 302;
        /// Copy a source image onto a surface.
        pub const DRAW_COPY: u16 = 304;
        /// Create a drawable surface.
        pub const SURFACE_CREATE: u16 = 314;
        /// Destroy a drawable surface.
        pub const SURFACE_DESTROY: u16 = 315;
    }
}

/// Client → server message types.
pub mod msgc {
    /// Answers SET_ACK with the echoed generation.
    pub const ACK_SYNC: u16 = 1;
    /// One ACK per window of received records.
    pub const ACK: u16 = 2;
    /// Answers PING.
    pub const PONG: u16 = 3;
    /// Farewell sent before closing a channel.
    pub const DISCONNECTING: u16 = 6;

    /// MAIN channel client messages.
    pub mod main {
        /// Ask the server to announce all channels.
        pub const ATTACH_CHANNELS: u16 = 104;
        /// Request a mouse mode.
        pub const MOUSE_MODE_REQUEST: u16 = 105;
        /// Open the agent tunnel, granting client tokens.
        pub const AGENT_START: u16 = 106;
        /// Tunnelled agent record.
        pub const AGENT_DATA: u16 = 107;
    }

    /// INPUTS channel client messages.
    pub mod inputs {
        /// Key press (scancode).
        pub const KEY_DOWN: u16 = 101;
        /// Key release (scancode with release bit).
        pub const KEY_UP: u16 = 102;
        /// Modifier state submission.
        pub const KEY_MODIFIERS: u16 = 103;
        /// Relative mouse motion.
        pub const MOUSE_MOTION: u16 = 111;
        /// Absolute mouse position.
        pub const MOUSE_POSITION: u16 = 112;
        /// Button press.
        pub const MOUSE_PRESS: u16 = 113;
        /// Button release.
        pub const MOUSE_RELEASE: u16 = 114;
    }

    /// RECORD channel client messages.
    pub mod record {
        /// Captured PCM samples with a timestamp.
        pub const DATA: u16 = 101;
    }

    /// DISPLAY channel client messages.
    pub mod display {
        /// Cache and dictionary parameters (all zero for this client).
        pub const INIT: u16 = 101;
        /// Image compression preference.
        pub const PREFERRED_COMPRESSION: u16 = 103;
    }
}

/// Motion records acknowledged per MOUSE_MOTION_ACK.
pub const MOTION_ACK_BUNCH: i32 = 4;

/// Mouse modes, buttons and button-state masks.
pub mod mouse {
    /// Server-side (relative) mouse mode.
    pub const MODE_SERVER: u16 = 1;
    /// Client-side (absolute) mouse mode.
    pub const MODE_CLIENT: u16 = 2;

    /// Left button.
    pub const BUTTON_LEFT: u32 = 1;
    /// Middle button.
    pub const BUTTON_MIDDLE: u32 = 2;
    /// Right button.
    pub const BUTTON_RIGHT: u32 = 3;
    /// Wheel up.
    pub const BUTTON_UP: u32 = 4;
    /// Wheel down.
    pub const BUTTON_DOWN: u32 = 5;
    /// Side button.
    pub const BUTTON_SIDE: u32 = 6;
    /// Extra button.
    pub const BUTTON_EXTRA: u32 = 7;

    /// Left button held.
    pub const MASK_LEFT: u16 = 1 << 0;
    /// Middle button held.
    pub const MASK_MIDDLE: u16 = 1 << 1;
    /// Right button held.
    pub const MASK_RIGHT: u16 = 1 << 2;
    /// Side button held.
    pub const MASK_SIDE: u16 = 1 << 5;
    /// Extra button held.
    pub const MASK_EXTRA: u16 = 1 << 6;
}

/// Audio formats and data modes.
pub mod audio {
    /// Signed 16-bit PCM, the only format this client accepts.
    pub const FMT_S16: u16 = 1;
}
