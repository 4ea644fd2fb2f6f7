//! Fuzz target for channel message body parsing
//!
//! Every variable-length body the dispatcher hands to a handler.
//!
//! # Invariants
//!
//! - No parser panics or over-reads on arbitrary bytes
//! - Length-prefixed structures honour their declared lengths

#![no_main]

use libfuzzer_sys::fuzz_target;
use redlink_proto::agent::AgentMessage;
use redlink_proto::messages::{
    MainInit, MainUuid, Ping, PlaybackStart, RecordStart, SetAck, SurfaceCreate,
    parse_audio_volume, parse_channels_list, parse_main_name, parse_notify,
};

fuzz_target!(|data: &[u8]| {
    let _ = MainInit::parse(data);
    let _ = MainUuid::parse(data);
    let _ = SetAck::parse(data);
    let _ = Ping::parse(data);
    let _ = PlaybackStart::parse(data);
    let _ = RecordStart::parse(data);
    let _ = SurfaceCreate::parse(data);
    let _ = AgentMessage::parse(data);

    if let Ok(entries) = parse_channels_list(data) {
        assert!(entries.len() * 2 + 4 <= data.len());
    }
    if let Ok(name) = parse_main_name(data) {
        assert!(name.len() + 4 <= data.len());
    }
    if let Ok((head, text)) = parse_notify(data) {
        assert!(text.len() <= head.message_len.get() as usize);
    }
    let _ = parse_audio_volume(data);
});
