//! Fuzz target for link-phase packet parsing
//!
//! The link header and reply are the first untrusted bytes the client
//! ever reads, before any authentication.
//!
//! # Invariants
//!
//! - Parsing NEVER panics, whatever the bytes
//! - Capability extraction is bounds-checked against the reply body
//! - A reply that parses exposes exactly the declared capability words

#![no_main]

use libfuzzer_sys::fuzz_target;
use redlink_proto::link::{LinkHeader, LinkReply};
use redlink_proto::MiniHeader;

fuzz_target!(|data: &[u8]| {
    let _ = LinkHeader::parse(data);
    let _ = MiniHeader::parse(data);

    if let Ok(reply) = LinkReply::parse(data) {
        if let Ok((common, channel)) = reply.caps(data) {
            // membership queries are total
            for index in 0..128 {
                let _ = common.has(index);
                let _ = channel.has(index);
            }
        }
    }
});
