//! Property-based tests for the wire layer.
//!
//! These verify the encode/decode laws for all valid inputs rather than
//! hand-picked examples: header round-trips, capability membership
//! preservation, and agent header round-trips.

use proptest::prelude::*;
use redlink_proto::caps::CapsBitmap;
use redlink_proto::link::LinkHeader;
use redlink_proto::{MiniHeader, agent::AgentMessage};

proptest! {
    #[test]
    fn prop_mini_header_roundtrip(ty in any::<u16>(), size in any::<u32>()) {
        let header = MiniHeader::new(ty, size);
        let parsed = MiniHeader::parse(&header.to_bytes()).map_err(|e| {
            TestCaseError::fail(format!("parse failed: {e}"))
        })?;
        prop_assert_eq!(parsed.ty(), ty);
        prop_assert_eq!(parsed.size(), size);
    }

    #[test]
    fn prop_mini_header_rejects_all_short_buffers(bytes in prop::collection::vec(any::<u8>(), 0..6)) {
        prop_assert!(MiniHeader::parse(&bytes).is_err());
    }

    #[test]
    fn prop_link_header_roundtrip(size in any::<u32>()) {
        let header = LinkHeader::new(size);
        let parsed = LinkHeader::parse(&header.to_bytes()).map_err(|e| {
            TestCaseError::fail(format!("parse failed: {e}"))
        })?;
        prop_assert_eq!(parsed.size(), size);
    }

    // Capability round-trip: membership is preserved for every index the
    // declared word count can address.
    #[test]
    fn prop_caps_roundtrip(
        words in 1usize..4,
        bits in prop::collection::vec(any::<u32>(), 0..24),
    ) {
        let mut caps = CapsBitmap::with_words(words);
        let addressable = words as u32 * 32;
        let set: Vec<u32> = bits.iter().map(|b| b % addressable).collect();
        for &bit in &set {
            caps.set(bit);
        }

        let mut encoded = Vec::new();
        caps.write_to(&mut encoded);
        prop_assert_eq!(encoded.len(), words * 4);

        let decoded = CapsBitmap::parse(&encoded, words).map_err(|e| {
            TestCaseError::fail(format!("parse failed: {e}"))
        })?;
        for index in 0..addressable {
            prop_assert_eq!(decoded.has(index), set.contains(&index));
        }
    }

    #[test]
    fn prop_agent_header_roundtrip(ty in any::<u32>(), size in any::<u32>()) {
        let mut header_bytes = AgentMessage::new(ty, size).to_bytes().to_vec();
        // trailing garbage must not confuse prefix parsing
        header_bytes.extend_from_slice(&[0xAA; 7]);
        let parsed = AgentMessage::parse(&header_bytes).map_err(|e| {
            TestCaseError::fail(format!("parse failed: {e}"))
        })?;
        prop_assert_eq!(parsed.ty(), ty);
        prop_assert_eq!(parsed.size(), size);
    }
}
