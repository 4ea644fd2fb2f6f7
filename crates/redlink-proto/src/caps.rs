//! Capability bitmaps exchanged during link negotiation.
//!
//! Capabilities are 32-bit little-endian words; the byte length reserved
//! for a set is derived from the highest declared index with
//! [`cap_bytes`], matching the server's sizing rule.

use crate::{Result, WireError};

/// Common capabilities shared by every channel.
pub mod common {
    /// The auth mechanism is chosen explicitly by the client.
    pub const PROTOCOL_AUTH_SELECTION: u32 = 0;
    /// The SPICE ticket (RSA-encrypted password) scheme.
    pub const AUTH_SPICE: u32 = 1;
    /// SASL authentication (never advertised by this client).
    pub const AUTH_SASL: u32 = 2;
    /// Six-byte mini-headers instead of the legacy data header.
    pub const MINI_HEADER: u32 = 3;
}

/// MAIN channel capabilities.
pub mod main {
    /// Semi-seamless migration support.
    pub const SEMI_SEAMLESS_MIGRATE: u32 = 0;
    /// Server sends guest name and UUID messages.
    pub const NAME_AND_UUID: u32 = 1;
    /// Agent connection announcements carry an initial token count.
    pub const AGENT_CONNECTED_TOKENS: u32 = 2;
    /// Seamless migration support.
    pub const SEAMLESS_MIGRATE: u32 = 3;
}

/// PLAYBACK channel capabilities.
pub mod playback {
    /// CELT 0.5.1 compressed audio.
    pub const CELT_0_5_1: u32 = 0;
    /// Server sends volume and mute messages.
    pub const VOLUME: u32 = 1;
    /// Latency reporting.
    pub const LATENCY: u32 = 2;
    /// Opus compressed audio.
    pub const OPUS: u32 = 3;
}

/// RECORD channel capabilities.
pub mod record {
    /// CELT 0.5.1 compressed audio.
    pub const CELT_0_5_1: u32 = 0;
    /// Server sends volume and mute messages.
    pub const VOLUME: u32 = 1;
    /// Opus compressed audio.
    pub const OPUS: u32 = 2;
}

/// DISPLAY channel capabilities.
pub mod display {
    /// Client may request a preferred image compression.
    pub const PREF_COMPRESSION: u32 = 6;
}

/// Bytes reserved for a capability set whose highest index is `max_index`.
///
/// This is the server's sizing rule: round the bit index up to a whole
/// 32-bit word.
#[must_use]
pub fn cap_bytes(max_index: u32) -> usize {
    ((max_index as usize + 32) / 8) & !3
}

/// Words reserved for a capability set whose highest index is `max_index`.
#[must_use]
pub fn cap_words(max_index: u32) -> usize {
    cap_bytes(max_index) / 4
}

/// A growable set of capability bits backed by 32-bit words.
///
/// # Invariants
///
/// - `has(i)` is false for any `i` beyond the stored words; membership
///   queries never fail.
/// - `set(i)` only touches the word containing `i`; the word count is
///   fixed at construction so the wire size is always the declared one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapsBitmap {
    words: Vec<u32>,
}

impl CapsBitmap {
    /// An empty bitmap occupying `words` 32-bit words on the wire.
    #[must_use]
    pub fn with_words(words: usize) -> Self {
        Self { words: vec![0; words] }
    }

    /// Adopt already-decoded words.
    #[must_use]
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Decode `count` little-endian words from `bytes`.
    pub fn parse(bytes: &[u8], count: usize) -> Result<Self> {
        let need = count * 4;
        if bytes.len() < need {
            return Err(WireError::TooShort { expected: need, actual: bytes.len() });
        }
        let words = bytes[..need]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Ok(Self { words })
    }

    /// Set bit `index`. Out-of-range indices are ignored, mirroring the
    /// fixed wire sizing.
    pub fn set(&mut self, index: u32) {
        let word = index as usize / 32;
        if let Some(w) = self.words.get_mut(word) {
            *w |= 1 << (index % 32);
        }
    }

    /// Query bit `index`.
    #[must_use]
    pub fn has(&self, index: u32) -> bool {
        self.words
            .get(index as usize / 32)
            .is_some_and(|w| w & (1 << (index % 32)) != 0)
    }

    /// True when no bit is set (including the zero-word case).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Backing words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Number of backing words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Indices of all set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, w)| {
            (0..32).filter_map(move |bit| (w & (1 << bit) != 0).then_some(wi as u32 * 32 + bit))
        })
    }

    /// Append the little-endian encoding to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{CapsBitmap, cap_bytes, cap_words, common};

    #[test]
    fn sizing_rule() {
        assert_eq!(cap_bytes(common::MINI_HEADER), 4);
        assert_eq!(cap_bytes(super::display::PREF_COMPRESSION), 4);
        assert_eq!(cap_bytes(31), 4);
        assert_eq!(cap_bytes(32), 8);
        assert_eq!(cap_words(32), 2);
    }

    #[test]
    fn set_and_query() {
        let mut caps = CapsBitmap::with_words(2);
        caps.set(0);
        caps.set(33);
        assert!(caps.has(0));
        assert!(caps.has(33));
        assert!(!caps.has(1));
        // beyond the declared words: ignored on set, absent on query
        caps.set(64);
        assert!(!caps.has(64));
        assert_eq!(caps.iter_set().collect::<Vec<_>>(), vec![0, 33]);
    }

    #[test]
    fn parse_rejects_short_input() {
        assert!(CapsBitmap::parse(&[0, 0, 0], 1).is_err());
    }

    proptest! {
        // Encoding then decoding preserves membership for every index the
        // bitmap can address.
        #[test]
        fn roundtrip_preserves_membership(
            indices in prop::collection::vec(0u32..64, 0..16)
        ) {
            let mut caps = CapsBitmap::with_words(2);
            for &i in &indices {
                caps.set(i);
            }

            let mut encoded = Vec::new();
            caps.write_to(&mut encoded);
            let decoded = CapsBitmap::parse(&encoded, 2).map_err(|_| TestCaseError::fail("parse"))?;

            for i in 0..64u32 {
                prop_assert_eq!(decoded.has(i), indices.contains(&i));
            }
        }
    }
}
