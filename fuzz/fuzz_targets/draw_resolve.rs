//! Fuzz target for display draw payload resolution
//!
//! Draw payloads carry offset-relative references into their own buffer;
//! resolution must stay inside the buffer for every input.
//!
//! # Strategy
//!
//! - Arbitrary payload bytes walked as DRAW_FILL and DRAW_COPY
//! - Arbitrary image offsets resolved against the same payload
//!
//! # Invariants
//!
//! - Resolution NEVER panics and never reads outside the payload
//! - A resolved bitmap's pixel slice is a subslice of the payload

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use redlink_proto::draw::{BufOffset, Copy, DisplayBase, Fill, WireCursor, resolve_image};

#[derive(Debug, Arbitrary)]
struct DrawInput {
    payload: Vec<u8>,
    image_offset: u32,
}

fuzz_target!(|input: DrawInput| {
    let mut cursor = WireCursor::new(&input.payload);
    if DisplayBase::parse(&mut cursor).is_ok() {
        let mut fill_cursor = WireCursor::new(&input.payload);
        let _ = DisplayBase::parse(&mut fill_cursor);
        let _ = Fill::parse(&mut fill_cursor);
        let _ = Copy::parse(&mut cursor);
    }

    if let Some(offset) = BufOffset::new(input.image_offset) {
        if let Ok((_, Some(bitmap))) = resolve_image(&input.payload, offset) {
            assert!(bitmap.data.len() <= input.payload.len());
        }
    }
});
