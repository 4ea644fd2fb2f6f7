//! The resumable mini-header frame reader.
//!
//! Every channel owns one of these. It accumulates the 6-byte header,
//! then either stages the payload into a monotonically-grown buffer or
//! drains and drops it when the dispatcher chose to discard. Reads are
//! non-blocking and may stop at any byte boundary; the state survives
//! across `process` calls, so a message split arbitrarily by the kernel
//! produces exactly the same dispatch sequence as one that arrives
//! whole.

use std::io::{self, Read};

use redlink_proto::MiniHeader;

const DISCARD_CHUNK: usize = 8192;

/// What one [`Framer::advance`] step produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Bytes moved but nothing completed; call again.
    Progress,
    /// The header just completed; choose payload or discard next.
    Header(MiniHeader),
    /// The staged payload is complete.
    Message,
    /// The discarded payload has been fully drained.
    Discarded,
    /// No more data is available right now.
    NoData,
    /// The peer closed the stream.
    Closed,
}

/// Per-channel framing state.
///
/// # Invariants
///
/// - `header_read <= MiniHeader::SIZE`.
/// - While staging, `payload_read <= payload_len` and `payload_len`
///   equals the current header's size.
/// - While discarding, `payload_read == 0`.
/// - The payload buffer only ever grows; it is released on
///   [`Framer::reset`], not per message.
#[derive(Default)]
pub(crate) struct Framer {
    header_buf: [u8; MiniHeader::SIZE],
    header_read: usize,
    payload: Vec<u8>,
    payload_len: usize,
    payload_read: usize,
    discarding: bool,
    discard_remaining: usize,
}

impl Framer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Drop all framing state and the staged buffer.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Stage the next `size` payload bytes for dispatch.
    pub(crate) fn begin_payload(&mut self, size: u32) {
        self.payload_len = size as usize;
        self.payload_read = 0;
        self.payload.clear();
        self.payload.resize(size as usize, 0);
    }

    /// Drain and drop the next `size` payload bytes.
    pub(crate) fn begin_discard(&mut self, size: u32) {
        self.discarding = true;
        self.discard_remaining = size as usize;
        self.payload_read = 0;
    }

    /// Whether a header is currently being accumulated.
    pub(crate) fn in_header(&self) -> bool {
        self.header_read < MiniHeader::SIZE
    }

    /// Take the staged payload for dispatch; returns the buffer and the
    /// length of the completed message within it.
    pub(crate) fn take_payload(&mut self) -> (Vec<u8>, usize) {
        (std::mem::take(&mut self.payload), self.payload_len)
    }

    /// Give the buffer back after dispatch so its capacity is reused.
    pub(crate) fn restore_payload(&mut self, buf: Vec<u8>) {
        if self.payload.capacity() < buf.capacity() {
            self.payload = buf;
        }
    }

    /// Advance the state machine by at most one read.
    pub(crate) fn advance(&mut self, reader: &mut impl Read) -> io::Result<Step> {
        if self.discarding {
            return self.advance_discard(reader);
        }
        if self.in_header() {
            return self.advance_header(reader);
        }
        self.advance_payload(reader)
    }

    fn advance_header(&mut self, reader: &mut impl Read) -> io::Result<Step> {
        match reader.read(&mut self.header_buf[self.header_read..]) {
            Ok(0) => Ok(Step::Closed),
            Ok(n) => {
                self.header_read += n;
                if self.header_read < MiniHeader::SIZE {
                    return Ok(Step::Progress);
                }
                // a 6-byte buffer always parses
                match MiniHeader::parse(&self.header_buf) {
                    Ok(header) => Ok(Step::Header(header)),
                    Err(_) => Ok(Step::Closed),
                }
            }
            Err(e) => map_read_err(&e),
        }
    }

    fn advance_payload(&mut self, reader: &mut impl Read) -> io::Result<Step> {
        if self.payload_read == self.payload_len {
            self.header_read = 0;
            return Ok(Step::Message);
        }

        match reader.read(&mut self.payload[self.payload_read..self.payload_len]) {
            Ok(0) => Ok(Step::Closed),
            Ok(n) => {
                self.payload_read += n;
                if self.payload_read == self.payload_len {
                    self.header_read = 0;
                    Ok(Step::Message)
                } else {
                    Ok(Step::Progress)
                }
            }
            Err(e) => map_read_err(&e),
        }
    }

    fn advance_discard(&mut self, reader: &mut impl Read) -> io::Result<Step> {
        if self.discard_remaining == 0 {
            self.discarding = false;
            self.header_read = 0;
            return Ok(Step::Discarded);
        }

        let mut scratch = [0u8; DISCARD_CHUNK];
        let want = self.discard_remaining.min(DISCARD_CHUNK);
        match reader.read(&mut scratch[..want]) {
            Ok(0) => Ok(Step::Closed),
            Ok(n) => {
                self.discard_remaining -= n;
                if self.discard_remaining == 0 {
                    self.discarding = false;
                    self.header_read = 0;
                    Ok(Step::Discarded)
                } else {
                    Ok(Step::Progress)
                }
            }
            Err(e) => map_read_err(&e),
        }
    }
}

fn map_read_err(e: &io::Error) -> io::Result<Step> {
    match e.kind() {
        io::ErrorKind::WouldBlock => Ok(Step::NoData),
        io::ErrorKind::Interrupted => Ok(Step::Progress),
        _ => Err(io::Error::new(e.kind(), e.to_string())),
    }
}
