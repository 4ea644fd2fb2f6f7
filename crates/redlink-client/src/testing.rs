//! Scripted in-memory stream for handler and scenario tests.
//!
//! The mock honours non-blocking socket semantics: reading from an empty
//! buffer reports `WouldBlock` until the script marks the stream closed,
//! after which reads report a clean EOF. Everything the client writes is
//! captured for assertions.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use redlink_proto::MiniHeader;

#[derive(Default)]
struct MockInner {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    closed: bool,
}

/// One scripted stream; clones share the same buffers.
#[derive(Clone, Default)]
pub(crate) struct MockStream {
    inner: Arc<Mutex<MockInner>>,
}

impl MockStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the client to read.
    pub(crate) fn push_read(&self, bytes: &[u8]) {
        self.inner.lock().rx.extend(bytes);
    }

    /// Queue one framed record for the client to read.
    pub(crate) fn push_record(&self, ty: u16, payload: &[u8]) {
        self.push_read(&MiniHeader::new(ty, payload.len() as u32).to_bytes());
        self.push_read(payload);
    }

    /// After the read buffer drains, report EOF instead of `WouldBlock`.
    pub(crate) fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Everything the client wrote so far.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.inner.lock().tx.clone()
    }

    /// Drop captured writes, for tests asserting on a later phase.
    pub(crate) fn clear_written(&self) {
        self.inner.lock().tx.clear();
    }

    /// Split captured writes into framed records.
    pub(crate) fn written_records(&self) -> Vec<(u16, Vec<u8>)> {
        let bytes = self.written();
        let mut records = Vec::new();
        let mut pos = 0;
        while pos + MiniHeader::SIZE <= bytes.len() {
            let Ok(header) = MiniHeader::parse(&bytes[pos..]) else {
                break;
            };
            pos += MiniHeader::SIZE;
            let end = pos + header.size() as usize;
            records.push((header.ty(), bytes.get(pos..end).unwrap_or_default().to_vec()));
            pos = end;
        }
        records
    }
}

impl Read for &MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.rx.is_empty() {
            if inner.closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(inner.rx.len());
        for b in buf.iter_mut().take(n) {
            *b = inner.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for &MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
