//! Socket abstraction over the two supported transports.
//!
//! Channels connect over TCP or a UNIX-domain socket. The stream is
//! blocking through the link handshake and switched to non-blocking
//! before it joins the readiness loop. Reads and writes go through
//! `&Stream`, so the receive path and the lock-guarded send paths can
//! share one socket without serialising against each other.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Resolved connection target.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    /// TCP host and port; the host may need DNS resolution.
    Tcp(String, u16),
    /// Filesystem path of a UNIX-domain socket.
    Unix(PathBuf),
}

/// One channel's socket.
pub(crate) enum Stream {
    /// TCP transport.
    Tcp(TcpStream),
    /// UNIX-domain transport.
    Unix(UnixStream),
    /// Scripted in-memory stream for tests.
    #[cfg(test)]
    Mock(crate::testing::MockStream),
}

impl Stream {
    /// Open a blocking connection to the endpoint. TCP sockets get
    /// `TCP_NODELAY` so small records leave immediately.
    pub(crate) fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(host, port) => {
                let mut last = None;
                for addr in (host.as_str(), *port).to_socket_addrs()? {
                    match TcpStream::connect(addr) {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Self::Tcp(stream));
                        }
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
                }))
            }
            Endpoint::Unix(path) => Ok(Self::Unix(UnixStream::connect(path)?)),
        }
    }

    /// Toggle `TCP_NODELAY`; a no-op on UNIX sockets.
    pub(crate) fn set_nodelay(&self, on: bool) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_nodelay(on),
            Self::Unix(_) => Ok(()),
            #[cfg(test)]
            Self::Mock(_) => Ok(()),
        }
    }

    /// Switch blocking mode.
    pub(crate) fn set_nonblocking(&self, on: bool) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_nonblocking(on),
            Self::Unix(stream) => stream.set_nonblocking(on),
            #[cfg(test)]
            Self::Mock(_) => Ok(()),
        }
    }

    /// Close the write direction, flushing queued bytes to the peer.
    pub(crate) fn shutdown_write(&self) {
        let _ = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Write),
            Self::Unix(stream) => stream.shutdown(Shutdown::Write),
            #[cfg(test)]
            Self::Mock(_) => Ok(()),
        };
    }

    /// File descriptor for readiness registration; absent for mocks.
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        match self {
            Self::Tcp(stream) => Some(stream.as_raw_fd()),
            Self::Unix(stream) => Some(stream.as_raw_fd()),
            #[cfg(test)]
            Self::Mock(_) => None,
        }
    }
}

impl Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => {
                let mut r = stream;
                r.read(buf)
            }
            Stream::Unix(stream) => {
                let mut r = stream;
                r.read(buf)
            }
            #[cfg(test)]
            Stream::Mock(stream) => {
                let mut r = stream;
                r.read(buf)
            }
        }
    }
}

impl Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => {
                let mut w = stream;
                w.write(buf)
            }
            Stream::Unix(stream) => {
                let mut w = stream;
                w.write(buf)
            }
            #[cfg(test)]
            Stream::Mock(stream) => {
                let mut w = stream;
                w.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => {
                let mut w = stream;
                w.flush()
            }
            Stream::Unix(stream) => {
                let mut w = stream;
                w.flush()
            }
            #[cfg(test)]
            Stream::Mock(stream) => {
                let mut w = stream;
                w.flush()
            }
        }
    }
}

/// Write the whole buffer to a non-blocking socket.
///
/// Writes are not deadline-bounded: a slow peer makes us wait, never
/// fail. `WouldBlock` yields and retries so the caller keeps the send
/// lock until the bytes are contiguous on the wire.
pub(crate) fn write_all_spin(stream: &Stream, mut buf: &[u8]) -> io::Result<()> {
    let mut w = stream;
    while !buf.is_empty() {
        match w.write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
