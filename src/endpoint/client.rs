//! Connected subscriber
//!
//! Client sockets are non-blocking. Each client has an outbox holding bytes
//! the kernel has not taken yet. Records are never split between clients'
//! views of the stream: a client either receives a whole record or none of it.

use bytes::{Buf, BytesMut};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use super::options::EndpointOptions;
use super::socket::ClientId;
use crate::mux::{Interest, Multiplexer};

/// Upper bound on reads per reap so a chatty peer cannot hold the loop
const MAX_REAP_READS: usize = 16;

/// Connected client transport
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Put the stream in non-blocking mode and apply transport options
    pub(crate) fn configure(&self, nodelay: bool) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_nonblocking(true)?;
                if nodelay {
                    s.set_nodelay(true)?;
                }
                Ok(())
            }
            Stream::Unix(s) => s.set_nonblocking(true),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl AsFd for Stream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Stream::Tcp(s) => s.as_fd(),
            Stream::Unix(s) => s.as_fd(),
        }
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// A subscriber connected to a listening endpoint
#[derive(Debug)]
pub(crate) struct Client {
    id: ClientId,
    stream: Stream,
    peer: String,
    /// Bytes accepted for this client but not yet written
    outbox: BytesMut,
    /// The last chunk seen was not the end of its record
    mid_record: bool,
    /// Current record is being withheld from this client
    skipping: bool,
    /// Records withheld because the client was behind
    discarded: u64,
    /// The peer shut down its sending side
    read_shut: bool,
}

impl Client {
    /// Create a client
    ///
    /// A client connecting while a record is in flight skips the rest of it.
    pub(crate) fn new(id: ClientId, stream: Stream, peer: String, mid_record: bool) -> Self {
        Self {
            id,
            stream,
            peer,
            outbox: BytesMut::new(),
            mid_record,
            skipping: mid_record,
            discarded: 0,
            read_shut: false,
        }
    }

    pub(crate) fn id(&self) -> ClientId {
        self.id
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    /// Number of records withheld from this client
    pub(crate) fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes waiting in the outbox
    pub(crate) fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Queue a chunk and write as much as possible
    ///
    /// Returns `Ok(false)` if the chunk was withheld from this client. An
    /// error means the client must be dropped.
    pub(crate) fn send(
        &mut self,
        chunk: &[u8],
        partial: bool,
        options: &EndpointOptions,
    ) -> io::Result<bool> {
        let starts_record = !self.mid_record;
        self.mid_record = partial;

        if starts_record {
            if options.discard_when_full {
                self.drain(None)?;
                self.skipping = !self.outbox.is_empty();
                if self.skipping {
                    self.discarded += 1;
                }
            } else {
                self.skipping = false;
            }
        }

        if self.skipping {
            return Ok(false);
        }

        self.outbox.extend_from_slice(chunk);
        self.drain(stall_limit(options))?;
        Ok(true)
    }

    /// Send one complete record outside the live stream
    ///
    /// Used for backlog replay: record-boundary state is left untouched, so a
    /// client that joined mid-record still skips the live tail afterwards.
    pub(crate) fn replay(&mut self, record: &[u8], options: &EndpointOptions) -> io::Result<bool> {
        if options.discard_when_full {
            self.drain(None)?;
            if !self.outbox.is_empty() {
                self.discarded += 1;
                return Ok(false);
            }
        }

        self.outbox.extend_from_slice(record);
        self.drain(stall_limit(options))?;
        Ok(true)
    }

    /// Write out the outbox and flush the transport
    pub(crate) fn flush(&mut self, options: &EndpointOptions) -> io::Result<()> {
        self.drain(stall_limit(options))?;
        self.stream.flush()
    }

    /// Write as much of the outbox as the socket takes
    ///
    /// With a stall limit, a full socket is waited on until writable; if it
    /// stays full past the limit the write fails with `TimedOut`. Without a
    /// limit, leftover bytes stay queued.
    fn drain(&mut self, stall: Option<Duration>) -> io::Result<()> {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.outbox.advance(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => match stall {
                    Some(limit) => self.wait_writable(limit)?,
                    None => return Ok(()),
                },
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn wait_writable(&self, limit: Duration) -> io::Result<()> {
        let fd = self.stream.as_raw_fd();
        let mut mux = Multiplexer::new();
        mux.add(fd, Interest::Write).map_err(io::Error::other)?;
        mux.add(fd, Interest::Error).map_err(io::Error::other)?;

        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "client write stalled",
                ));
            }
            if mux.wait(remaining).map_err(io::Error::other)? > 0 {
                return Ok(());
            }
        }
    }

    /// Check whether the peer has hung up
    ///
    /// Anything the peer sent is read and thrown away. End of input only
    /// means the peer stopped sending: a half-closed subscriber stays until
    /// the socket reports a hangup or a write to it fails. A TCP peer that
    /// closed both directions is therefore only noticed on the next write.
    pub(crate) fn is_closed(&mut self) -> bool {
        let mut scratch = [0u8; 512];
        for _ in 0..MAX_REAP_READS {
            if self.read_shut {
                break;
            }
            match self.stream.read(&mut scratch) {
                Ok(0) => self.read_shut = true,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return true,
            }
        }
        self.read_shut && self.hung_up()
    }

    fn hung_up(&self) -> bool {
        let mut fds = [PollFd::new(self.stream.as_fd(), PollFlags::empty())];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(0) | Err(Errno::EINTR) => false,
            Ok(_) => fds[0]
                .revents()
                .is_some_and(|events| events.intersects(PollFlags::POLLHUP | PollFlags::POLLERR)),
            Err(_) => true,
        }
    }

    /// Shut the connection down in both directions
    pub(crate) fn disconnect(&self) {
        // Already-closed peers report ENOTCONN here
        let _ = self.stream.shutdown();
    }
}

fn stall_limit(options: &EndpointOptions) -> Option<Duration> {
    (!options.discard_when_full).then_some(options.write_timeout)
}
