//! Socket endpoint interface
//!
//! A socket endpoint owns one transport and every client connected to it.
//! The broadcaster only sees aggregate client counts; per-client delivery
//! failures are handled here by dropping the client.

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;

use super::address::Address;
use super::options::EndpointOptions;
use super::publisher::Publisher;
use super::sink::Sink;

/// Identifier of a client connected to a [`SocketEndpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One open output transport and its connected clients
pub trait SocketEndpoint: Send {
    /// Address this endpoint was opened on
    fn address(&self) -> &Address;

    /// Descriptor to watch for new subscribers
    ///
    /// `None` for point-to-point transports that accept nobody.
    fn readiness_fd(&self) -> Option<RawFd>;

    /// Actual bound address, if the transport has one
    fn local_addr(&self) -> Option<String> {
        None
    }

    /// Accept every pending connection
    fn accept(&mut self) -> Vec<ClientId>;

    /// Send a chunk to every connected client
    ///
    /// `partial` is true when more chunks of the same record follow. Clients
    /// that fail the write are dropped. Returns the number of clients still
    /// connected.
    fn write(&mut self, chunk: &[u8], partial: bool) -> usize;

    /// Send one complete record to a single client, outside the live stream
    ///
    /// Returns false if the client is unknown, was behind, or was dropped.
    fn write_to(&mut self, client: ClientId, record: &[u8]) -> bool;

    /// Push out anything buffered for clients
    fn flush(&mut self);

    /// Drop clients whose peer has gone away; returns the remaining count
    fn reap(&mut self) -> usize {
        self.size()
    }

    /// Disconnect every client, keeping the transport open
    fn disconnect_all(&mut self);

    /// Disconnect every client and close the transport
    fn close(&mut self);

    /// Number of connected clients
    fn size(&self) -> usize;
}

/// Opens socket endpoints for addresses
pub trait EndpointOpener: Send + Sync {
    /// Open a transport on `address`
    fn open(
        &self,
        address: &Address,
        options: &EndpointOptions,
    ) -> io::Result<Box<dyn SocketEndpoint>>;
}

/// Opener for the built-in transports
///
/// Listening addresses (`tcp`, `unix`) open a [`Publisher`], point-to-point
/// addresses (`udp`, `file`, `stdout`) open a [`Sink`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketOpener;

impl EndpointOpener for SocketOpener {
    fn open(
        &self,
        address: &Address,
        options: &EndpointOptions,
    ) -> io::Result<Box<dyn SocketEndpoint>> {
        if address.is_listening() {
            Ok(Box::new(Publisher::bind(address.clone(), *options)?))
        } else {
            Ok(Box::new(Sink::open(address.clone(), *options)?))
        }
    }
}
