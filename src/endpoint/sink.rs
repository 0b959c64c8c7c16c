//! Point-to-point socket endpoint
//!
//! UDP, file and stdout destinations have nobody to accept. The fixed
//! destination counts as one subscriber for as long as writes succeed.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::unix::io::RawFd;

use super::address::Address;
use super::options::{EndpointOptions, Framing};
use super::socket::{ClientId, SocketEndpoint};

#[derive(Debug)]
enum Target {
    Udp(UdpSocket),
    File(BufWriter<File>),
    Stdout(io::Stdout),
}

impl Target {
    fn open(address: &Address) -> io::Result<Self> {
        match address {
            Address::Udp(dest) => {
                let dest = dest.to_socket_addrs()?.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "destination did not resolve")
                })?;
                let local: SocketAddr = if dest.is_ipv4() {
                    ([0u8; 4], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(dest)?;
                Ok(Target::Udp(socket))
            }
            Address::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Target::File(BufWriter::new(file)))
            }
            Address::Stdout => Ok(Target::Stdout(io::stdout())),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a point-to-point address", other),
            )),
        }
    }

    fn send(&mut self, chunk: &[u8], framing: Framing) -> io::Result<()> {
        match self {
            Target::Udp(socket) => {
                let packet_size = match framing {
                    Framing::Packet(n) => n,
                    Framing::Line => chunk.len().max(1),
                };
                for packet in chunk.chunks(packet_size) {
                    match socket.send(packet) {
                        Ok(_) => {}
                        // ICMP unreachable from an earlier datagram; nobody listening yet
                        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                            tracing::trace!(error = %e, "Datagram refused");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            Target::File(w) => w.write_all(chunk),
            Target::Stdout(out) => out.lock().write_all(chunk),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::Udp(_) => Ok(()),
            Target::File(w) => w.flush(),
            Target::Stdout(out) => out.flush(),
        }
    }
}

/// Socket endpoint with a single fixed destination
#[derive(Debug)]
pub struct Sink {
    address: Address,
    options: EndpointOptions,
    /// `None` once closed or after a fatal write error
    target: Option<Target>,
}

impl Sink {
    /// Open the destination at `address`
    pub fn open(address: Address, options: EndpointOptions) -> io::Result<Self> {
        let target = Target::open(&address)?;
        tracing::info!(endpoint = %address, "Endpoint opened");

        Ok(Self {
            address,
            options,
            target: Some(target),
        })
    }

    fn fail(&mut self, error: &io::Error) {
        tracing::warn!(endpoint = %self.address, error = %error, "Destination write failed");
        self.target = None;
    }
}

impl SocketEndpoint for Sink {
    fn address(&self) -> &Address {
        &self.address
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        None
    }

    fn local_addr(&self) -> Option<String> {
        match &self.target {
            Some(Target::Udp(socket)) => socket.local_addr().ok().map(|a| a.to_string()),
            _ => None,
        }
    }

    fn accept(&mut self) -> Vec<ClientId> {
        Vec::new()
    }

    fn write(&mut self, chunk: &[u8], partial: bool) -> usize {
        let Some(target) = self.target.as_mut() else {
            return 0;
        };

        let mut result = target.send(chunk, self.options.framing);
        if result.is_ok() && self.options.flush_after_write && !partial {
            result = target.flush();
        }
        if let Err(e) = result {
            self.fail(&e);
        }

        self.size()
    }

    fn write_to(&mut self, _client: ClientId, _record: &[u8]) -> bool {
        false
    }

    fn flush(&mut self) {
        if let Some(Err(e)) = self.target.as_mut().map(Target::flush) {
            self.fail(&e);
        }
    }

    fn disconnect_all(&mut self) {}

    fn close(&mut self) {
        if let Some(mut target) = self.target.take() {
            if let Err(e) = target.flush() {
                tracing::debug!(endpoint = %self.address, error = %e, "Flush on close failed");
            }
            tracing::info!(endpoint = %self.address, "Endpoint closed");
        }
    }

    fn size(&self) -> usize {
        usize::from(self.target.is_some())
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}
