//! Listening socket endpoint
//!
//! Binds a TCP or unix domain listener and fans chunks out to every client
//! that connects to it.

use std::fs;
use std::io;
use std::net::TcpListener;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use super::address::Address;
use super::client::{Client, Stream};
use super::options::EndpointOptions;
use super::socket::{ClientId, SocketEndpoint};

/// Bound listener
#[derive(Debug)]
enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    fn bind(address: &Address) -> io::Result<Self> {
        let listener = match address {
            Address::Tcp(addr) => Listener::Tcp(TcpListener::bind(addr.as_str())?),
            Address::Unix(path) => {
                remove_stale_socket(path)?;
                Listener::Unix {
                    listener: UnixListener::bind(path)?,
                    path: path.clone(),
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a listening address", other),
                ));
            }
        };

        match &listener {
            Listener::Tcp(l) => l.set_nonblocking(true)?,
            Listener::Unix { listener, .. } => listener.set_nonblocking(true)?,
        }

        Ok(listener)
    }

    fn accept(&self) -> io::Result<(Stream, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept()?;
                Ok((Stream::Tcp(stream), peer.to_string()))
            }
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept()?;
                Ok((Stream::Unix(stream), path.display().to_string()))
            }
        }
    }

    fn local_addr(&self) -> Option<String> {
        match self {
            Listener::Tcp(l) => l.local_addr().ok().map(|a| a.to_string()),
            Listener::Unix { path, .. } => Some(path.display().to_string()),
        }
    }

    fn as_raw_fd(&self) -> RawFd {
        match self {
            Listener::Tcp(l) => l.as_raw_fd(),
            Listener::Unix { listener, .. } => listener.as_raw_fd(),
        }
    }
}

/// Remove a socket file left behind by a previous process
///
/// Anything at `path` that is not a socket is left alone so that `bind`
/// reports the conflict.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Socket endpoint backed by a listening socket
#[derive(Debug)]
pub struct Publisher {
    address: Address,
    options: EndpointOptions,
    /// `None` once closed
    listener: Option<Listener>,
    clients: Vec<Client>,
    next_client_id: u64,
    /// The last chunk written was not the end of its record
    in_record: bool,
}

impl Publisher {
    /// Bind a listener on `address`
    pub fn bind(address: Address, options: EndpointOptions) -> io::Result<Self> {
        let listener = Listener::bind(&address)?;

        tracing::info!(
            endpoint = %address,
            local_addr = listener.local_addr().unwrap_or_default(),
            "Endpoint listening"
        );

        Ok(Self {
            address,
            options,
            listener: Some(listener),
            clients: Vec::new(),
            next_client_id: 1,
            in_record: false,
        })
    }

    /// Check if the listener is still open
    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    fn drop_client(&self, client: &Client, error: &io::Error) {
        tracing::debug!(
            endpoint = %self.address,
            client = %client.id(),
            peer = client.peer(),
            discarded = client.discarded(),
            pending = client.pending(),
            error = %error,
            "Client dropped"
        );
        client.disconnect();
    }
}

impl SocketEndpoint for Publisher {
    fn address(&self) -> &Address {
        &self.address
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        self.listener.as_ref().map(Listener::as_raw_fd)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.as_ref().and_then(Listener::local_addr)
    }

    fn accept(&mut self) -> Vec<ClientId> {
        let Some(listener) = self.listener.as_ref() else {
            return Vec::new();
        };

        let mut accepted = Vec::new();
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.configure(self.options.flush_after_write) {
                        tracing::warn!(endpoint = %self.address, peer = %peer, error = %e, "Failed to configure client socket");
                        continue;
                    }

                    let id = ClientId(self.next_client_id);
                    self.next_client_id += 1;

                    tracing::info!(
                        endpoint = %self.address,
                        client = %id,
                        peer = %peer,
                        clients = self.clients.len() + 1,
                        "Client connected"
                    );

                    self.clients
                        .push(Client::new(id, stream, peer, self.in_record));
                    accepted.push(id);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(endpoint = %self.address, error = %e, "Failed to accept connection");
                    break;
                }
            }
        }

        accepted
    }

    fn write(&mut self, chunk: &[u8], partial: bool) -> usize {
        let options = self.options;
        let mut clients = std::mem::take(&mut self.clients);

        clients.retain_mut(|client| match client.send(chunk, partial, &options) {
            Ok(sent) => {
                if !sent {
                    tracing::trace!(endpoint = %self.address, client = %client.id(), "Chunk withheld");
                }
                true
            }
            Err(e) => {
                self.drop_client(client, &e);
                false
            }
        });

        self.clients = clients;
        self.in_record = partial;
        self.clients.len()
    }

    fn write_to(&mut self, client: ClientId, record: &[u8]) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.id() == client) else {
            return false;
        };

        match self.clients[index].replay(record, &self.options) {
            Ok(sent) => sent,
            Err(e) => {
                let dropped = self.clients.remove(index);
                self.drop_client(&dropped, &e);
                false
            }
        }
    }

    fn flush(&mut self) {
        let options = self.options;
        let mut clients = std::mem::take(&mut self.clients);

        clients.retain_mut(|client| match client.flush(&options) {
            Ok(()) => true,
            Err(e) => {
                self.drop_client(client, &e);
                false
            }
        });

        self.clients = clients;
    }

    fn reap(&mut self) -> usize {
        let address = &self.address;
        self.clients.retain_mut(|client| {
            if client.is_closed() {
                tracing::info!(endpoint = %address, client = %client.id(), peer = client.peer(), "Client disconnected");
                client.disconnect();
                false
            } else {
                true
            }
        });
        self.clients.len()
    }

    fn disconnect_all(&mut self) {
        if self.clients.is_empty() {
            return;
        }

        tracing::info!(
            endpoint = %self.address,
            clients = self.clients.len(),
            "Disconnecting all clients"
        );
        for client in self.clients.drain(..) {
            client.disconnect();
        }
    }

    fn close(&mut self) {
        self.disconnect_all();

        if let Some(listener) = self.listener.take() {
            if let Listener::Unix { path, .. } = &listener {
                if let Err(e) = fs::remove_file(path) {
                    tracing::debug!(path = %path.display(), error = %e, "Failed to remove socket file");
                }
            }
            tracing::info!(endpoint = %self.address, "Endpoint closed");
        }
    }

    fn size(&self) -> usize {
        self.clients.len()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}
