//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fanout_rs::{Address, ClientId, EndpointOpener, EndpointOptions, SocketEndpoint};

/// Poll `cond` until it holds or a few seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Read exactly `len` bytes
pub fn read_exact<R: Read>(reader: &mut R, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).unwrap();
    buf
}

/// Writer whose contents the test can inspect
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Test-side view of one mock endpoint
#[derive(Clone, Default)]
pub struct MockHandle(Arc<MockState>);

#[derive(Default)]
struct MockState {
    size: AtomicUsize,
    open: AtomicBool,
    opens: AtomicUsize,
    written: Mutex<Vec<Vec<u8>>>,
    readiness_fd: Mutex<Option<RawFd>>,
}

impl MockHandle {
    /// Pretend `n` clients are connected
    pub fn set_size(&self, n: usize) {
        self.0.size.store(n, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.0.open.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.0.opens.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.0.written.lock().clone()
    }

    /// Descriptor the endpoint reports for readiness once opened
    pub fn set_readiness_fd(&self, fd: RawFd) {
        *self.0.readiness_fd.lock() = Some(fd);
    }
}

struct MockEndpoint {
    address: Address,
    handle: MockHandle,
}

impl SocketEndpoint for MockEndpoint {
    fn address(&self) -> &Address {
        &self.address
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        *self.handle.0.readiness_fd.lock()
    }

    fn accept(&mut self) -> Vec<ClientId> {
        Vec::new()
    }

    fn write(&mut self, chunk: &[u8], _partial: bool) -> usize {
        self.handle.0.written.lock().push(chunk.to_vec());
        self.size()
    }

    fn write_to(&mut self, _client: ClientId, _record: &[u8]) -> bool {
        false
    }

    fn flush(&mut self) {}

    fn disconnect_all(&mut self) {
        self.handle.set_size(0);
    }

    fn close(&mut self) {
        self.handle.0.open.store(false, Ordering::SeqCst);
    }

    fn size(&self) -> usize {
        self.handle.0.size.load(Ordering::SeqCst)
    }
}

/// Opener handing out mock endpoints, keyed by address
#[derive(Default)]
pub struct MockOpener {
    handles: Mutex<HashMap<String, MockHandle>>,
    /// Addresses that fail to open
    failing: Mutex<Vec<String>>,
}

impl MockOpener {
    /// Handle for the endpoint at `address` (e.g. `file:/mock/a`)
    pub fn handle(&self, address: &str) -> MockHandle {
        self.handles
            .lock()
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    pub fn fail(&self, address: &str) {
        self.failing.lock().push(address.to_string());
    }
}

impl EndpointOpener for MockOpener {
    fn open(
        &self,
        address: &Address,
        _options: &EndpointOptions,
    ) -> io::Result<Box<dyn SocketEndpoint>> {
        let key = address.to_string();
        if self.failing.lock().contains(&key) {
            return Err(io::ErrorKind::PermissionDenied.into());
        }

        let handle = self.handle(&key);
        handle.0.open.store(true, Ordering::SeqCst);
        handle.0.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockEndpoint {
            address: address.clone(),
            handle,
        }))
    }
}
