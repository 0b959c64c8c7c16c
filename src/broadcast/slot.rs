//! Publisher slot
//!
//! One slot per endpoint. A slot is either closed or holds an open socket
//! endpoint:
//!
//! ```text
//!   Closed ──open()──► Open ──close()──► Closed
//! ```
//!
//! Primary slots are opened once at construction. Secondary slots cycle
//! with primary subscriber demand.

use std::fmt;
use std::os::unix::io::RawFd;

use crate::endpoint::{Address, EndpointOpener, EndpointOptions, SocketEndpoint};
use crate::error::{Error, Result};

/// A closed or open endpoint transport
pub(crate) struct PublisherSlot {
    address: Address,
    endpoint: Option<Box<dyn SocketEndpoint>>,
    /// Consecutive failed opens, reset on success
    open_failures: u32,
}

impl PublisherSlot {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            endpoint: None,
            open_failures: 0,
        }
    }

    pub(crate) fn address(&self) -> &Address {
        &self.address
    }

    pub(crate) fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    pub(crate) fn endpoint_mut(&mut self) -> Option<&mut (dyn SocketEndpoint + 'static)> {
        self.endpoint.as_deref_mut()
    }

    pub(crate) fn local_addr(&self) -> Option<String> {
        self.endpoint.as_ref().and_then(|e| e.local_addr())
    }

    /// Connected clients, 0 while closed
    pub(crate) fn size(&self) -> usize {
        self.endpoint.as_ref().map_or(0, |e| e.size())
    }

    /// Open the transport
    ///
    /// Returns the readiness descriptor to register, if any. Opening an open
    /// slot does nothing and returns `Ok(None)`.
    pub(crate) fn open(
        &mut self,
        opener: &dyn EndpointOpener,
        options: &EndpointOptions,
    ) -> Result<Option<RawFd>> {
        if self.endpoint.is_some() {
            return Ok(None);
        }

        match opener.open(&self.address, options) {
            Ok(endpoint) => {
                let fd = endpoint.readiness_fd();
                self.endpoint = Some(endpoint);
                self.open_failures = 0;
                Ok(fd)
            }
            Err(source) => {
                self.open_failures += 1;
                Err(Error::Open {
                    address: self.address.to_string(),
                    source,
                })
            }
        }
    }

    /// Open a secondary transport, logging instead of failing
    ///
    /// Only the first of a run of failures is a warning; retries happen every
    /// poll cycle and log at debug.
    pub(crate) fn try_open(
        &mut self,
        opener: &dyn EndpointOpener,
        options: &EndpointOptions,
    ) -> Option<RawFd> {
        match self.open(opener, options) {
            Ok(fd) => fd,
            Err(e) => {
                if self.open_failures == 1 {
                    tracing::warn!(endpoint = %self.address, error = %e, "Secondary endpoint failed to open");
                } else {
                    tracing::debug!(
                        endpoint = %self.address,
                        attempts = self.open_failures,
                        error = %e,
                        "Secondary endpoint still failing to open"
                    );
                }
                None
            }
        }
    }

    /// Close the transport
    ///
    /// Returns the readiness descriptor to deregister, if any.
    pub(crate) fn close(&mut self) -> Option<RawFd> {
        let mut endpoint = self.endpoint.take()?;
        let fd = endpoint.readiness_fd();
        endpoint.close();
        fd
    }
}

impl fmt::Debug for PublisherSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherSlot")
            .field("address", &self.address)
            .field("open", &self.is_open())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::endpoint::SocketOpener;

    struct FailingOpener;

    impl EndpointOpener for FailingOpener {
        fn open(
            &self,
            _address: &Address,
            _options: &EndpointOptions,
        ) -> io::Result<Box<dyn SocketEndpoint>> {
            Err(io::ErrorKind::AddrInUse.into())
        }
    }

    #[test]
    fn test_open_close_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.sock");
        let mut slot = PublisherSlot::new(Address::Unix(path.clone()));
        let options = EndpointOptions::default();

        assert!(!slot.is_open());
        assert_eq!(slot.size(), 0);
        assert!(slot.close().is_none());

        let fd = slot.open(&SocketOpener, &options).unwrap();
        assert!(fd.is_some());
        assert!(slot.is_open());
        assert!(path.exists());

        // Already open
        assert!(slot.open(&SocketOpener, &options).unwrap().is_none());

        assert_eq!(slot.close(), fd);
        assert!(!slot.is_open());
        assert!(!path.exists());

        // Reopen after close
        assert!(slot.open(&SocketOpener, &options).unwrap().is_some());
    }

    #[test]
    fn test_open_failure() {
        let mut slot = PublisherSlot::new(Address::Tcp("127.0.0.1:0".into()));
        let options = EndpointOptions::default();

        let err = slot.open(&FailingOpener, &options).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(!slot.is_open());

        assert!(slot.try_open(&FailingOpener, &options).is_none());
        assert_eq!(slot.open_failures, 2);

        assert!(slot.try_open(&SocketOpener, &options).is_some());
        assert_eq!(slot.open_failures, 0);
    }

    #[test]
    fn test_point_to_point_has_no_fd() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = PublisherSlot::new(Address::File(dir.path().join("out")));

        assert!(slot.open(&SocketOpener, &EndpointOptions::default()).unwrap().is_none());
        assert!(slot.is_open());
        assert_eq!(slot.size(), 1);
        assert!(slot.close().is_none());
    }
}
