//! Readiness multiplexing over `select(2)`
//!
//! A [`Multiplexer`] keeps three descriptor sets (read, write and error
//! interest) and waits until any of them becomes ready. It is owned by a
//! single thread; nothing here is synchronized.
//!
//! Two contracts callers rely on:
//! - waiting with all three sets empty returns `0` immediately, whatever the
//!   timeout, without entering the kernel
//! - a wait interrupted by a signal (`EINTR`) is not an error and returns `0`

pub mod error;
pub mod timeout;

use nix::errno::Errno;
use nix::sys::select::{select, FdSet, FD_SETSIZE};

use std::collections::BTreeSet;
use std::io;
use std::os::unix::io::{BorrowedFd, RawFd};

pub use error::MultiplexError;
pub use timeout::Timeout;

/// Kind of readiness a descriptor is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Readable, or a listening socket with a pending connection
    Read,
    /// Writable without blocking
    Write,
    /// Exceptional condition
    Error,
}

/// Readiness multiplexer over read/write/error descriptor sets
#[derive(Debug, Default)]
pub struct Multiplexer {
    read: BTreeSet<RawFd>,
    write: BTreeSet<RawFd>,
    error: BTreeSet<RawFd>,
    /// Descriptors signalled by the last wait
    ready: BTreeSet<RawFd>,
}

impl Multiplexer {
    /// Create an empty multiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fd` for `interest`
    ///
    /// Adding a descriptor that is already registered is a no-op.
    pub fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), MultiplexError> {
        if usize::try_from(fd).map_or(true, |fd| fd >= FD_SETSIZE) {
            return Err(MultiplexError::DescriptorOutOfRange(fd));
        }

        self.set_mut(interest).insert(fd);
        Ok(())
    }

    /// Deregister `fd` from every set
    ///
    /// Removing an unknown descriptor is a no-op.
    pub fn remove(&mut self, fd: RawFd) {
        self.read.remove(&fd);
        self.write.remove(&fd);
        self.error.remove(&fd);
        self.ready.remove(&fd);
    }

    /// Check if `fd` is registered in any set
    pub fn contains(&self, fd: RawFd) -> bool {
        self.read.contains(&fd) || self.write.contains(&fd) || self.error.contains(&fd)
    }

    /// Check if all three sets are empty
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.error.is_empty()
    }

    /// Wait until a registered descriptor is ready or `timeout` elapses
    ///
    /// Returns the number of ready descriptors, `0` on timeout, on signal
    /// interruption, or when nothing is registered.
    pub fn wait(&mut self, timeout: impl Into<Timeout>) -> Result<usize, MultiplexError> {
        self.ready.clear();

        if self.is_empty() {
            return Ok(0);
        }

        let mut read = fd_set(&self.read);
        let mut write = fd_set(&self.write);
        let mut error = fd_set(&self.error);
        let mut timeval = timeout.into().to_timeval();

        match select(None, &mut read, &mut write, &mut error, timeval.as_mut()) {
            Ok(0) => {}
            Ok(_) => {
                for (set, signalled) in [(&self.read, &read), (&self.write, &write), (&self.error, &error)] {
                    self.ready
                        .extend(set.iter().copied().filter(|&fd| signalled.contains(borrow(fd))));
                }
            }
            Err(Errno::EINTR) => {
                tracing::trace!("Readiness wait interrupted by signal");
                return Ok(0);
            }
            Err(errno) => return Err(MultiplexError::Wait(io::Error::from(errno))),
        }

        Ok(self.ready.len())
    }

    /// Poll without blocking
    pub fn check(&mut self) -> Result<usize, MultiplexError> {
        self.wait(Timeout::ZERO)
    }

    /// Check if `fd` was signalled by the last wait
    pub fn ready(&self, fd: RawFd) -> bool {
        self.ready.contains(&fd)
    }

    fn set_mut(&mut self, interest: Interest) -> &mut BTreeSet<RawFd> {
        match interest {
            Interest::Read => &mut self.read,
            Interest::Write => &mut self.write,
            Interest::Error => &mut self.error,
        }
    }
}

/// Borrow a registered descriptor for the duration of one wait
fn borrow<'fd>(fd: RawFd) -> BorrowedFd<'fd> {
    // SAFETY: registered descriptors are in 0..FD_SETSIZE and their owners
    // deregister them before closing.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

fn fd_set<'fd>(fds: &BTreeSet<RawFd>) -> FdSet<'fd> {
    let mut set = FdSet::new();
    for &fd in fds {
        set.insert(borrow(fd));
    }
    set
}
