//! Multiplexer error types

use std::io;
use std::os::unix::io::RawFd;

/// Error type for readiness multiplexing
#[derive(Debug, thiserror::Error)]
pub enum MultiplexError {
    /// Descriptor cannot be represented in an `fd_set`
    #[error("descriptor {0} is outside the select(2) range")]
    DescriptorOutOfRange(RawFd),

    /// The underlying wait failed for a reason other than signal interruption
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),
}
