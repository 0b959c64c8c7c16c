//! Broken-pipe signal disposition
//!
//! Writing to a subscriber that has gone away raises `SIGPIPE`, whose default
//! action terminates the process. The broadcaster needs that write to fail
//! with `EPIPE` instead so the client can be dropped like any other I/O error.

use nix::sys::signal::{self, SigHandler, Signal};

use crate::error::Result;

/// Set the process-wide `SIGPIPE` disposition to ignore
///
/// This affects the whole process, not only the broadcaster.
pub fn ignore_broken_pipe() -> Result<()> {
    // SAFETY: SigIgn installs no handler code, so no async-signal-safety
    // requirements apply.
    unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }?;
    tracing::debug!("SIGPIPE disposition set to ignore");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Write};
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn test_write_to_closed_peer_is_io_error() {
        ignore_broken_pipe().unwrap();

        let (mut a, b) = UnixStream::pair().unwrap();
        drop(b);

        let err = a.write_all(b"hello").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}
