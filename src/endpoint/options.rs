//! Per-endpoint write options

use std::time::Duration;

/// How records are framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Variable-length records (line oriented)
    Line,
    /// Fixed-size packets of the given byte length
    Packet(usize),
}

impl Framing {
    /// Framing for a configured record size (0 = line oriented)
    pub fn from_record_size(record_size: usize) -> Self {
        match record_size {
            0 => Framing::Line,
            n => Framing::Packet(n),
        }
    }
}

/// Options shared by every endpoint of a broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Record framing
    pub framing: Framing,

    /// Drop whole records for clients that cannot keep up instead of blocking
    pub discard_when_full: bool,

    /// Flush transports after each record
    pub flush_after_write: bool,

    /// Longest a blocking client write may stall before the client is dropped
    pub write_timeout: Duration,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            framing: Framing::Line,
            discard_when_full: false,
            flush_after_write: false,
            write_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_from_record_size() {
        assert_eq!(Framing::from_record_size(0), Framing::Line);
        assert_eq!(Framing::from_record_size(188), Framing::Packet(188));
    }
}
