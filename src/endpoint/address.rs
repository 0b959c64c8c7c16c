//! Transport addresses
//!
//! ```text
//! tcp:<port>             listen on all interfaces
//! tcp:<host>:<port>      listen on host
//! unix:<path>            listen on a unix domain socket
//! udp:<host>:<port>      send datagrams to a fixed destination
//! file:<path>            append to a file
//! stdout | -             write to standard output
//! <port> | <host>:<port> shorthand for tcp
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed transport address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP listener bind address (`host:port`)
    Tcp(String),
    /// Unix domain socket listener path
    Unix(PathBuf),
    /// UDP destination (`host:port`)
    Udp(String),
    /// Output file, opened for append
    File(PathBuf),
    /// Standard output
    Stdout,
}

impl Address {
    /// Check if this transport accepts subscribers
    ///
    /// Point-to-point transports have a fixed destination and no listening socket.
    pub fn is_listening(&self) -> bool {
        matches!(self, Address::Tcp(_) | Address::Unix(_))
    }
}

fn is_port(s: &str) -> bool {
    s.parse::<u16>().is_ok()
}

fn host_port(address: &str, rest: &str) -> Result<String> {
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && is_port(port) => Ok(rest.to_string()),
        _ => Err(Error::invalid_address(address, "expected <host>:<port>")),
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(address: &str) -> Result<Self> {
        let address = address.trim();

        if address == "stdout" || address == "-" {
            return Ok(Address::Stdout);
        }
        if is_port(address) {
            return Ok(Address::Tcp(format!("0.0.0.0:{}", address)));
        }

        let Some((scheme, rest)) = address.split_once(':') else {
            return Err(Error::invalid_address(address, "missing transport scheme"));
        };

        match scheme {
            "tcp" if is_port(rest) => Ok(Address::Tcp(format!("0.0.0.0:{}", rest))),
            "tcp" => host_port(address, rest).map(Address::Tcp),
            "udp" => host_port(address, rest).map(Address::Udp),
            "unix" | "file" if rest.is_empty() => Err(Error::invalid_address(address, "empty path")),
            "unix" => Ok(Address::Unix(PathBuf::from(rest))),
            "file" => Ok(Address::File(PathBuf::from(rest))),
            _ if is_port(rest) => Ok(Address::Tcp(address.to_string())),
            other => Err(Error::invalid_address(
                address,
                format!("unknown transport `{}`", other),
            )),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp:{}", addr),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
            Address::Udp(addr) => write!(f, "udp:{}", addr),
            Address::File(path) => write!(f, "file:{}", path.display()),
            Address::Stdout => f.write_str("stdout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_forms() {
        assert_eq!(
            "tcp:9000".parse::<Address>().unwrap(),
            Address::Tcp("0.0.0.0:9000".into())
        );
        assert_eq!(
            "tcp:127.0.0.1:9000".parse::<Address>().unwrap(),
            Address::Tcp("127.0.0.1:9000".into())
        );
        assert_eq!(
            "9000".parse::<Address>().unwrap(),
            Address::Tcp("0.0.0.0:9000".into())
        );
        assert_eq!(
            "localhost:9000".parse::<Address>().unwrap(),
            Address::Tcp("localhost:9000".into())
        );
    }

    #[test]
    fn test_ipv6_tcp() {
        assert_eq!(
            "tcp:[::1]:9000".parse::<Address>().unwrap(),
            Address::Tcp("[::1]:9000".into())
        );
    }

    #[test]
    fn test_point_to_point() {
        assert_eq!(
            "udp:10.0.0.1:5000".parse::<Address>().unwrap(),
            Address::Udp("10.0.0.1:5000".into())
        );
        assert_eq!(
            "file:/var/log/feed.csv".parse::<Address>().unwrap(),
            Address::File("/var/log/feed.csv".into())
        );
        assert_eq!("stdout".parse::<Address>().unwrap(), Address::Stdout);
        assert_eq!("-".parse::<Address>().unwrap(), Address::Stdout);

        assert!(!Address::Stdout.is_listening());
        assert!(Address::Unix("/tmp/s".into()).is_listening());
    }

    #[test]
    fn test_invalid() {
        assert!("udp:5000".parse::<Address>().is_err());
        assert!("tcp:host:notaport".parse::<Address>().is_err());
        assert!("unix:".parse::<Address>().is_err());
        assert!("serial:/dev/ttyS0".parse::<Address>().is_err());
        assert!("nowhere".parse::<Address>().is_err());
    }

    #[test]
    fn test_display() {
        let addr: Address = "unix:/tmp/feed.sock".parse().unwrap();
        assert_eq!(addr.to_string(), "unix:/tmp/feed.sock");
        assert_eq!(addr, addr.to_string().parse().unwrap());
    }
}
