//! Error types

use std::io;

use crate::mux::MultiplexError;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Endpoint specification could not be parsed
    #[error("invalid endpoint spec `{spec}`: {reason}")]
    InvalidEndpoint { spec: String, reason: String },

    /// Transport address could not be parsed
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Every configured endpoint is secondary
    #[error("at least one primary endpoint is required")]
    NoPrimaryEndpoint,

    /// Opening an endpoint's transport failed
    #[error("failed to open endpoint {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Readiness multiplexing failed
    #[error(transparent)]
    Multiplex(#[from] MultiplexError),

    /// Changing the broken-pipe signal disposition failed
    #[error("failed to ignore SIGPIPE: {0}")]
    Signal(#[from] nix::errno::Errno),

    /// The accept loop thread could not be started
    #[error("failed to spawn accept loop: {0}")]
    Spawn(#[source] io::Error),
}

impl Error {
    pub(crate) fn invalid_endpoint(spec: &str, reason: impl Into<String>) -> Self {
        Error::InvalidEndpoint {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Error::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error (fatal at construction)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InvalidEndpoint { .. } | Error::InvalidAddress { .. } | Error::NoPrimaryEndpoint
        )
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
