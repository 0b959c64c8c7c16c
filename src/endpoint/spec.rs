//! Endpoint specification mini-language
//!
//! One string per configured endpoint:
//!
//! ```text
//! <address>[;primary|;secondary][;address=<address>]
//! ```
//!
//! The bare key `secondary` marks the endpoint secondary unless `primary` is
//! also present. Everything else is primary.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Whether an endpoint is always open or opened on primary demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened at construction, never closed by the broadcaster
    Primary,
    /// Open only while some primary endpoint has a subscriber
    Secondary,
}

/// A parsed endpoint specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Transport address, interpreted by the socket endpoint
    pub address: String,
    /// Primary or secondary
    pub role: Role,
}

impl EndpointSpec {
    /// Create a primary endpoint spec
    pub fn primary(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: Role::Primary,
        }
    }

    /// Create a secondary endpoint spec
    pub fn secondary(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: Role::Secondary,
        }
    }

    /// Check if this endpoint is primary
    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }

    /// Check if this endpoint is secondary
    pub fn is_secondary(&self) -> bool {
        self.role == Role::Secondary
    }
}

impl FromStr for EndpointSpec {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self> {
        let mut fields = spec.split(';');
        let mut address = fields.next().unwrap_or("").trim().to_string();
        let mut primary = false;
        let mut secondary = false;

        for field in fields.map(str::trim).filter(|f| !f.is_empty()) {
            match field.split_once('=') {
                Some((key, value)) if key.trim() == "address" => {
                    address = value.trim().to_string();
                }
                Some((key, _)) => {
                    return Err(Error::invalid_endpoint(
                        spec,
                        format!("unknown key `{}`", key.trim()),
                    ));
                }
                None => match field {
                    "primary" => primary = true,
                    "secondary" => secondary = true,
                    other => {
                        return Err(Error::invalid_endpoint(
                            spec,
                            format!("unknown flag `{}`", other),
                        ));
                    }
                },
            }
        }

        if address.is_empty() {
            return Err(Error::invalid_endpoint(spec, "missing address"));
        }

        let role = if secondary && !primary {
            Role::Secondary
        } else {
            Role::Primary
        };

        Ok(Self { address, role })
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::Primary => write!(f, "{};primary", self.address),
            Role::Secondary => write!(f, "{};secondary", self.address),
        }
    }
}
