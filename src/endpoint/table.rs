//! Endpoint table
//!
//! The ordered, immutable list of configured endpoints. An endpoint's index
//! in this table is the index used for its publisher slot and its entry in
//! the client-count vector.

use super::address::Address;
use super::spec::{EndpointSpec, Role};
use crate::error::{Error, Result};

/// One configured endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Parsed transport address
    pub address: Address,
    /// Primary or secondary
    pub role: Role,
}

impl Endpoint {
    /// Check if this endpoint is primary
    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }
}

/// Validated endpoint table with at least one primary endpoint
#[derive(Debug, Clone)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    /// Build a table from parsed specs
    pub fn new(specs: impl IntoIterator<Item = EndpointSpec>) -> Result<Self> {
        let endpoints = specs
            .into_iter()
            .map(|spec| {
                Ok(Endpoint {
                    address: spec.address.parse()?,
                    role: spec.role,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if !endpoints.iter().any(Endpoint::is_primary) {
            return Err(Error::NoPrimaryEndpoint);
        }

        Ok(Self { endpoints })
    }

    /// Parse a table from endpoint spec strings
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let specs = specs
            .iter()
            .map(|s| s.as_ref().parse::<EndpointSpec>())
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs)
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Check if the table is empty (never true for a constructed table)
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Get an endpoint by index
    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    /// Iterate endpoints in table order
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Check if the endpoint at `index` is primary
    pub fn is_primary(&self, index: usize) -> bool {
        self.endpoints.get(index).is_some_and(Endpoint::is_primary)
    }

    /// Indices of primary endpoints
    pub fn primaries(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices(Role::Primary)
    }

    /// Indices of secondary endpoints
    pub fn secondaries(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices(Role::Secondary)
    }

    fn indices(&self, role: Role) -> impl Iterator<Item = usize> + '_ {
        self.endpoints
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.role == role)
            .map(|(i, _)| i)
    }
}
