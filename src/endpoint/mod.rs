//! Output endpoints
//!
//! An endpoint is one configured output destination. The [`EndpointTable`]
//! holds the parsed configuration; a [`SocketEndpoint`] is an open transport
//! with its connected clients.
//!
//! # Transports
//!
//! ```text
//!   listening (accept subscribers)      point-to-point (fixed destination)
//!   ┌──────────────────────────┐        ┌──────────────────────────┐
//!   │ Publisher                │        │ Sink                     │
//!   │   tcp:<port>             │        │   udp:<host>:<port>      │
//!   │   unix:<path>            │        │   file:<path>            │
//!   │   readiness fd: listener │        │   stdout                 │
//!   │   size: connected peers  │        │   readiness fd: none     │
//!   └──────────────────────────┘        │   size: 1 while healthy  │
//!                                       └──────────────────────────┘
//! ```

pub mod address;
pub(crate) mod client;
pub mod options;
pub mod publisher;
pub mod sink;
pub mod socket;
pub mod spec;
pub mod table;

pub use address::Address;
pub use options::{EndpointOptions, Framing};
pub use publisher::Publisher;
pub use sink::Sink;
pub use socket::{ClientId, EndpointOpener, SocketEndpoint, SocketOpener};
pub use spec::{EndpointSpec, Role};
pub use table::{Endpoint, EndpointTable};
