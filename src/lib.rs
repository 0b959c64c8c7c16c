//! Process-local record broadcaster
//!
//! One producer writes records; any number of subscribers attach to and
//! detach from the configured endpoints at any time. Late joiners receive a
//! bounded backlog of recent records first. Secondary endpoints are only
//! open while some primary endpoint has a subscriber.
//!
//! # Example
//!
//! ```no_run
//! use fanout_rs::{Broadcaster, BroadcasterConfig};
//!
//! let config = BroadcasterConfig::with_endpoints(["tcp:9000", "unix:/tmp/feed.sock;secondary"])
//!     .cache_size(100)
//!     .exit_on_drain(true);
//! let broadcaster = Broadcaster::new(config)?;
//!
//! for i in 0.. {
//!     if !broadcaster.write(format!("{}\n", i)) {
//!         break; // every subscriber has gone
//!     }
//! }
//! # Ok::<(), fanout_rs::Error>(())
//! ```
//!
//! # Layout
//!
//! ```text
//!   Broadcaster ──► PublisherSlot[i] ──► SocketEndpoint (Publisher | Sink)
//!        │                                     │
//!        ├── BacklogCache                      └── clients
//!        ├── ClientCounts ──► CountReporter (CSV)
//!        └── accept loop ──► Multiplexer (select)
//! ```

pub mod backlog;
pub mod broadcast;
pub mod endpoint;
pub mod error;
pub mod mux;
pub mod signal;

pub use backlog::BacklogCache;
pub use broadcast::{Broadcaster, BroadcasterConfig, ClientCounts, CountReporter};
pub use endpoint::{
    Address, ClientId, Endpoint, EndpointOpener, EndpointOptions, EndpointSpec, EndpointTable,
    Framing, Role, SocketEndpoint, SocketOpener,
};
pub use error::{Error, Result};
pub use mux::{Interest, MultiplexError, Multiplexer, Timeout};
