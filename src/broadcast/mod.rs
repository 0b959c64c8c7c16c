//! Record broadcaster
//!
//! The broadcaster owns the endpoint table, one publisher slot per endpoint,
//! the backlog cache and the client counts. A single lock guards all of it.
//!
//! # Architecture
//!
//! ```text
//!      producer thread                         accept loop thread
//!   ┌──────────────────┐                    ┌────────────────────────┐
//!   │ write(record)    │                    │ mux.wait(poll_interval)│
//!   └────────┬─────────┘                    │   (lock not held)      │
//!            │                              └───────────┬────────────┘
//!            ▼                                          ▼
//!   ┌────────────────────────────── Mutex<TableState> ───────────────────┐
//!   │ cache.push_chunk()            accept ready listeners               │
//!   │ slot[i].write() for open i    cache.replay_into(new client)        │
//!   │ counts.reconcile()            reap, counts.reconcile()             │
//!   │   → report line on change     open/close secondaries               │
//!   │   → drain signal                (follow has_primary_clients)       │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the accept loop touches the multiplexer, so it lives on that thread
//! outside the lock.

pub mod broadcaster;
pub mod config;
pub mod counts;
pub mod report;
mod slot;

pub use broadcaster::Broadcaster;
pub use config::BroadcasterConfig;
pub use counts::ClientCounts;
pub use report::CountReporter;
