//! Broadcaster implementation
//!
//! A producer thread calls [`Broadcaster::write`] while a background accept
//! loop takes new subscribers, replays the backlog to them and opens or
//! closes secondary endpoints. Both sides touch the publisher slots only
//! while holding the table lock.

use bytes::Bytes;
use parking_lot::Mutex;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::config::BroadcasterConfig;
use super::counts::ClientCounts;
use super::report::CountReporter;
use super::slot::PublisherSlot;
use crate::backlog::BacklogCache;
use crate::endpoint::{EndpointOpener, EndpointOptions, EndpointTable, SocketOpener};
use crate::error::{Error, Result};
use crate::mux::{Interest, MultiplexError, Multiplexer};
use crate::signal;

/// Everything guarded by the table lock
struct TableState {
    slots: Vec<PublisherSlot>,
    cache: BacklogCache,
    counts: ClientCounts,
    reporter: Option<CountReporter>,
}

impl TableState {
    /// Compare slot sizes against the last observed counts
    fn reconcile(&mut self, table: &EndpointTable) {
        let sizes = self.slots.iter().map(PublisherSlot::size);
        if !self.counts.reconcile(sizes, table) {
            return;
        }

        tracing::debug!(
            counts = ?self.counts.counts(),
            has_primary_clients = self.counts.has_primary_clients(),
            "Client counts changed"
        );

        if let Some(reporter) = self.reporter.as_mut() {
            reporter.report(&self.counts);
        }
    }

    /// Accept on every ready listener and replay the backlog to newcomers
    fn accept_ready(&mut self, mux: &Multiplexer, flush: bool) {
        for slot in &mut self.slots {
            let Some(endpoint) = slot.endpoint_mut() else {
                continue;
            };
            let Some(fd) = endpoint.readiness_fd() else {
                continue;
            };
            if !mux.ready(fd) {
                continue;
            }

            let accepted = endpoint.accept();
            for client in &accepted {
                let replayed = self.cache.replay_into(endpoint, *client);
                if replayed > 0 {
                    tracing::debug!(
                        endpoint = %endpoint.address(),
                        client = %client,
                        records = replayed,
                        "Backlog replayed"
                    );
                }
            }

            if flush && !accepted.is_empty() {
                endpoint.flush();
            }
        }
    }

    /// Drop clients that hung up since the last cycle
    fn reap(&mut self) {
        for slot in &mut self.slots {
            if let Some(endpoint) = slot.endpoint_mut() {
                endpoint.reap();
            }
        }
    }

    /// Open or close secondaries to follow primary demand
    ///
    /// Returns true if any slot changed state.
    fn follow_primary_demand(&mut self, shared: &Shared, mux: &mut Multiplexer) -> bool {
        let wanted = self.counts.has_primary_clients();
        let mut changed = false;

        for index in shared.table.secondaries() {
            let slot = &mut self.slots[index];
            if wanted && !slot.is_open() {
                let fd = slot.try_open(shared.opener.as_ref(), &shared.options);
                if !slot.is_open() {
                    continue;
                }
                if let Some(fd) = fd {
                    if let Err(e) = mux.add(fd, Interest::Read) {
                        tracing::warn!(endpoint = %slot.address(), error = %e, "Cannot watch secondary endpoint");
                        slot.close();
                        continue;
                    }
                }
                tracing::info!(endpoint = %slot.address(), "Secondary endpoint opened");
                changed = true;
            } else if !wanted && slot.is_open() {
                if let Some(fd) = slot.close() {
                    mux.remove(fd);
                }
                tracing::info!(endpoint = %slot.address(), "Secondary endpoint closed");
                changed = true;
            }
        }

        changed
    }

    fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.close();
        }
    }
}

/// State shared between the producer and the accept loop
struct Shared {
    config: BroadcasterConfig,
    table: EndpointTable,
    options: EndpointOptions,
    opener: Arc<dyn EndpointOpener>,
    state: Mutex<TableState>,
    shutdown: AtomicBool,
    accepting: AtomicBool,
    loop_error: Mutex<Option<MultiplexError>>,
}

/// Fans records out to every open endpoint
///
/// # Example
///
/// ```no_run
/// use fanout_rs::{Broadcaster, BroadcasterConfig};
///
/// let config = BroadcasterConfig::with_endpoints(["tcp:9000", "tcp:9001;secondary"])
///     .cache_size(16);
/// let broadcaster = Broadcaster::new(config)?;
///
/// broadcaster.write("hello\n");
/// broadcaster.shutdown()?;
/// # Ok::<(), fanout_rs::Error>(())
/// ```
pub struct Broadcaster {
    shared: Arc<Shared>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Broadcaster {
    /// Create a broadcaster using the built-in transports
    ///
    /// Client counts, when enabled, are reported on standard output.
    pub fn new(config: BroadcasterConfig) -> Result<Self> {
        Self::with_components(config, Arc::new(SocketOpener), CountReporter::stdout())
    }

    /// Create a broadcaster with a custom opener and count reporter
    ///
    /// Every primary endpoint is open when this returns.
    pub fn with_components(
        config: BroadcasterConfig,
        opener: Arc<dyn EndpointOpener>,
        reporter: CountReporter,
    ) -> Result<Self> {
        let table = EndpointTable::parse(&config.endpoints)?;

        if config.ignore_sigpipe {
            signal::ignore_broken_pipe()?;
        }

        let options = config.endpoint_options();
        let mut slots: Vec<PublisherSlot> = table
            .iter()
            .map(|endpoint| PublisherSlot::new(endpoint.address.clone()))
            .collect();

        let mut mux = Multiplexer::new();
        for index in table.primaries() {
            if let Some(fd) = slots[index].open(opener.as_ref(), &options)? {
                mux.add(fd, Interest::Read)?;
            }
        }

        let mut state = TableState {
            slots,
            cache: BacklogCache::new(config.cache_size),
            counts: ClientCounts::new(table.len()),
            reporter: config.report_client_counts.then_some(reporter),
        };
        state.reconcile(&table);

        tracing::info!(
            endpoints = table.len(),
            primaries = table.primaries().count(),
            cache_size = config.cache_size,
            "Broadcaster started"
        );

        let shared = Arc::new(Shared {
            config,
            table,
            options,
            opener,
            state: Mutex::new(state),
            shutdown: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            loop_error: Mutex::new(None),
        });

        let loop_shared = Arc::clone(&shared);
        let accept_thread = thread::Builder::new()
            .name("fanout-accept".into())
            .spawn(move || accept_loop(loop_shared, mux))
            .map_err(Error::Spawn)?;

        Ok(Self {
            shared,
            accept_thread: Some(accept_thread),
        })
    }

    /// Write one complete record to every open endpoint
    ///
    /// Returns false when drain signalling is enabled and every client of a
    /// session that had clients has gone. The caller should stop writing.
    pub fn write(&self, record: impl Into<Bytes>) -> bool {
        self.write_chunk(record, false)
    }

    /// Write one chunk of a record
    ///
    /// `partial` is true when more chunks of the same record follow. Clients
    /// that join while a record is in flight start at the next record.
    pub fn write_chunk(&self, chunk: impl Into<Bytes>, partial: bool) -> bool {
        let chunk = chunk.into();
        let mut state = self.shared.state.lock();

        state.cache.push_chunk(&chunk, partial);
        for slot in &mut state.slots {
            if let Some(endpoint) = slot.endpoint_mut() {
                endpoint.write(&chunk, partial);
            }
        }
        state.reconcile(&self.shared.table);

        !(self.shared.config.exit_on_drain && state.counts.drained())
    }

    /// Disconnect every client without closing any endpoint
    pub fn disconnect_all(&self) {
        let mut state = self.shared.state.lock();
        for slot in &mut state.slots {
            if let Some(endpoint) = slot.endpoint_mut() {
                endpoint.disconnect_all();
            }
        }
        state.reconcile(&self.shared.table);
    }

    /// Check if the endpoint at `index` is open
    pub fn is_open(&self, index: usize) -> bool {
        self.shared
            .state
            .lock()
            .slots
            .get(index)
            .is_some_and(PublisherSlot::is_open)
    }

    /// Last observed client count of every endpoint
    pub fn client_counts(&self) -> Vec<usize> {
        self.shared.state.lock().counts.counts().to_vec()
    }

    /// Check if any primary endpoint has a client
    pub fn has_primary_clients(&self) -> bool {
        self.shared.state.lock().counts.has_primary_clients()
    }

    /// Bound address of the endpoint at `index`, while open
    ///
    /// Useful with `tcp:127.0.0.1:0` to learn the ephemeral port.
    pub fn local_addr(&self, index: usize) -> Option<String> {
        self.shared
            .state
            .lock()
            .slots
            .get(index)
            .and_then(PublisherSlot::local_addr)
    }

    /// Number of records in the backlog
    pub fn backlog_len(&self) -> usize {
        self.shared.state.lock().cache.len()
    }

    /// The configured endpoints
    pub fn endpoints(&self) -> &EndpointTable {
        &self.shared.table
    }

    /// Check if the accept loop is still running
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Stop the accept loop and close every endpoint
    ///
    /// Returns the error that ended the accept loop early, if any.
    pub fn shutdown(mut self) -> Result<()> {
        match self.stop() {
            Some(e) => Err(Error::Multiplex(e)),
            None => Ok(()),
        }
    }

    fn stop(&mut self) -> Option<MultiplexError> {
        let handle = self.accept_thread.take()?;

        self.shared.shutdown.store(true, Ordering::Release);
        if handle.join().is_err() {
            tracing::error!("Accept loop panicked");
        }

        self.shared.state.lock().close_all();
        tracing::info!("Broadcaster stopped");

        self.shared.loop_error.lock().take()
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        if let Some(e) = self.stop() {
            tracing::debug!(error = %e, "Accept loop had failed before drop");
        }
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("endpoints", &self.shared.table)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

/// Background loop: wait for listeners, accept, follow primary demand
fn accept_loop(shared: Arc<Shared>, mut mux: Multiplexer) {
    let interval = shared.config.poll_interval;
    let flush = shared.config.flush_after_write;

    tracing::debug!(interval_ms = interval.as_millis() as u64, "Accept loop running");

    while !shared.shutdown.load(Ordering::Acquire) {
        if mux.is_empty() {
            thread::sleep(interval);
        } else if let Err(e) = mux.wait(interval) {
            tracing::error!(error = %e, "Readiness wait failed, accept loop stopping");
            *shared.loop_error.lock() = Some(e);
            break;
        }

        let mut state = shared.state.lock();
        state.accept_ready(&mux, flush);
        state.reap();
        state.reconcile(&shared.table);
        if state.follow_primary_demand(&shared, &mut mux) {
            state.reconcile(&shared.table);
        }
    }

    shared.accepting.store(false, Ordering::Release);
    tracing::debug!("Accept loop exited");
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    fn config(specs: &[String]) -> BroadcasterConfig {
        BroadcasterConfig::with_endpoints(specs.iter().cloned())
            .poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_no_primary_endpoint() {
        let err = Broadcaster::new(config(&["tcp:127.0.0.1:0;secondary".into()])).unwrap_err();
        assert!(matches!(err, Error::NoPrimaryEndpoint));
        assert!(err.is_config());
    }

    #[test]
    fn test_primary_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("feed.sock");
        let spec = format!("unix:{}", missing.display());

        let err = Broadcaster::new(config(&[spec])).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_primary_open_secondary_closed() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.sock");
        let secondary = dir.path().join("secondary.sock");

        let broadcaster = Broadcaster::new(config(&[
            format!("unix:{}", primary.display()),
            format!("unix:{};secondary", secondary.display()),
        ]))
        .unwrap();

        assert!(broadcaster.is_open(0));
        assert!(!broadcaster.is_open(1));
        assert!(!broadcaster.is_open(2));
        assert!(primary.exists());
        assert!(!secondary.exists());
        assert!(broadcaster.is_accepting());

        broadcaster.shutdown().unwrap();
        assert!(!primary.exists());
    }

    #[test]
    fn test_secondary_follows_primary_demand() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.sock");
        let secondary = dir.path().join("secondary.sock");

        let broadcaster = Broadcaster::new(config(&[
            format!("unix:{}", primary.display()),
            format!("unix:{};secondary", secondary.display()),
        ]))
        .unwrap();

        let client = UnixStream::connect(&primary).unwrap();
        assert!(wait_until(|| broadcaster.is_open(1)));
        assert!(broadcaster.has_primary_clients());
        assert!(secondary.exists());

        drop(client);
        assert!(wait_until(|| !broadcaster.is_open(1)));
        assert!(!broadcaster.has_primary_clients());
        assert!(!secondary.exists());
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let broadcaster = Broadcaster::new(
            BroadcasterConfig::with_endpoints(["tcp:127.0.0.1:0"])
                .poll_interval(Duration::from_millis(50)),
        )
        .unwrap();

        let start = Instant::now();
        broadcaster.shutdown().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
