//! Broadcaster configuration

use std::time::Duration;

use crate::endpoint::{EndpointOptions, Framing};

/// Broadcaster configuration options
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Endpoint specs, e.g. `tcp:9000;primary` or `unix:/tmp/feed;secondary`
    pub endpoints: Vec<String>,

    /// Fixed record size in bytes (0 = line oriented)
    pub record_size: usize,

    /// Drop whole records for clients that cannot keep up
    pub discard_when_full: bool,

    /// Flush transports after each record and after backlog replay
    pub flush_after_write: bool,

    /// Emit a CSV line whenever client counts change
    pub report_client_counts: bool,

    /// Make `write` return false once every client has gone
    pub exit_on_drain: bool,

    /// Backlog capacity in records (0 = disabled)
    pub cache_size: usize,

    /// Accept loop wait timeout
    pub poll_interval: Duration,

    /// Longest a blocking client write may stall before the client is dropped
    pub write_timeout: Duration,

    /// Ignore SIGPIPE process-wide at construction
    pub ignore_sigpipe: bool,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            record_size: 0,
            discard_when_full: false,
            flush_after_write: false,
            report_client_counts: false,
            exit_on_drain: false,
            cache_size: 0,
            poll_interval: Duration::from_millis(100),
            write_timeout: Duration::from_secs(5),
            ignore_sigpipe: true,
        }
    }
}

impl BroadcasterConfig {
    /// Create a config for the given endpoint specs
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add an endpoint spec
    pub fn endpoint(mut self, spec: impl Into<String>) -> Self {
        self.endpoints.push(spec.into());
        self
    }

    /// Set fixed record size (0 = line oriented)
    pub fn record_size(mut self, size: usize) -> Self {
        self.record_size = size;
        self
    }

    /// Drop records for slow clients instead of blocking
    pub fn discard_when_full(mut self, discard: bool) -> Self {
        self.discard_when_full = discard;
        self
    }

    /// Flush after every record
    pub fn flush_after_write(mut self, flush: bool) -> Self {
        self.flush_after_write = flush;
        self
    }

    /// Emit client count lines
    pub fn report_client_counts(mut self, report: bool) -> Self {
        self.report_client_counts = report;
        self
    }

    /// Signal drain from `write`
    pub fn exit_on_drain(mut self, exit: bool) -> Self {
        self.exit_on_drain = exit;
        self
    }

    /// Set backlog capacity
    pub fn cache_size(mut self, records: usize) -> Self {
        self.cache_size = records;
        self
    }

    /// Set accept loop wait timeout
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set blocking write stall limit
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Leave the SIGPIPE disposition alone
    pub fn keep_sigpipe(mut self) -> Self {
        self.ignore_sigpipe = false;
        self
    }

    /// Options handed to every opened endpoint
    pub fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions {
            framing: Framing::from_record_size(self.record_size),
            discard_when_full: self.discard_when_full,
            flush_after_write: self.flush_after_write,
            write_timeout: self.write_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BroadcasterConfig::default();

        assert!(config.endpoints.is_empty());
        assert_eq!(config.record_size, 0);
        assert_eq!(config.cache_size, 0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.ignore_sigpipe);
        assert!(!config.exit_on_drain);
        assert!(!config.report_client_counts);
    }

    #[test]
    fn test_builder() {
        let config = BroadcasterConfig::with_endpoints(["tcp:9000"])
            .endpoint("tcp:9001;secondary")
            .cache_size(2)
            .exit_on_drain(true)
            .keep_sigpipe();

        assert_eq!(config.endpoints, vec!["tcp:9000", "tcp:9001;secondary"]);
        assert_eq!(config.cache_size, 2);
        assert!(config.exit_on_drain);
        assert!(!config.ignore_sigpipe);
    }

    #[test]
    fn test_endpoint_options() {
        let options = BroadcasterConfig::default()
            .record_size(188)
            .discard_when_full(true)
            .write_timeout(Duration::from_millis(250))
            .endpoint_options();

        assert_eq!(options.framing, Framing::Packet(188));
        assert!(options.discard_when_full);
        assert!(!options.flush_after_write);
        assert_eq!(options.write_timeout, Duration::from_millis(250));
    }
}
