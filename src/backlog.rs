//! Backlog cache for late-joiner support
//!
//! When a subscriber connects after records have already been written, it
//! first receives the most recent records, oldest first, then the live
//! stream. The cache is a bounded FIFO counted in records: pushing past
//! capacity evicts the oldest record. Capacity 0 disables it.
//!
//! Only complete records are cached. Fragments written with the partial
//! flag are assembled until the final fragment arrives.

use bytes::{Bytes, BytesMut};

use std::collections::VecDeque;

use crate::endpoint::{ClientId, SocketEndpoint};

/// Bounded FIFO of recently written records
#[derive(Debug)]
pub struct BacklogCache {
    /// Maximum number of records
    capacity: usize,
    /// Cached records, oldest first
    records: VecDeque<Bytes>,
    /// Fragments of the record currently being written
    assembling: BytesMut,
}

impl BacklogCache {
    /// Create a cache holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            assembling: BytesMut::new(),
        }
    }

    /// Check if caching is enabled
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Append a complete record, evicting the oldest if over capacity
    pub fn push(&mut self, record: Bytes) {
        if !self.is_enabled() {
            return;
        }

        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Append one chunk of a record
    ///
    /// The record is cached once the chunk with `partial == false` arrives.
    pub fn push_chunk(&mut self, chunk: &Bytes, partial: bool) {
        if !self.is_enabled() {
            return;
        }

        if partial {
            self.assembling.extend_from_slice(chunk);
        } else if self.assembling.is_empty() {
            self.push(chunk.clone());
        } else {
            self.assembling.extend_from_slice(chunk);
            let record = self.assembling.split().freeze();
            self.push(record);
        }
    }

    /// Write every cached record, oldest first, to one client
    ///
    /// Stops at the first record the client does not take. Returns the number
    /// of records delivered.
    pub fn replay_into(&self, endpoint: &mut dyn SocketEndpoint, client: ClientId) -> usize {
        let mut delivered = 0;
        for record in &self.records {
            if !endpoint.write_to(client, record) {
                break;
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the cache holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

}

#[cfg(test)]
mod tests {
    use std::os::unix::io::RawFd;

    use super::*;
    use crate::endpoint::Address;

    /// Records every replayed record; refuses after `accept_limit`
    struct Recorder {
        address: Address,
        received: Vec<Bytes>,
        accept_limit: usize,
    }

    impl Recorder {
        fn new(accept_limit: usize) -> Self {
            Self {
                address: Address::Stdout,
                received: Vec::new(),
                accept_limit,
            }
        }
    }

    impl SocketEndpoint for Recorder {
        fn address(&self) -> &Address {
            &self.address
        }
        fn readiness_fd(&self) -> Option<RawFd> {
            None
        }
        fn accept(&mut self) -> Vec<ClientId> {
            Vec::new()
        }
        fn write(&mut self, _chunk: &[u8], _partial: bool) -> usize {
            0
        }
        fn write_to(&mut self, _client: ClientId, record: &[u8]) -> bool {
            if self.received.len() >= self.accept_limit {
                return false;
            }
            self.received.push(Bytes::copy_from_slice(record));
            true
        }
        fn flush(&mut self) {}
        fn disconnect_all(&mut self) {}
        fn close(&mut self) {}
        fn size(&self) -> usize {
            0
        }
    }

    fn records(cache: &BacklogCache) -> Vec<Bytes> {
        let mut recorder = Recorder::new(usize::MAX);
        cache.replay_into(&mut recorder, ClientId(1));
        recorder.received
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = BacklogCache::new(2);

        cache.push(Bytes::from_static(b"a"));
        cache.push(Bytes::from_static(b"b"));
        cache.push(Bytes::from_static(b"c"));

        assert_eq!(cache.len(), 2);
        assert_eq!(records(&cache), vec!["b", "c"]);
    }

    #[test]
    fn test_last_k_of_n() {
        let mut cache = BacklogCache::new(5);
        for i in 0..100 {
            cache.push(Bytes::from(format!("{}\n", i)));
        }

        let expected: Vec<Bytes> = (95..100).map(|i| Bytes::from(format!("{}\n", i))).collect();
        assert_eq!(records(&cache), expected);
    }

    #[test]
    fn test_disabled_cache() {
        let mut cache = BacklogCache::new(0);
        assert!(!cache.is_enabled());

        cache.push(Bytes::from_static(b"a"));
        cache.push_chunk(&Bytes::from_static(b"b"), false);

        assert!(cache.is_empty());
        assert!(records(&cache).is_empty());
    }

    #[test]
    fn test_chunks_assembled() {
        let mut cache = BacklogCache::new(4);

        cache.push_chunk(&Bytes::from_static(b"he"), true);
        cache.push_chunk(&Bytes::from_static(b"ll"), true);
        assert!(cache.is_empty());

        cache.push_chunk(&Bytes::from_static(b"o\n"), false);
        cache.push_chunk(&Bytes::from_static(b"x\n"), false);

        assert_eq!(records(&cache), vec!["hello\n", "x\n"]);
    }

    #[test]
    fn test_replay_oldest_first() {
        let mut cache = BacklogCache::new(3);
        for r in ["a", "b", "c", "d"] {
            cache.push(Bytes::from(r));
        }

        let mut recorder = Recorder::new(usize::MAX);
        assert_eq!(cache.replay_into(&mut recorder, ClientId(1)), 3);
        assert_eq!(recorder.received, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_replay_stops_when_refused() {
        let mut cache = BacklogCache::new(3);
        for r in ["a", "b", "c"] {
            cache.push(Bytes::from(r));
        }

        let mut recorder = Recorder::new(1);
        assert_eq!(cache.replay_into(&mut recorder, ClientId(1)), 1);
        assert_eq!(recorder.received, vec!["a"]);
    }
}
