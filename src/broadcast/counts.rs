//! Client count reconciliation
//!
//! The broadcaster keeps the last observed client count of every endpoint.
//! Reconciliation compares current sizes against it and derives whether any
//! primary endpoint has subscribers and whether the session has drained.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::endpoint::EndpointTable;

/// Last observed client counts and derived flags
#[derive(Debug, Clone, Default)]
pub struct ClientCounts {
    counts: Vec<usize>,
    has_primary_clients: bool,
    got_first_client: bool,
}

impl ClientCounts {
    /// Counts for `len` endpoints, all zero
    pub fn new(len: usize) -> Self {
        Self {
            counts: vec![0; len],
            has_primary_clients: false,
            got_first_client: false,
        }
    }

    /// Record current sizes; returns true if any count changed
    ///
    /// `sizes` yields one count per endpoint, in table order.
    pub fn reconcile(
        &mut self,
        sizes: impl IntoIterator<Item = usize>,
        table: &EndpointTable,
    ) -> bool {
        let mut changed = false;
        for (count, size) in self.counts.iter_mut().zip(sizes) {
            if *count != size {
                *count = size;
                changed = true;
            }
        }

        self.has_primary_clients = self
            .counts
            .iter()
            .enumerate()
            .any(|(i, &n)| n > 0 && table.is_primary(i));

        if self.total() > 0 {
            self.got_first_client = true;
        }

        changed
    }

    /// Per-endpoint counts in table order
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Clients across all endpoints
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Check if any primary endpoint has a client
    pub fn has_primary_clients(&self) -> bool {
        self.has_primary_clients
    }

    /// Check if a session that had clients now has none
    pub fn drained(&self) -> bool {
        self.got_first_client && self.total() == 0
    }

    /// Format a report line: `<UTC timestamp>,<count 0>,<count 1>,...`
    pub fn report_line(&self, at: DateTime<Utc>) -> String {
        let mut line = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        for count in &self.counts {
            line.push(',');
            line.push_str(&count.to_string());
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn table() -> EndpointTable {
        EndpointTable::parse(&["tcp:9000", "tcp:9001;secondary", "tcp:9002"]).unwrap()
    }

    #[test]
    fn test_reconcile_detects_changes() {
        let table = table();
        let mut counts = ClientCounts::new(table.len());

        assert!(!counts.reconcile([0, 0, 0], &table));
        assert!(counts.reconcile([1, 0, 0], &table));
        assert!(!counts.reconcile([1, 0, 0], &table));
        assert_eq!(counts.counts(), &[1, 0, 0]);
    }

    #[test]
    fn test_has_primary_clients() {
        let table = table();
        let mut counts = ClientCounts::new(table.len());

        counts.reconcile([0, 3, 0], &table);
        assert!(!counts.has_primary_clients());

        counts.reconcile([0, 3, 1], &table);
        assert!(counts.has_primary_clients());

        // Recomputed, not latched
        counts.reconcile([0, 3, 0], &table);
        assert!(!counts.has_primary_clients());
    }

    #[test]
    fn test_drained() {
        let table = table();
        let mut counts = ClientCounts::new(table.len());

        counts.reconcile([0, 0, 0], &table);
        assert!(!counts.drained());

        counts.reconcile([0, 1, 0], &table);
        assert!(!counts.drained());

        counts.reconcile([0, 0, 0], &table);
        assert!(counts.drained());

        counts.reconcile([1, 0, 0], &table);
        assert!(!counts.drained());
    }

    #[test]
    fn test_report_line() {
        let mut counts = ClientCounts::new(3);
        counts.counts = vec![2, 0, 5];
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        assert_eq!(counts.report_line(at), "2024-03-01T12:30:05.000Z,2,0,5");
    }
}
