//! Client count side channel

use chrono::Utc;

use std::fmt;
use std::io::{self, Write};

use super::counts::ClientCounts;

/// Writes one CSV line per client count change
pub struct CountReporter {
    out: Box<dyn Write + Send>,
}

impl CountReporter {
    /// Report to standard output
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Report to any writer
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    /// Write the current counts, stamped with the current time
    pub fn report(&mut self, counts: &ClientCounts) {
        let line = counts.report_line(Utc::now());
        let result = writeln!(self.out, "{}", line).and_then(|()| self.out.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write client counts");
        }
    }
}

impl Default for CountReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for CountReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountReporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_report_writes_line() {
        let buf = Shared::default();
        let mut reporter = CountReporter::new(Box::new(buf.clone()));

        reporter.report(&ClientCounts::new(2));
        reporter.report(&ClientCounts::new(2));

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Z,0,0"));
    }
}
