//! Last-operation diagnostic record.
//!
//! One bounded string, last-writer-wins. Updated only by successful
//! operations, after the hardware token has been released; error paths
//! never touch it. Readers always get a complete value because updates are
//! serialized by the record's own mutex, not the hardware token.

use core::fmt::{self, Write};
use parking_lot::Mutex;

/// Capacity of the diagnostic record in bytes
pub const DIAG_CAPACITY: usize = 96;

/// Text shown before any operation has completed
const DEFAULT_TEXT: &str = "No messages.";

type Record = heapless::String<DIAG_CAPACITY>;

/// Formats into a record, dropping whatever exceeds capacity.
struct Truncating<'a> {
    record: &'a mut Record,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, text: &str) -> fmt::Result {
        for c in text.chars() {
            if self.record.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// The bounded last-operation record.
pub struct DiagnosticLog {
    record: Mutex<Record>,
}

impl DiagnosticLog {
    /// Create a record holding the default text.
    pub fn new() -> Self {
        let mut record = Record::new();
        let _ = record.push_str(DEFAULT_TEXT);
        Self {
            record: Mutex::new(record),
        }
    }

    /// Overwrite the record, truncating at capacity.
    fn set(&self, args: fmt::Arguments<'_>) {
        let mut fresh = Record::new();
        // A full record means truncation, not failure.
        let _ = Truncating {
            record: &mut fresh,
        }
        .write_fmt(args);
        *self.record.lock() = fresh;
    }

    /// Note a completed read.
    pub fn record_read(&self, byte: u8) {
        self.set(format_args!("Read char: {}", byte as char));
    }

    /// Note a completed write.
    pub fn record_write(&self, byte: u8) {
        self.set(format_args!("Wrote char: {}", byte as char));
    }

    /// Note a completed reset.
    pub fn record_reset(&self) {
        self.set(format_args!("Reset performed."));
    }

    /// Current record verbatim, with a trailing newline. Never fails.
    pub fn show(&self) -> String {
        format!("{}\n", self.record.lock())
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_text_before_any_operation() {
        let diag = DiagnosticLog::new();
        assert_eq!(diag.show(), "No messages.\n");
    }

    #[test]
    fn test_last_writer_wins() {
        let diag = DiagnosticLog::new();
        diag.record_write(b'A');
        assert_eq!(diag.show(), "Wrote char: A\n");
        diag.record_read(b'B');
        assert_eq!(diag.show(), "Read char: B\n");
        diag.record_reset();
        assert_eq!(diag.show(), "Reset performed.\n");
    }

    #[test]
    fn test_overlong_text_truncates() {
        let diag = DiagnosticLog::new();
        let long = "x".repeat(DIAG_CAPACITY * 2);
        diag.set(format_args!("{long}"));
        let shown = diag.show();
        assert_eq!(shown.len(), DIAG_CAPACITY + 1);
        assert!(shown.ends_with('\n'));
    }
}
