//! Append-only CSV journal
//!
//! Shared by the account store (registrations) and the transaction log
//! (completed transfers). Each record is serialized on its own, written to
//! the sink in one piece and flushed before the caller makes the change
//! visible in memory.
//!
//! After a failed write the journal drops its sink and refuses every further
//! record and flush. No rejected row is ever buffered, so none can reach the
//! file later. A partially written row has no trailing newline and is cut
//! when the data directory is next opened.
//!
//! Flushing hands the bytes to the operating system; the journal does not
//! fsync each record. A power failure can lose the most recent records, and
//! [`Journal::sync`] is only called on close.

use crate::types::LedgerError;
use serde::Serialize;
use std::fs::File;
use std::io::Write;

/// Byte sink a journal appends to
pub trait JournalSink: Write + Send {
    /// Make everything written so far durable
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }
}

impl JournalSink for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }
}

pub struct Journal {
    sink: Option<Box<dyn JournalSink>>,
    write_headers: bool,
}

impl Journal {
    /// A journal over `sink`; headers are only written for a fresh journal
    pub fn new(sink: Box<dyn JournalSink>, write_headers: bool) -> Self {
        Self {
            sink: Some(sink),
            write_headers,
        }
    }

    /// Serialize, write and flush one record
    pub fn record<T: Serialize>(&mut self, entry: &T) -> Result<(), LedgerError> {
        let bytes = self.encode(entry)?;
        let sink = self.sink_mut()?;

        if let Err(e) = sink.write_all(&bytes).and_then(|()| sink.flush()) {
            self.sink = None;
            return Err(e.into());
        }
        self.write_headers = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LedgerError> {
        let sink = self.sink_mut()?;
        if let Err(e) = sink.flush() {
            self.sink = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Flush and make every record durable
    pub fn sync(&mut self) -> Result<(), LedgerError> {
        self.flush()?;
        let sink = self.sink_mut()?;
        if let Err(e) = sink.sync() {
            self.sink = None;
            return Err(e.into());
        }
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.sink.is_none()
    }

    fn sink_mut(&mut self) -> Result<&mut Box<dyn JournalSink>, LedgerError> {
        self.sink.as_mut().ok_or_else(|| {
            LedgerError::storage_unavailable("journal is unusable after an earlier write failure")
        })
    }

    fn encode<T: Serialize>(&self, entry: &T) -> Result<Vec<u8>, LedgerError> {
        let mut encoder = csv::WriterBuilder::new()
            .has_headers(self.write_headers)
            .from_writer(Vec::new());
        encoder.serialize(entry)?;
        encoder
            .into_inner()
            .map_err(|e| LedgerError::storage_unavailable(format!("failed to encode journal row: {e}")))
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}
