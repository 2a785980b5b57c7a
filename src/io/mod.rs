//! I/O module
//!
//! Handles CSV parsing, output and the on-disk ledger.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, journals, account output)
//! - `async_reader` - Asynchronous CSV reader with batch reading interface
//! - `persistence` - Data directory with journals and balance snapshot

pub mod async_reader;
pub mod csv_format;
pub mod persistence;

pub use async_reader::AsyncReader;
pub use csv_format::{convert_csv_record, write_accounts_csv, TransferCsvRecord};
pub use persistence::LedgerStore;
