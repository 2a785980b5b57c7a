//! CSV format handling for transfer input, journals and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - `TransferCsvRecord` for replay input (`request_id,from,to,amount`)
//! - Conversion from CSV records to transfer requests
//! - Readers for the registration and transaction journals
//! - Account output serialization (`id,balance,version`)
//!
//! Everything works over `Read`/`Write`, so the functions are easy to test
//! against in-memory buffers.

use crate::types::{Account, LedgerError, Registration, Transaction, TransferRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::{Read, Write};

/// CSV record structure for replay input
///
/// Matches the input CSV format with columns: request_id, from, to, amount.
/// The request id may be left empty, in which case a fresh key is generated
/// and the row is never deduplicated.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransferCsvRecord {
    pub request_id: Option<String>,
    pub from: String,
    pub to: String,
    pub amount: String,
}

/// Convert a `TransferCsvRecord` to a `TransferRequest`
///
/// # Errors
///
/// - `InvalidAmount` if the amount is not a positive integer
/// - any validation error of [`TransferRequest::parse`]
pub fn convert_csv_record(record: TransferCsvRecord) -> Result<TransferRequest, LedgerError> {
    let amount = record.amount.trim();
    let amount: i64 = amount.parse().map_err(|_| {
        LedgerError::invalid_request(format!("invalid amount '{amount}': expected minor units"))
    })?;

    let request_id = record
        .request_id
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());

    TransferRequest::parse(&record.from, &record.to, amount, request_id)
}

/// Write account states to CSV format
///
/// Writes accounts with columns: id, balance, version.
/// Accounts are sorted by id for deterministic output.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    // Header is written explicitly so an empty ledger still yields one
    writer.write_record(["id", "balance", "version"])?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by(|a, b| a.id.cmp(&b.id));

    for account in sorted_accounts {
        writer.write_record(&[
            account.id.to_string(),
            account.balance.to_string(),
            account.version.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Read an account snapshot written by [`write_accounts_csv`]
pub fn read_accounts_csv(input: impl Read) -> Result<Vec<Account>, LedgerError> {
    read_records(input, "account snapshot")
}

/// Read the registration journal
pub fn read_registrations(input: impl Read) -> Result<Vec<Registration>, LedgerError> {
    read_records(input, "registration journal")
}

/// Read the transaction journal
pub fn read_transactions(input: impl Read) -> Result<Vec<Transaction>, LedgerError> {
    read_records(input, "transaction journal")
}

/// Journals are written by this crate, so any malformed row means the file
/// is damaged and the whole read fails.
fn read_records<T: DeserializeOwned>(input: impl Read, what: &str) -> Result<Vec<T>, LedgerError> {
    csv::Reader::from_reader(input)
        .deserialize()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|e| {
                LedgerError::storage_unavailable(format!("corrupt {what} at row {}: {e}", row + 1))
            })
        })
        .collect()
}
