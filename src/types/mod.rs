//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account identifiers and account state
//! - `transaction`: Transfer requests, transaction records and idempotency keys
//! - `error`: Error types and reason codes for the ledger

pub mod account;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountId, MinorUnits, Registration};
pub use error::{LedgerError, ReasonCode};
pub use transaction::{ClientRequestId, Transaction, TransactionStatus, TransferRequest};
