//! Error types for the ledger
//!
//! This module defines all error types that can occur while registering
//! accounts and moving funds. Every error carries a stable [`ReasonCode`] so
//! callers always receive a structured reason plus a human-readable message.
//!
//! # Error Categories
//!
//! - **Input Errors**: malformed account ids, request bodies, amounts
//! - **Domain Errors**: unknown accounts, insufficient funds, same-account transfers
//! - **Concurrency Errors**: lock or CAS exhaustion, version conflicts
//! - **Storage Errors**: the durable store or journal is unavailable

use super::account::{AccountId, MinorUnits};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// One or more of the referenced accounts does not exist
    ///
    /// For transfers the full identifier pair is reported, without saying
    /// which side was missing.
    #[error("Invalid account identifier(s): {}", join_ids(.ids))]
    AccountNotFound { ids: Vec<AccountId> },

    /// The sender cannot cover the transfer; nothing was applied
    #[error("Insufficient balance in account {account} for a transfer of {requested}")]
    InsufficientFunds {
        account: AccountId,
        requested: MinorUnits,
    },

    /// Transfer amount must be strictly positive
    #[error("Invalid amount {amount}: transfers must move a positive amount")]
    InvalidAmount { amount: i64 },

    /// Sender and recipient are the same account
    #[error("Cannot transfer from account {account} to itself")]
    SameAccount { account: AccountId },

    /// Account locks or CAS retries were exhausted
    #[error("Contention on {operation}: {detail}")]
    Contention { operation: String, detail: String },

    /// The durable store failed after bounded retries
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// The account identifier is not a phone number
    #[error("Invalid account identifier '{value}'")]
    InvalidAccountId { value: String },

    /// The request body could not be validated
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// An idempotency key was reused for a different transfer
    #[error("Client request id '{request_id}' was already used for a different transfer")]
    IdempotencyKeyReuse { request_id: String },

    /// Crediting the recipient would overflow its balance
    #[error("Arithmetic overflow crediting account {account}")]
    ArithmeticOverflow { account: AccountId },

    /// Compare-and-swap saw a different version than expected
    #[error("Version conflict on account {account}: expected {expected}, found {actual}")]
    VersionConflict {
        account: AccountId,
        expected: u64,
        actual: u64,
    },
}

fn join_ids(ids: &[AccountId]) -> String {
    ids.iter()
        .map(AccountId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stable, machine-readable reason codes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NotFound,
    InsufficientFunds,
    InvalidAmount,
    SameAccount,
    Contention,
    StorageUnavailable,
    InvalidAccountId,
    InvalidRequest,
    IdempotencyKeyReuse,
    ArithmeticOverflow,
    VersionConflict,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ReasonCode::NotFound => "NOT_FOUND",
            ReasonCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ReasonCode::InvalidAmount => "INVALID_AMOUNT",
            ReasonCode::SameAccount => "SAME_ACCOUNT",
            ReasonCode::Contention => "CONTENTION",
            ReasonCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ReasonCode::InvalidAccountId => "INVALID_ACCOUNT_ID",
            ReasonCode::InvalidRequest => "INVALID_REQUEST",
            ReasonCode::IdempotencyKeyReuse => "IDEMPOTENCY_KEY_REUSE",
            ReasonCode::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
            ReasonCode::VersionConflict => "VERSION_CONFLICT",
        };
        f.write_str(code)
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::StorageUnavailable {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error
            .position()
            .map(|pos| format!(" at line {}", pos.line()))
            .unwrap_or_default();
        LedgerError::StorageUnavailable {
            message: format!("CSV error{line}: {error}"),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    pub fn account_not_found(ids: Vec<AccountId>) -> Self {
        LedgerError::AccountNotFound { ids }
    }

    pub fn insufficient_funds(account: &AccountId, requested: MinorUnits) -> Self {
        LedgerError::InsufficientFunds {
            account: account.clone(),
            requested,
        }
    }

    pub fn invalid_amount(amount: i64) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    pub fn same_account(account: &AccountId) -> Self {
        LedgerError::SameAccount {
            account: account.clone(),
        }
    }

    pub fn contention(operation: &str, detail: impl Into<String>) -> Self {
        LedgerError::Contention {
            operation: operation.to_string(),
            detail: detail.into(),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        LedgerError::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_account_id(value: &str) -> Self {
        LedgerError::InvalidAccountId {
            value: value.to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        LedgerError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn idempotency_key_reuse(request_id: &str) -> Self {
        LedgerError::IdempotencyKeyReuse {
            request_id: request_id.to_string(),
        }
    }

    pub fn arithmetic_overflow(account: &AccountId) -> Self {
        LedgerError::ArithmeticOverflow {
            account: account.clone(),
        }
    }

    pub fn version_conflict(account: &AccountId, expected: u64, actual: u64) -> Self {
        LedgerError::VersionConflict {
            account: account.clone(),
            expected,
            actual,
        }
    }

    /// The reason code reported to callers for this error
    pub fn code(&self) -> ReasonCode {
        match self {
            LedgerError::AccountNotFound { .. } => ReasonCode::NotFound,
            LedgerError::InsufficientFunds { .. } => ReasonCode::InsufficientFunds,
            LedgerError::InvalidAmount { .. } => ReasonCode::InvalidAmount,
            LedgerError::SameAccount { .. } => ReasonCode::SameAccount,
            LedgerError::Contention { .. } => ReasonCode::Contention,
            LedgerError::StorageUnavailable { .. } => ReasonCode::StorageUnavailable,
            LedgerError::InvalidAccountId { .. } => ReasonCode::InvalidAccountId,
            LedgerError::InvalidRequest { .. } => ReasonCode::InvalidRequest,
            LedgerError::IdempotencyKeyReuse { .. } => ReasonCode::IdempotencyKeyReuse,
            LedgerError::ArithmeticOverflow { .. } => ReasonCode::ArithmeticOverflow,
            LedgerError::VersionConflict { .. } => ReasonCode::VersionConflict,
        }
    }

    /// Whether the engine may retry the failed storage operation
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[rstest]
    #[case::not_found_pair(
        LedgerError::account_not_found(vec![id("5550001"), id("5550002")]),
        "Invalid account identifier(s): 5550001, 5550002"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(&id("5550001"), 2000),
        "Insufficient balance in account 5550001 for a transfer of 2000"
    )]
    #[case::invalid_amount(
        LedgerError::invalid_amount(-5),
        "Invalid amount -5: transfers must move a positive amount"
    )]
    #[case::same_account(
        LedgerError::same_account(&id("5550001")),
        "Cannot transfer from account 5550001 to itself"
    )]
    #[case::contention(
        LedgerError::contention("lock", "timed out after 250ms"),
        "Contention on lock: timed out after 250ms"
    )]
    #[case::storage(
        LedgerError::storage_unavailable("disk full"),
        "Storage unavailable: disk full"
    )]
    #[case::version_conflict(
        LedgerError::version_conflict(&id("5550001"), 3, 4),
        "Version conflict on account 5550001: expected 3, found 4"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::not_found(LedgerError::account_not_found(vec![]), ReasonCode::NotFound, "NOT_FOUND")]
    #[case::insufficient(
        LedgerError::insufficient_funds(&id("5550001"), 1),
        ReasonCode::InsufficientFunds,
        "INSUFFICIENT_FUNDS"
    )]
    #[case::invalid_amount(LedgerError::invalid_amount(0), ReasonCode::InvalidAmount, "INVALID_AMOUNT")]
    #[case::same(LedgerError::same_account(&id("5550001")), ReasonCode::SameAccount, "SAME_ACCOUNT")]
    #[case::contention(LedgerError::contention("cas", "x"), ReasonCode::Contention, "CONTENTION")]
    #[case::storage(
        LedgerError::storage_unavailable("x"),
        ReasonCode::StorageUnavailable,
        "STORAGE_UNAVAILABLE"
    )]
    #[case::key_reuse(
        LedgerError::idempotency_key_reuse("r1"),
        ReasonCode::IdempotencyKeyReuse,
        "IDEMPOTENCY_KEY_REUSE"
    )]
    fn test_reason_codes(
        #[case] error: LedgerError,
        #[case] code: ReasonCode,
        #[case] wire: &str,
    ) {
        assert_eq!(error.code(), code);
        assert_eq!(code.to_string(), wire);
        assert_eq!(serde_json::to_string(&code).unwrap(), format!("\"{wire}\""));
    }

    #[test]
    fn test_only_storage_errors_are_transient() {
        assert!(LedgerError::storage_unavailable("x").is_transient());
        assert!(!LedgerError::contention("lock", "x").is_transient());
        assert!(!LedgerError::invalid_amount(0).is_transient());
    }

    #[test]
    fn test_io_error_maps_to_storage_unavailable() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: LedgerError = io_error.into();
        assert_eq!(error.code(), ReasonCode::StorageUnavailable);
        assert!(error.to_string().contains("denied"));
    }
}
