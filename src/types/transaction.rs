//! Transaction-related types for the ledger
//!
//! This module defines transfer requests, the idempotency key that travels
//! with them, and the immutable transaction records kept in the
//! [`TransactionLog`](crate::core::TransactionLog).

use super::account::{AccountId, MinorUnits};
use super::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-supplied idempotency key
///
/// A retried request carrying the same key is answered from the idempotency
/// cache instead of being applied twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientRequestId(String);

impl ClientRequestId {
    const MAX_LEN: usize = 128;

    /// Parse and validate an idempotency key
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidRequest` if the key is empty, longer than
    /// 128 characters, or contains whitespace or control characters.
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        if value.is_empty() || value.chars().count() > Self::MAX_LEN {
            return Err(LedgerError::invalid_request(format!(
                "client request id must be 1 to {} characters",
                Self::MAX_LEN
            )));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LedgerError::invalid_request(
                "client request id must not contain whitespace",
            ));
        }
        Ok(ClientRequestId(value.to_string()))
    }

    /// Generate a fresh random key
    pub fn generate() -> Self {
        ClientRequestId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientRequestId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClientRequestId::parse(&value)
    }
}

impl From<ClientRequestId> for String {
    fn from(id: ClientRequestId) -> Self {
        id.0
    }
}

/// A validated request to move funds between two accounts
///
/// Transient: only its idempotency key outlives the request, inside the
/// bounded idempotency window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: MinorUnits,
    pub client_request_id: ClientRequestId,
}

impl TransferRequest {
    pub fn new(
        from: AccountId,
        to: AccountId,
        amount: MinorUnits,
        client_request_id: ClientRequestId,
    ) -> Self {
        TransferRequest {
            from,
            to,
            amount,
            client_request_id,
        }
    }

    /// Build a request from raw caller input
    ///
    /// A missing idempotency key is replaced with a freshly generated one, so
    /// such a request is never deduplicated.
    ///
    /// # Errors
    ///
    /// - `InvalidAccountId` if either identifier is malformed
    /// - `InvalidAmount` if the amount is zero or negative
    /// - `InvalidRequest` if the idempotency key is malformed
    pub fn parse(
        from: &str,
        to: &str,
        amount: i64,
        client_request_id: Option<&str>,
    ) -> Result<Self, LedgerError> {
        let from = AccountId::parse(from)?;
        let to = AccountId::parse(to)?;
        let amount = positive_amount(amount)?;
        let client_request_id = match client_request_id {
            Some(key) => ClientRequestId::parse(key)?,
            None => ClientRequestId::generate(),
        };
        Ok(TransferRequest::new(from, to, amount, client_request_id))
    }
}

fn positive_amount(amount: i64) -> Result<MinorUnits, LedgerError> {
    match MinorUnits::try_from(amount) {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(LedgerError::invalid_amount(amount)),
    }
}

/// Final status of a recorded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// An immutable record of a transfer
///
/// The cashback amount is informational metadata: it is computed by the
/// [`CashbackPolicy`](crate::core::CashbackPolicy) and stored with the record,
/// but never credited to any balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Idempotency key of the request that produced this record
    pub client_request_id: ClientRequestId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: MinorUnits,
    pub cashback: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl Transaction {
    /// Create the completed record of `request`, stamped with the current time
    pub fn completed(request: &TransferRequest, cashback: Decimal) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            client_request_id: request.client_request_id.clone(),
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount,
            cashback,
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
        }
    }
}
