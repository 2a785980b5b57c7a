//! Account-related types for the ledger
//!
//! This module defines the account identifier (a phone number) and the
//! account state held by the [`AccountStore`](crate::core::AccountStore).

use super::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Balance amounts in integer minor units (e.g. cents)
pub type MinorUnits = u64;

/// Account identifier
///
/// Accounts are keyed by phone number. The identifier is validated on
/// construction, so every `AccountId` in the system is well formed:
/// an optional leading `+` followed by 3 to 15 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    const MIN_DIGITS: usize = 3;
    const MAX_DIGITS: usize = 15;

    /// Parse and validate a phone-number account identifier
    ///
    /// Surrounding whitespace is trimmed and a leading `+` is dropped, so
    /// `+5550001` and `5550001` name the same account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAccountId` if the value is not a phone number.
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let well_formed = (Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len())
            && digits.bytes().all(|b| b.is_ascii_digit());

        if !well_formed {
            return Err(LedgerError::invalid_account_id(value));
        }

        Ok(AccountId(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Account state
///
/// Accounts are created on first login and never deleted. The balance is
/// only mutated by the [`LedgerEngine`](crate::core::LedgerEngine), through
/// versioned compare-and-swap on the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The phone number identifying this account
    pub id: AccountId,

    /// Balance in minor units; unsigned, so it can never go negative
    pub balance: MinorUnits,

    /// Optimistic-concurrency version, bumped on every balance change
    pub version: u64,
}

impl Account {
    /// Create a new account at version 0
    pub fn new(id: AccountId, balance: MinorUnits) -> Self {
        Account {
            id,
            balance,
            version: 0,
        }
    }
}

/// Journal record of an account's first login
///
/// Balances are never journaled directly: they are rebuilt from the opening
/// balance of each registration plus the completed transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: AccountId,
    pub initial_balance: MinorUnits,
}

impl From<&Account> for Registration {
    fn from(account: &Account) -> Self {
        Registration {
            id: account.id.clone(),
            initial_balance: account.balance,
        }
    }
}
