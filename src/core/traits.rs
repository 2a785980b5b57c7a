//! Core traits for account storage and the transaction log
//!
//! These are the seams between the [`LedgerEngine`](super::LedgerEngine) and
//! the durable store. The in-memory implementations in this crate back the
//! CLI and the tests; another backend only has to honour the same contracts.

use crate::types::{Account, AccountId, LedgerError, MinorUnits, Transaction};

/// A single conditional balance update
///
/// Applied only if the account is still at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub id: AccountId,
    pub expected_version: u64,
    pub new_balance: MinorUnits,
}

impl BalanceUpdate {
    /// Build an update that replaces `account`'s balance, conditioned on its current version
    pub fn from_account(account: &Account, new_balance: MinorUnits) -> Self {
        BalanceUpdate {
            id: account.id.clone(),
            expected_version: account.version,
            new_balance,
        }
    }
}

/// Durable mapping from account id to balance and version
pub trait AccountStore: Send + Sync {
    /// Get an account, or `AccountNotFound` if it was never created
    fn get(&self, id: &AccountId) -> Result<Account, LedgerError>;

    /// Create the account with `initial_balance` if absent, otherwise return it unchanged
    ///
    /// Must be atomic: concurrent calls with the same id create exactly one account.
    fn get_or_create(
        &self,
        id: &AccountId,
        initial_balance: MinorUnits,
    ) -> Result<Account, LedgerError>;

    /// Replace the balance of one account if it is still at `expected_version`
    ///
    /// Returns the updated account (with a bumped version) or `VersionConflict`.
    fn compare_and_swap(
        &self,
        id: &AccountId,
        expected_version: u64,
        new_balance: MinorUnits,
    ) -> Result<Account, LedgerError>;

    /// Apply every update, or none of them
    ///
    /// All versions are checked before anything is written, and readers never
    /// observe a state where only some of the updates are visible.
    fn compare_and_swap_all(&self, updates: &[BalanceUpdate]) -> Result<Vec<Account>, LedgerError>;

    /// Snapshot of every account, sorted by id
    fn all(&self) -> Result<Vec<Account>, LedgerError>;
}

/// Durable, append-only record of completed transfers
pub trait TransactionLog: Send + Sync {
    /// Append a transaction; existing entries are never mutated or removed
    fn append(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Transactions involving `id`, oldest first
    ///
    /// The returned history is a snapshot: querying again yields the same
    /// entries or a later superset.
    fn query_by_account(&self, id: &AccountId) -> Result<super::History, LedgerError>;

    /// Number of entries in the log
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
