//! In-memory account store
//!
//! `InMemoryAccountStore` keeps every account in a single `HashMap` guarded by
//! an `RwLock`. A single lock is what makes [`compare_and_swap_all`] atomic for
//! readers: a debit and its matching credit become visible together.
//!
//! Contention on the map lock is short-lived; the long-held, per-account
//! serialization of transfers lives in [`LockTable`](super::LockTable).
//!
//! With a registration journal attached, a new account is recorded and
//! flushed before it becomes visible. A failed journal write leaves the
//! account unregistered.
//!
//! [`compare_and_swap_all`]: AccountStore::compare_and_swap_all

use super::journal::Journal;
use super::traits::{AccountStore, BalanceUpdate};
use crate::types::{Account, AccountId, LedgerError, MinorUnits, Registration};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    registrations: Option<Mutex<Journal>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given accounts (e.g. from a snapshot)
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
            registrations: None,
        }
    }

    /// Build a pre-populated store that journals every new registration
    pub fn with_journal(
        accounts: impl IntoIterator<Item = Account>,
        registrations: Journal,
    ) -> Self {
        Self {
            registrations: Some(Mutex::new(registrations)),
            ..Self::with_accounts(accounts)
        }
    }

    /// Make every journaled registration durable
    pub fn sync(&self) -> Result<(), LedgerError> {
        if let Some(journal) = &self.registrations {
            journal
                .lock()
                .map_err(|_| LedgerError::storage_unavailable("registration journal lock poisoned"))?
                .sync()?;
        }
        Ok(())
    }

    fn record_registration(&self, account: &Account) -> Result<(), LedgerError> {
        if let Some(journal) = &self.registrations {
            journal
                .lock()
                .map_err(|_| LedgerError::storage_unavailable("registration journal lock poisoned"))?
                .record(&Registration::from(account))?;
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<AccountId, Account>>, LedgerError> {
        self.accounts
            .read()
            .map_err(|_| LedgerError::storage_unavailable("account store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<AccountId, Account>>, LedgerError> {
        self.accounts
            .write()
            .map_err(|_| LedgerError::storage_unavailable("account store lock poisoned"))
    }
}

fn check_version(account: &Account, expected_version: u64) -> Result<(), LedgerError> {
    if account.version != expected_version {
        return Err(LedgerError::version_conflict(
            &account.id,
            expected_version,
            account.version,
        ));
    }
    Ok(())
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::account_not_found(vec![id.clone()]))
    }

    fn get_or_create(
        &self,
        id: &AccountId,
        initial_balance: MinorUnits,
    ) -> Result<Account, LedgerError> {
        // Fast path for existing accounts
        if let Some(account) = self.read()?.get(id) {
            return Ok(account.clone());
        }

        // Re-checked under the write lock, so only one creator wins
        let mut accounts = self.write()?;
        if let Some(account) = accounts.get(id) {
            return Ok(account.clone());
        }

        let account = Account::new(id.clone(), initial_balance);
        self.record_registration(&account)?;
        accounts.insert(id.clone(), account.clone());
        Ok(account)
    }

    fn compare_and_swap(
        &self,
        id: &AccountId,
        expected_version: u64,
        new_balance: MinorUnits,
    ) -> Result<Account, LedgerError> {
        let mut accounts = self.write()?;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::account_not_found(vec![id.clone()]))?;

        check_version(account, expected_version)?;

        account.balance = new_balance;
        account.version += 1;
        Ok(account.clone())
    }

    fn compare_and_swap_all(&self, updates: &[BalanceUpdate]) -> Result<Vec<Account>, LedgerError> {
        let mut accounts = self.write()?;

        // Validate everything before touching anything
        for update in updates {
            let account = accounts
                .get(&update.id)
                .ok_or_else(|| LedgerError::account_not_found(vec![update.id.clone()]))?;
            check_version(account, update.expected_version)?;
        }

        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            if let Some(account) = accounts.get_mut(&update.id) {
                account.balance = update.new_balance;
                account.version += 1;
                updated.push(account.clone());
            }
        }
        Ok(updated)
    }

    fn all(&self) -> Result<Vec<Account>, LedgerError> {
        let mut accounts: Vec<Account> = self.read()?.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }
}
