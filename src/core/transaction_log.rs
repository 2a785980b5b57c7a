//! Append-only transaction log
//!
//! `AppendOnlyLog` keeps every completed transfer in memory, indexed by the
//! accounts it touches, and optionally mirrors each append to a CSV journal.
//!
//! # Durability
//!
//! When a journal is attached, an entry is serialized and flushed to the
//! journal *before* it becomes visible in memory. A failed journal write
//! leaves the in-memory log untouched and surfaces `StorageUnavailable`, so
//! the engine can roll the transfer back.

use super::journal::Journal;
use super::traits::TransactionLog;
use crate::types::{AccountId, LedgerError, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<Arc<Transaction>>,
    by_account: HashMap<AccountId, Vec<usize>>,
}

impl LogState {
    fn push(&mut self, transaction: Transaction) {
        let position = self.entries.len();
        for account in [&transaction.from, &transaction.to] {
            self.by_account
                .entry(account.clone())
                .or_default()
                .push(position);
        }
        self.entries.push(Arc::new(transaction));
    }
}

pub struct AppendOnlyLog {
    state: RwLock<LogState>,
    journal: Option<Mutex<Journal>>,
}

impl AppendOnlyLog {
    /// A log that lives only in memory
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            journal: None,
        }
    }

    /// A log restored from `existing` entries that journals every new append to `journal`
    pub fn with_journal(existing: Vec<Transaction>, journal: Journal) -> Self {
        let mut state = LogState::default();
        for transaction in existing {
            state.push(transaction);
        }
        Self {
            state: RwLock::new(state),
            journal: Some(Mutex::new(journal)),
        }
    }

    /// Make every journaled transaction durable
    pub fn sync(&self) -> Result<(), LedgerError> {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .map_err(|_| LedgerError::storage_unavailable("journal lock poisoned"))?
                .sync()?;
        }
        Ok(())
    }

    /// The last `count` entries, in append order
    pub fn recent(&self, count: usize) -> Result<Vec<Transaction>, LedgerError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerError::storage_unavailable("transaction log lock poisoned"))?;
        let skip = state.entries.len().saturating_sub(count);
        Ok(state.entries[skip..]
            .iter()
            .map(|entry| Transaction::clone(entry))
            .collect())
    }

    fn push_visible(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.state
            .write()
            .map_err(|_| LedgerError::storage_unavailable("transaction log lock poisoned"))?
            .push(transaction);
        Ok(())
    }
}

impl Default for AppendOnlyLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppendOnlyLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyLog")
            .field("len", &self.len())
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}

impl TransactionLog for AppendOnlyLog {
    fn append(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let Some(journal) = &self.journal else {
            return self.push_visible(transaction);
        };

        // The journal mutex is held until the entry is visible, so memory
        // order always matches journal order.
        let mut journal = journal
            .lock()
            .map_err(|_| LedgerError::storage_unavailable("journal lock poisoned"))?;
        journal.record(&transaction)?;
        self.push_visible(transaction)
    }

    fn query_by_account(&self, id: &AccountId) -> Result<History, LedgerError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerError::storage_unavailable("transaction log lock poisoned"))?;

        let mut entries: Vec<Arc<Transaction>> = state
            .by_account
            .get(id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| Arc::clone(&state.entries[position]))
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort: entries with equal timestamps keep append order
        entries.sort_by_key(|transaction| transaction.timestamp);
        Ok(History::new(entries))
    }

    fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.entries.len())
            .unwrap_or_default()
    }
}

/// A snapshot of one account's transactions, oldest first
///
/// Entries are shared with the log and cloned only as the iterator advances.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: std::vec::IntoIter<Arc<Transaction>>,
}

impl History {
    fn new(entries: Vec<Arc<Transaction>>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for History {
    type Item = Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| (*entry).clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for History {}
