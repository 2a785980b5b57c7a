//! Bounded idempotency cache
//!
//! Maps each [`ClientRequestId`] to a slot that holds the outcome of the first
//! successful execution. Concurrent duplicates share the slot: they wait on
//! the same `OnceCell` initialisation instead of running the transfer again.
//!
//! # Retention
//!
//! The cache keeps at most `capacity` keys, evicting the oldest first. A slot
//! is only evicted once it has completed, or once nobody else holds it; an
//! in-flight slot is never dropped, since a duplicate arriving afterwards
//! would otherwise start a second execution.
//!
//! # Restart
//!
//! Keys live in memory only. A ledger reopened from its journal restores the
//! newest completed transactions with [`IdempotencyCache::restore`], so a
//! retry after a restart is still answered from the cache.

use crate::types::{AccountId, ClientRequestId, LedgerError, MinorUnits, Transaction, TransferRequest};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// The parts of a request that must match for a key to be replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFingerprint {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: MinorUnits,
}

impl From<&TransferRequest> for RequestFingerprint {
    fn from(request: &TransferRequest) -> Self {
        Self {
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount,
        }
    }
}

impl From<&Transaction> for RequestFingerprint {
    fn from(transaction: &Transaction) -> Self {
        Self {
            from: transaction.from.clone(),
            to: transaction.to.clone(),
            amount: transaction.amount,
        }
    }
}

#[derive(Debug)]
pub struct IdempotencySlot {
    fingerprint: RequestFingerprint,
    outcome: OnceCell<Transaction>,
}

impl IdempotencySlot {
    /// The recorded transaction, once the first execution has succeeded
    pub fn get(&self) -> Option<&Transaction> {
        self.outcome.get()
    }

    /// Run `execute` unless an earlier execution already succeeded
    ///
    /// Concurrent callers on the same slot are serialised; a failed execution
    /// leaves the slot empty so the next caller tries again.
    pub async fn get_or_execute<F, Fut>(&self, execute: F) -> Result<&Transaction, LedgerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Transaction, LedgerError>>,
    {
        self.outcome.get_or_try_init(execute).await
    }
}

#[derive(Debug)]
pub struct IdempotencyCache {
    slots: DashMap<ClientRequestId, Arc<IdempotencySlot>>,
    order: Mutex<VecDeque<ClientRequestId>>,
    capacity: usize,
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Look up or reserve the slot for `request`'s key
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyKeyReuse` if the key was already used for a
    /// transfer with a different sender, recipient or amount.
    pub fn slot_for(&self, request: &TransferRequest) -> Result<Arc<IdempotencySlot>, LedgerError> {
        let fingerprint = RequestFingerprint::from(request);
        let mut inserted = false;

        let slot = Arc::clone(
            self.slots
                .entry(request.client_request_id.clone())
                .or_insert_with(|| {
                    inserted = true;
                    Arc::new(IdempotencySlot {
                        fingerprint: fingerprint.clone(),
                        outcome: OnceCell::new(),
                    })
                })
                .value(),
        );

        if slot.fingerprint != fingerprint {
            return Err(LedgerError::idempotency_key_reuse(
                request.client_request_id.as_str(),
            ));
        }

        if inserted {
            self.remember(request.client_request_id.clone());
        }
        Ok(slot)
    }

    /// Fill completed slots from recorded transactions, oldest first
    ///
    /// Only the newest `capacity` keys are kept. A key already in the cache
    /// is left alone.
    pub fn restore(&self, transactions: impl IntoIterator<Item = Transaction>) {
        for transaction in transactions {
            let key = transaction.client_request_id.clone();
            let mut inserted = false;
            self.slots.entry(key.clone()).or_insert_with(|| {
                inserted = true;
                Arc::new(IdempotencySlot {
                    fingerprint: RequestFingerprint::from(&transaction),
                    outcome: OnceCell::from(transaction),
                })
            });
            if inserted {
                self.remember(key);
            }
        }
    }

    /// Number of keys currently retained
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn remember(&self, key: ClientRequestId) {
        // The queue only orders keys; a poisoned guard still holds a usable queue
        let mut order = self.order.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        order.push_back(key);

        let mut budget = order.len();
        while order.len() > self.capacity && budget > 0 {
            budget -= 1;
            let Some(oldest) = order.pop_front() else {
                break;
            };
            // Evictable once completed, or once the map holds the only reference
            let evicted = self
                .slots
                .remove_if(&oldest, |_, slot| {
                    slot.outcome.initialized() || Arc::strong_count(slot) == 1
                })
                .is_some();
            if !evicted && self.slots.contains_key(&oldest) {
                order.push_back(oldest);
            }
        }
    }
}
