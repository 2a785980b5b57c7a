//! Ledger engine
//!
//! This module provides the `LedgerEngine`, which moves funds between accounts
//! by coordinating the [`AccountStore`], the [`TransactionLog`], per-account
//! locks and the idempotency cache.
//!
//! # Transfer algorithm
//!
//! 1. Validate the request (positive amount, distinct accounts)
//! 2. Reserve the idempotency slot; a completed key is answered from the cache
//! 3. Resolve both accounts
//! 4. Lock both accounts in ascending id order, with a deadline
//! 5. Re-read, check funds, and commit debit + credit with one multi-key CAS
//! 6. Compute cashback and append the transaction record
//! 7. If the append fails, restore both balances before reporting the error
//!
//! # Cancellation
//!
//! Steps 5 to 7 contain no `.await`. A request dropped while waiting for a
//! lock leaves no trace; once the commit starts, it runs to completion and its
//! result is recorded under the idempotency key.
//!
//! # Architecture
//!
//! ```text
//! LedgerEngine
//!     ├── Arc<dyn AccountStore>   (balances + versions)
//!     ├── Arc<dyn TransactionLog> (append-only history)
//!     ├── LockTable               (ordered per-account locks)
//!     └── IdempotencyCache        (bounded request-id → transaction)
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::idempotency::IdempotencyCache;
use super::locks::LockTable;
use super::state::{TransferProgress, TransferState};
use super::traits::{AccountStore, BalanceUpdate, TransactionLog};
use super::History;
use crate::config::LedgerConfig;
use crate::types::{Account, AccountId, LedgerError, MinorUnits, Transaction, TransferRequest};

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    /// The recorded transaction
    pub transaction: Transaction,
    /// True when the result was served from the idempotency cache
    pub replayed: bool,
}

/// Balances before and after a committed transfer, for rollback
struct AppliedTransfer {
    before: [Account; 2],
    after: Vec<Account>,
}

pub struct LedgerEngine {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    locks: LockTable,
    idempotency: IdempotencyCache,
    config: LedgerConfig,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("config", &self.config)
            .field("idempotency_keys", &self.idempotency.len())
            .finish_non_exhaustive()
    }
}

/// Public API
impl LedgerEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        config: LedgerConfig,
    ) -> Self {
        let idempotency = IdempotencyCache::new(config.idempotency_capacity);
        Self {
            accounts,
            log,
            locks: LockTable::new(),
            idempotency,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Answer retries of already recorded transfers from the idempotency cache
    ///
    /// Used when a ledger is reopened: pass the newest recorded transactions,
    /// oldest first.
    pub fn restore_idempotency(&self, transactions: impl IntoIterator<Item = Transaction>) {
        self.idempotency.restore(transactions);
    }

    /// Return the account, creating it with `initial_balance` on first login
    pub async fn register_or_login(
        &self,
        id: &AccountId,
        initial_balance: MinorUnits,
    ) -> Result<Account, LedgerError> {
        let account = self
            .retry_storage_async("get_or_create", || {
                self.accounts.get_or_create(id, initial_balance)
            })
            .await?;
        debug!(account = %account.id, balance = account.balance, "login");
        Ok(account)
    }

    pub async fn get_account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.retry_storage_async("get", || self.accounts.get(id)).await
    }

    /// Transactions involving an existing account, oldest first
    pub async fn transactions_for(&self, id: &AccountId) -> Result<History, LedgerError> {
        self.get_account(id).await?;
        self.retry_storage_async("query_by_account", || self.log.query_by_account(id))
            .await
    }

    /// Snapshot of every account, sorted by id
    pub async fn all_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.retry_storage_async("all", || self.accounts.all()).await
    }

    /// Move `request.amount` from `request.from` to `request.to`
    ///
    /// Either the debit, the credit and the transaction record all take effect,
    /// or none of them does. Repeating a request with the same client request id
    /// returns the original transaction without applying it again.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` / `SameAccount` - the request is malformed
    /// * `IdempotencyKeyReuse` - the key was used for a different transfer
    /// * `AccountNotFound` - either account is unknown (both ids are reported)
    /// * `InsufficientFunds` - the sender cannot cover the amount
    /// * `Contention` - locks or CAS retries were exhausted
    /// * `StorageUnavailable` - the store failed after bounded retries
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome, LedgerError> {
        let mut progress = TransferProgress::new(request.client_request_id.as_str());
        let result = self.run_transfer(&request, &mut progress).await;

        match &result {
            Ok(outcome) if outcome.replayed => {
                info!(
                    request_id = %request.client_request_id,
                    transaction = %outcome.transaction.id,
                    "duplicate transfer request answered from cache"
                );
            }
            Ok(outcome) => {
                info!(
                    request_id = %request.client_request_id,
                    transaction = %outcome.transaction.id,
                    from = %request.from,
                    to = %request.to,
                    amount = request.amount,
                    cashback = %outcome.transaction.cashback,
                    "transfer completed"
                );
                self.announce_cashback(request.amount, &outcome.transaction);
            }
            Err(e) => {
                progress.fail(e.code());
                warn!(
                    request_id = %request.client_request_id,
                    from = %request.from,
                    to = %request.to,
                    amount = request.amount,
                    reason = %e.code(),
                    "transfer failed: {e}"
                );
            }
        }

        result
    }
}

/// Private API
impl LedgerEngine {
    fn validate(request: &TransferRequest) -> Result<(), LedgerError> {
        if request.amount == 0 {
            return Err(LedgerError::invalid_amount(0));
        }
        if request.from == request.to {
            return Err(LedgerError::same_account(&request.from));
        }
        Ok(())
    }

    async fn run_transfer(
        &self,
        request: &TransferRequest,
        progress: &mut TransferProgress,
    ) -> Result<TransferOutcome, LedgerError> {
        Self::validate(request)?;

        let slot = self.idempotency.slot_for(request)?;
        if let Some(transaction) = slot.get() {
            return Ok(TransferOutcome {
                transaction: transaction.clone(),
                replayed: true,
            });
        }

        let executing = &mut *progress;
        let transaction = slot
            .get_or_execute(move || self.execute(request, executing))
            .await?
            .clone();

        // Untouched progress means another execution produced the result
        let replayed = progress.state() == TransferState::Received;
        if !replayed {
            progress.advance();
        }

        Ok(TransferOutcome {
            transaction,
            replayed,
        })
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        progress: &mut TransferProgress,
    ) -> Result<Transaction, LedgerError> {
        self.resolve_pair(request).await?;
        progress.advance();

        let _guards = self
            .locks
            .acquire(&[&request.from, &request.to], self.config.lock_timeout)
            .await?;
        progress.advance();

        // No await points from here on: the commit is never cut short
        let applied = self.apply_balances(request)?;
        progress.advance();

        let cashback = self.config.cashback.compute(request.amount);
        let transaction = Transaction::completed(request, cashback);

        if let Err(e) = self.retry_storage("append", || self.log.append(transaction.clone())) {
            self.rollback(&applied);
            return Err(e);
        }
        progress.advance();

        Ok(transaction)
    }

    /// Check both accounts exist, without revealing which one is missing
    async fn resolve_pair(&self, request: &TransferRequest) -> Result<(), LedgerError> {
        let from = self.get_account(&request.from).await;
        let to = self.get_account(&request.to).await;

        match (from, to) {
            (Ok(_), Ok(_)) => Ok(()),
            (Err(LedgerError::AccountNotFound { .. }), _)
            | (_, Err(LedgerError::AccountNotFound { .. })) => Err(LedgerError::account_not_found(
                vec![request.from.clone(), request.to.clone()],
            )),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Debit and credit with one multi-key CAS, retrying on version conflicts
    fn apply_balances(&self, request: &TransferRequest) -> Result<AppliedTransfer, LedgerError> {
        for attempt in 1..=self.config.max_cas_retries {
            let from = self.retry_storage("get", || self.accounts.get(&request.from))?;
            let to = self.retry_storage("get", || self.accounts.get(&request.to))?;

            if from.balance < request.amount {
                return Err(LedgerError::insufficient_funds(&from.id, request.amount));
            }
            let credited = to
                .balance
                .checked_add(request.amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow(&to.id))?;

            let updates = [
                BalanceUpdate::from_account(&from, from.balance - request.amount),
                BalanceUpdate::from_account(&to, credited),
            ];

            match self.retry_storage("compare_and_swap_all", || {
                self.accounts.compare_and_swap_all(&updates)
            }) {
                Ok(after) => {
                    return Ok(AppliedTransfer {
                        before: [from, to],
                        after,
                    })
                }
                Err(LedgerError::VersionConflict { account, .. }) => {
                    debug!(attempt, %account, "version conflict, re-reading balances");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::contention(
            "compare-and-swap",
            format!(
                "gave up after {} attempts on accounts {} and {}",
                self.config.max_cas_retries, request.from, request.to
            ),
        ))
    }

    /// Restore the balances a failed transfer committed
    ///
    /// Runs while the account locks are still held, so nothing else can have
    /// moved either account in between.
    fn rollback(&self, applied: &AppliedTransfer) {
        let updates: Vec<BalanceUpdate> = applied
            .before
            .iter()
            .zip(&applied.after)
            .map(|(before, after)| BalanceUpdate {
                id: after.id.clone(),
                expected_version: after.version,
                new_balance: before.balance,
            })
            .collect();

        match self.retry_storage("rollback", || self.accounts.compare_and_swap_all(&updates)) {
            Ok(_) => debug!("transfer rolled back"),
            Err(e) => error!(
                from = %applied.before[0].id,
                to = %applied.before[1].id,
                "rollback failed, balances and log disagree: {e}"
            ),
        }
    }

    /// Retry transient storage failures immediately; used inside the commit section
    fn retry_storage<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut retries = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && retries < self.config.storage_retries => {
                    retries += 1;
                    debug!(operation, retries, "retrying storage operation: {e}");
                }
                result => return result,
            }
        }
    }

    /// Retry transient storage failures with a pause between attempts
    async fn retry_storage_async<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut retries = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && retries < self.config.storage_retries => {
                    retries += 1;
                    debug!(operation, retries, "retrying storage operation: {e}");
                    tokio::time::sleep(self.config.storage_backoff).await;
                }
                result => return result,
            }
        }
    }

    fn announce_cashback(&self, amount: MinorUnits, transaction: &Transaction) {
        let policy = &self.config.cashback;
        if transaction.cashback.is_zero() {
            info!(
                transaction = %transaction.id,
                multiple = policy.no_cashback_multiple,
                "better luck next time, no cashback for this amount"
            );
        } else {
            info!(
                transaction = %transaction.id,
                rate = %policy.rate_for(amount),
                cashback = %transaction.cashback,
                "cashback awarded"
            );
        }
    }
}
